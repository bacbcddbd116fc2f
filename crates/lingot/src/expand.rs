//! Bytecode expansion: turns one compiled rule body plus runtime
//! arguments into the final string.
//!
//! Expansion is a single left-to-right walk with no I/O and no
//! suspension. The first error terminates it.

use crate::catalog::LanguageCatalog;
use crate::error::Error;
use crate::format::{self, FormatSpec};
use crate::types::{
    TransIndex, VariableType, FMT_HAS_PRECISION, FMT_HAS_WIDTH, FMT_PAD_RIGHT, FMT_PAD_ZERO,
    PLACEHOLDER_SENTINEL,
};
use crate::value::Value;

/// Output growth beyond this headroom is trimmed before returning.
const MAX_CAPACITY_SLACK: usize = 1024;

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self, placement: usize, what: &str) -> Result<u8, Error> {
        let Some(&b) = self.bytes.get(self.pos) else {
            return Err(missing(placement, what));
        };
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize, placement: usize, what: &str) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len());
        let Some(end) = end else {
            return Err(missing(placement, what));
        };
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

fn missing(placement: usize, what: &str) -> Error {
    Error::ParseSyntax(format!(
        "inserted variable placement #{placement} is missing {what}"
    ))
}

pub(crate) fn expand(
    catalog: &LanguageCatalog,
    bytecode: &[u8],
    plural_count: Option<u32>,
    origin: TransIndex,
    embedded_depth: usize,
    args: &[Value],
) -> Result<String, Error> {
    let mut out: Vec<u8> = Vec::with_capacity(bytecode.len());
    let mut cursor = Cursor {
        bytes: bytecode,
        pos: 0,
    };
    let mut placement = 1usize;

    loop {
        // Copy literal bytes up to the next placeholder.
        let rest = &cursor.bytes[cursor.pos..];
        match rest.iter().position(|&b| b == PLACEHOLDER_SENTINEL) {
            None => {
                out.extend_from_slice(rest);
                break;
            }
            Some(literal_len) => {
                out.extend_from_slice(&rest[..literal_len]);
                cursor.pos += literal_len + 1;
            }
        }

        let var_num = cursor.byte(placement, "variable number specifier")? as usize;
        if var_num > args.len() {
            return Err(Error::FormatArgType(format!(
                "inserted variable placement #{placement} is missing variable #{var_num}"
            )));
        }
        let type_flags = cursor.byte(placement, "typeFlags")?;

        let mut spec = FormatSpec {
            pad_right: type_flags & FMT_PAD_RIGHT != 0,
            pad_zero: type_flags & FMT_PAD_ZERO != 0,
            width: None,
            precision: None,
        };
        if type_flags & FMT_HAS_WIDTH != 0 {
            spec.width = Some(cursor.byte(placement, "width")?);
        }
        if type_flags & FMT_HAS_PRECISION != 0 {
            spec.precision = Some(cursor.byte(placement, "precision")?);
        }

        // Variable #0 is the implicit PluralCount.
        let plural_value;
        let value: &Value = if var_num == 0 {
            plural_value = Value::Uint(u64::from(plural_count.unwrap_or(u32::MAX)));
            &plural_value
        } else {
            &args[var_num - 1]
        };

        let kind = VariableType::from_low_bits(type_flags);
        match kind {
            VariableType::Anything
            | VariableType::String
            | VariableType::Integer
            | VariableType::Binary
            | VariableType::Octal
            | VariableType::HexLower
            | VariableType::HexUpper
            | VariableType::Scientific
            | VariableType::Floating
            | VariableType::Bool => {
                let body = format::format_plain(kind, &spec, value, placement)?;
                out.extend_from_slice(body.as_bytes());
            }
            VariableType::DateTime => {
                let len = cursor.byte(placement, "DateTime specifier length")? as usize;
                let raw = cursor.take(len, placement, "DateTime specifier")?;
                let specifier = String::from_utf8_lossy(raw);
                let Value::DateTime(dt) = value else {
                    return Err(Error::FormatArgType(format!(
                        "inserted variable placement #{placement} requires a date-time argument, got {}",
                        value.kind_name()
                    )));
                };
                let body = catalog.formatter().format_date_time(&specifier, dt)?;
                out.extend_from_slice(format::apply_width(body, &spec, false).as_bytes());
            }
            VariableType::Currency => {
                let Value::Currency(c) = value else {
                    return Err(Error::FormatArgType(format!(
                        "inserted variable placement #{placement} requires a currency argument, got {}",
                        value.kind_name()
                    )));
                };
                let body = catalog.formatter().format_currency(c)?;
                out.extend_from_slice(format::apply_width(body, &spec, false).as_bytes());
            }
            VariableType::IntegerWithSymbols => {
                let v = format::int_arg(value, placement)?;
                let body = catalog.formatter().format_integer(v)?;
                out.extend_from_slice(format::apply_width(body, &spec, true).as_bytes());
            }
            VariableType::FloatWithSymbols => {
                let v = format::float_arg(value, placement)?;
                let body = catalog.formatter().format_float(v, spec.precision)?;
                out.extend_from_slice(format::apply_width(body, &spec, true).as_bytes());
            }
            VariableType::StaticTranslation => {
                let raw = cursor.take(4, placement, "static translation index")?;
                let target = TransIndex(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
                if target.as_u32() >= catalog.num_translations() {
                    return Err(Error::IndexOutOfRange(format!(
                        "inserted variable placement #{placement} is a static translation with an invalid index"
                    )));
                }
                let embedded =
                    catalog.get_real(target, plural_count, embedded_depth + 1, &[])?;
                out.extend_from_slice(embedded.as_bytes());
            }
            VariableType::VariableTranslation => {
                let target = resolve_variable_translation(catalog, value, origin, placement)?;
                let embedded =
                    catalog.get_real(target, plural_count, embedded_depth + 1, &[])?;
                out.extend_from_slice(embedded.as_bytes());
            }
        }
        placement += 1;
    }

    if out.capacity() - out.len() > MAX_CAPACITY_SLACK {
        out.shrink_to_fit();
    }
    Ok(match String::from_utf8(out) {
        Ok(s) => s,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

/// Resolve a `VariableTranslation` argument: a direct index, an integer
/// coercible to one, or a `"[Namespace.]Entry"` string resolved through
/// the dictionary, defaulting to the origin translation's namespace.
fn resolve_variable_translation(
    catalog: &LanguageCatalog,
    value: &Value,
    origin: TransIndex,
    placement: usize,
) -> Result<TransIndex, Error> {
    let invalid_index = || {
        Error::IndexOutOfRange(format!(
            "inserted variable placement #{placement} is a variable translation with an invalid index"
        ))
    };
    let in_range = |ix: TransIndex| {
        if ix.as_u32() >= catalog.num_translations() {
            Err(invalid_index())
        } else {
            Ok(ix)
        }
    };

    match value {
        Value::Index(ix) => in_range(*ix),
        Value::Int(v) => {
            if *v < 0 || *v > i64::from(u32::MAX) {
                return Err(invalid_index());
            }
            in_range(TransIndex(*v as u32))
        }
        Value::Uint(v) => {
            if *v > u64::from(u32::MAX) {
                return Err(invalid_index());
            }
            in_range(TransIndex(*v as u32))
        }
        Value::Str(spec) => {
            let dict = catalog.dictionary();
            let (namespace, id) = match spec.split_once('.') {
                Some((ns, id)) => (ns.to_owned(), id),
                None => {
                    let ns = dict
                        .reverse_lookup(origin)
                        .map(|(ns, _)| ns.to_owned())
                        .unwrap_or_default();
                    (ns, spec.as_str())
                }
            };
            let Some(ns) = dict.namespace(&namespace) else {
                return Err(Error::IndexOutOfRange(format!(
                    "inserted variable placement #{placement} is a variable translation with an invalid namespace: {namespace}.{id}"
                )));
            };
            let Some(ix) = ns.index_of(id) else {
                return Err(Error::IndexOutOfRange(format!(
                    "inserted variable placement #{placement} is a variable translation with an invalid translation ID in namespace: {namespace}.{id}"
                )));
            };
            Ok(ix)
        }
        other => Err(Error::FormatArgType(format!(
            "inserted variable placement #{placement} is a variable translation with invalid type \"{}\" (must be a translation index or string)",
            other.kind_name()
        ))),
    }
}
