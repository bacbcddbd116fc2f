//! Printf-style argument formatting and the locale formatter capability.
//!
//! The ten plain variable types (`%v %s %d %b %o %x %X %e %f %t`) are
//! formatted here directly from the composed flag/width/precision spec.
//! The locale-aware types (`DateTime`, `Currency`, `IntegerWithSymbols`,
//! `FloatWithSymbols`) delegate to a [`Formatter`] capability; concrete
//! locale data is outside this library, but [`DefaultFormatter`] covers
//! unlocalized grouping and strftime so catalogs work out of the box.

use std::fmt::Write as _;

use chrono::NaiveDateTime;

use crate::error::Error;
use crate::types::VariableType;
use crate::value::{Currency, Value};

/// Decoded formatting flags of one placeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatSpec {
    pub pad_right: bool,
    pub pad_zero: bool,
    pub width: Option<u8>,
    pub precision: Option<u8>,
}

/// Locale-aware formatting capability.
///
/// Implementations must be cheap to call repeatedly; any lazy internal
/// initialization must be synchronous and idempotent. A failed
/// initialization surfaces as `FormatterUnavailable` from the affected
/// call.
pub trait Formatter: Send + Sync {
    /// Format a date-time with a strftime-style specifier.
    fn format_date_time(&self, specifier: &str, value: &NaiveDateTime) -> Result<String, Error>;

    /// Format a currency amount (symbol plus grouped integer).
    fn format_currency(&self, value: &Currency) -> Result<String, Error>;

    /// Format an integer with grouping separators.
    fn format_integer(&self, value: i128) -> Result<String, Error>;

    /// Format a float with grouping separators and the given precision
    /// (defaulting to 6 fractional digits).
    fn format_float(&self, value: f64, precision: Option<u8>) -> Result<String, Error>;
}

/// Unlocalized formatter: `,` thousands grouping and chrono strftime.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl Formatter for DefaultFormatter {
    fn format_date_time(&self, specifier: &str, value: &NaiveDateTime) -> Result<String, Error> {
        let mut out = String::new();
        if write!(out, "{}", value.format(specifier)).is_err() {
            return Err(Error::FormatterUnavailable(format!(
                "invalid date-time specifier \"{specifier}\""
            )));
        }
        Ok(out)
    }

    fn format_currency(&self, value: &Currency) -> Result<String, Error> {
        Ok(format!(
            "{} {}",
            value.symbol,
            group_digits(&value.amount.to_string())
        ))
    }

    fn format_integer(&self, value: i128) -> Result<String, Error> {
        Ok(group_digits(&value.to_string()))
    }

    fn format_float(&self, value: f64, precision: Option<u8>) -> Result<String, Error> {
        let precision = usize::from(precision.unwrap_or(6));
        let plain = format!("{value:.precision$}");
        match plain.split_once('.') {
            Some((int_part, frac)) => Ok(format!("{}.{frac}", group_digits(int_part))),
            None => Ok(group_digits(&plain)),
        }
    }
}

/// Insert `,` every three digits, right to left, skipping a leading sign.
fn group_digits(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::with_capacity(sign.len() + digits.len() + digits.len() / 3);
    out.push_str(sign);
    let len = digits.len();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Apply the width/padding part of a spec to an already-formatted body.
///
/// Zero padding is honored only for numeric bodies and is inserted after
/// the sign; a `-` (pad-right) flag wins over `0`.
pub(crate) fn apply_width(body: String, spec: &FormatSpec, numeric: bool) -> String {
    let width = match spec.width {
        // a width byte of zero is carried in the flags but ignored
        Some(w) if w > 0 => usize::from(w),
        _ => return body,
    };
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if spec.pad_right {
        let mut out = body;
        out.extend(std::iter::repeat(' ').take(fill));
        out
    } else if spec.pad_zero && numeric {
        let (sign, rest) = match body.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", body.as_str()),
        };
        let mut out = String::with_capacity(width);
        out.push_str(sign);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(rest);
        out
    } else {
        let mut out = String::with_capacity(width);
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(&body);
        out
    }
}

/// Left-pad a digit body with zeros to a minimum number of digits,
/// keeping the sign in front.
fn min_digits(body: String, digits: usize) -> String {
    let (sign, rest) = match body.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", body.as_str()),
    };
    if rest.len() >= digits {
        return body;
    }
    let mut out = String::with_capacity(sign.len() + digits);
    out.push_str(sign);
    out.extend(std::iter::repeat('0').take(digits - rest.len()));
    out.push_str(rest);
    out
}

fn arg_error(placement: usize, expected: &str, value: &Value) -> Error {
    Error::FormatArgType(format!(
        "inserted variable placement #{placement} requires {expected}, got {}",
        value.kind_name()
    ))
}

pub(crate) fn int_arg(value: &Value, placement: usize) -> Result<i128, Error> {
    match value {
        Value::Int(v) => Ok(i128::from(*v)),
        Value::Uint(v) => Ok(i128::from(*v)),
        other => Err(arg_error(placement, "an integer argument", other)),
    }
}

pub(crate) fn float_arg(value: &Value, placement: usize) -> Result<f64, Error> {
    match value {
        Value::Float(v) => Ok(*v),
        other => Err(arg_error(placement, "a float argument", other)),
    }
}

/// Format one of the ten plain variable types.
pub(crate) fn format_plain(
    kind: VariableType,
    spec: &FormatSpec,
    value: &Value,
    placement: usize,
) -> Result<String, Error> {
    let precision = spec.precision.map(usize::from);
    let (body, numeric) = match kind {
        VariableType::Anything => (value.to_string(), matches!(value, Value::Int(_) | Value::Uint(_) | Value::Float(_))),
        VariableType::String => {
            let Value::Str(s) = value else {
                return Err(arg_error(placement, "a string argument", value));
            };
            let mut s = s.clone();
            if let Some(p) = precision {
                s = s.chars().take(p).collect();
            }
            (s, false)
        }
        VariableType::Integer => {
            let v = int_arg(value, placement)?;
            (min_digits(v.to_string(), precision.unwrap_or(0)), true)
        }
        VariableType::Binary => {
            let v = int_arg(value, placement)?;
            (min_digits(radix_string(v, 2, false), precision.unwrap_or(0)), true)
        }
        VariableType::Octal => {
            let v = int_arg(value, placement)?;
            (min_digits(radix_string(v, 8, false), precision.unwrap_or(0)), true)
        }
        VariableType::HexLower => {
            let v = int_arg(value, placement)?;
            (min_digits(radix_string(v, 16, false), precision.unwrap_or(0)), true)
        }
        VariableType::HexUpper => {
            let v = int_arg(value, placement)?;
            (min_digits(radix_string(v, 16, true), precision.unwrap_or(0)), true)
        }
        VariableType::Scientific => {
            let v = float_arg(value, placement)?;
            let body = match precision {
                Some(p) => format!("{v:.p$e}"),
                None => format!("{v:e}"),
            };
            (body, true)
        }
        VariableType::Floating => {
            let v = float_arg(value, placement)?;
            let p = precision.unwrap_or(6);
            (format!("{v:.p$}"), true)
        }
        VariableType::Bool => {
            let Value::Bool(b) = value else {
                return Err(arg_error(placement, "a bool argument", value));
            };
            (b.to_string(), false)
        }
        other => {
            // locale-aware and embedding kinds are dispatched elsewhere
            return Err(Error::FormatArgType(format!(
                "inserted variable placement #{placement} has unsupported plain type {other}"
            )));
        }
    };
    Ok(apply_width(body, spec, numeric))
}

fn radix_string(value: i128, radix: u32, upper: bool) -> String {
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    if magnitude == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let d = (magnitude % u128::from(radix)) as u32;
        let c = char::from_digit(d, radix).unwrap_or('0');
        digits.push(if upper { c.to_ascii_uppercase() } else { c });
        magnitude /= u128::from(radix);
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}
