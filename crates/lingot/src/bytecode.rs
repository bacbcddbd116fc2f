//! The bytecode codec: compiles one translation body into the packed
//! byte form, and renders bytecode back to text for diagnostics.
//!
//! Compilation is three sequential rewrite passes, each scanning the
//! previous pass's output:
//!
//! 1. variable references `{{.Name|flags!specifier}}` → placeholders
//! 2. escape sequences (`\n`, `\xHH`, `\u....`) → raw bytes
//! 3. embedded static references `{{*Name}}` → placeholders
//!
//! Passes 2 and 3 transform only the literal runs between placeholders:
//! placeholder payloads (width bytes, translation indices) may collide
//! with escape or brace syntax byte-wise and must never be rescanned.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;

use crate::dictionary::Dictionary;
use crate::error::Error;
use crate::types::{
    TransIndex, TranslationVar, VariableType, FMT_HAS_PRECISION, FMT_HAS_WIDTH, FMT_PAD_RIGHT,
    FMT_PAD_ZERO, PLACEHOLDER_SENTINEL, PLURAL_COUNT_VAR,
};

static VARIABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\.\s*([\p{L}\p{N}_]+)\s*(?:\|\s*(.*?))?\s*(?:!\s*(.*?))?\s*\}\}")
        .expect("variable reference pattern")
});
static VARIABLE_FLAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?)\s*(0?)\s*(\d{0,8})\s*(?:\.\s*(\d{1,8}))?\s*$").expect("flags pattern")
});
static EMBEDDED_REF: LazyLock<BytesRegex> = LazyLock::new(|| {
    BytesRegex::new(r"\{\{\*\s*([\p{L}\p{N}_]+)\s*(?:\.\s*([\p{L}\p{N}_]+))?\s*\}\}")
        .expect("embedded reference pattern")
});

/// The variable table of one translation while its bodies compile.
/// Index 0 is always the implicit `PluralCount`.
#[derive(Debug, Clone)]
pub(crate) struct VarTable {
    entries: IndexMap<String, (u8, VariableType)>,
}

impl VarTable {
    pub(crate) fn new() -> Self {
        let mut entries = IndexMap::new();
        entries.insert(
            PLURAL_COUNT_VAR.to_owned(),
            (0u8, VariableType::IntegerWithSymbols),
        );
        Self { entries }
    }

    /// Number of slots taken, counting the implicit one.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Declare the next variable. The caller is responsible for
    /// duplicate and overflow checks.
    pub(crate) fn declare(&mut self, name: &str, var_type: VariableType) -> u8 {
        let index = self.entries.len() as u8;
        self.entries.insert(name.to_owned(), (index, var_type));
        index
    }

    fn get(&self, name: &str) -> Option<(u8, VariableType)> {
        self.entries.get(name).copied()
    }
}

/// Result of compiling one rule body.
pub(crate) struct CompiledLine {
    pub bytecode: Vec<u8>,
    /// Static references found in this body, deduplicated.
    pub embedded: Vec<TransIndex>,
    pub errors: Vec<Error>,
}

/// Compile one rule body against a translation's variable table.
///
/// Errors are accumulated, not short-circuited: the whole body is always
/// scanned so one bad reference does not mask the next.
pub(crate) fn compile_line(
    line: &str,
    vars: &VarTable,
    namespace: &str,
    dict: &Dictionary,
) -> CompiledLine {
    let mut errors = Vec::new();
    let pass1 = replace_variables(line, vars, &mut errors);
    let pass2 = replace_escapes(&pass1, &mut errors);
    let (bytecode, embedded) = replace_static_refs(&pass2, namespace, dict, &mut errors);
    CompiledLine {
        bytecode,
        embedded,
        errors,
    }
}

// ----------------------------------------------------------------------
// Pass 1: variable references
// ----------------------------------------------------------------------

fn replace_variables(line: &str, vars: &VarTable, errors: &mut Vec<Error>) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut last = 0;
    let mut var_num = 0usize;

    for caps in VARIABLE_REF.captures_iter(line) {
        let whole = caps.get(0).expect("match");
        out.extend_from_slice(line[last..whole.start()].as_bytes());
        last = whole.end();
        var_num += 1;

        let name = caps.get(1).expect("name").as_str();
        let flags_str = caps.get(2).map_or("", |m| m.as_str());
        let specifier = caps.get(3).map(|m| m.as_str());

        let mut var_err = |kind: fn(String) -> Error, msg: String| {
            errors.push(kind(format!("Var #{var_num} \"{name}\": {msg}")));
        };

        let (var_index, var_type) = match vars.get(name) {
            Some(found) => found,
            None => {
                var_err(Error::ParseSemantic, "unknown variable found".into());
                (0, VariableType::Anything)
            }
        };

        let mut flag_byte = var_type as u8;
        let mut width_byte = None;
        let mut precision_byte = None;
        match VARIABLE_FLAGS.captures(flags_str) {
            None => var_err(
                Error::ParseSyntax,
                format!("flags \"{flags_str}\" are invalid"),
            ),
            Some(flags) => {
                if flags.get(1).is_some_and(|m| !m.as_str().is_empty()) {
                    flag_byte |= FMT_PAD_RIGHT;
                }
                if flags.get(2).is_some_and(|m| !m.as_str().is_empty()) {
                    flag_byte |= FMT_PAD_ZERO;
                }
                let mut check_width = |text: Option<&str>, what: &str, bit: u8| -> Option<u8> {
                    let text = text.filter(|t| !t.is_empty())?;
                    match text.parse::<u32>() {
                        Ok(v) if v > 255 => {
                            var_err(
                                Error::ParseSemantic,
                                format!("the {what} ({v}) cannot be greater than 255"),
                            );
                            None
                        }
                        Ok(v) => {
                            flag_byte |= bit;
                            Some(v as u8)
                        }
                        Err(_) => {
                            var_err(
                                Error::ParseSyntax,
                                format!("has an invalid {what}: {text}"),
                            );
                            None
                        }
                    }
                };
                width_byte = check_width(
                    flags.get(3).map(|m| m.as_str()),
                    "width",
                    FMT_HAS_WIDTH,
                );
                precision_byte = check_width(
                    flags.get(4).map(|m| m.as_str()),
                    "precision",
                    FMT_HAS_PRECISION,
                );
            }
        }

        out.push(PLACEHOLDER_SENTINEL);
        out.push(var_index);
        out.push(flag_byte);
        if let Some(w) = width_byte {
            out.push(w);
        }
        if let Some(p) = precision_byte {
            out.push(p);
        }

        if var_type == VariableType::DateTime {
            match specifier.filter(|s| !s.is_empty()) {
                None => var_err(
                    Error::ParseSemantic,
                    format!(
                        "this variable type ({var_type}) requires a specifier (a value after an exclamation mark)"
                    ),
                ),
                Some(spec) if spec.len() > 255 => var_err(
                    Error::ParseSemantic,
                    format!("this variable type ({var_type}) specifier cannot be more than 255 bytes"),
                ),
                Some(spec) => {
                    out.push(spec.len() as u8);
                    out.extend_from_slice(spec.as_bytes());
                }
            }
        } else if specifier.is_some_and(|s| !s.is_empty()) {
            var_err(
                Error::ParseSemantic,
                "a specifier is only valid for DateTime variables".into(),
            );
        }
    }
    out.extend_from_slice(line[last..].as_bytes());
    out
}

// ----------------------------------------------------------------------
// Placeholder-aware segmentation
// ----------------------------------------------------------------------

/// Bytes occupied by the placeholder whose sentinel sits at `start`,
/// sentinel included. Saturates at the end of truncated input.
fn placeholder_span(buf: &[u8], start: usize) -> usize {
    let mut pos = start + 2; // sentinel + variable index
    let Some(&flags) = buf.get(pos) else {
        return buf.len() - start;
    };
    pos += 1;
    if flags & FMT_HAS_WIDTH != 0 {
        pos += 1;
    }
    if flags & FMT_HAS_PRECISION != 0 {
        pos += 1;
    }
    match VariableType::from_low_bits(flags) {
        VariableType::DateTime => {
            if let Some(&len) = buf.get(pos) {
                pos += 1 + usize::from(len);
            }
        }
        VariableType::StaticTranslation => pos += 4,
        _ => {}
    }
    pos.min(buf.len()) - start
}

/// Apply `transform` to every literal run between placeholders, copying
/// placeholder payloads through untouched.
fn map_literal_runs(
    buf: &[u8],
    mut transform: impl FnMut(&[u8], &mut Vec<u8>),
) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len());
    let mut pos = 0;
    while pos < buf.len() {
        match buf[pos..].iter().position(|&b| b == PLACEHOLDER_SENTINEL) {
            None => {
                transform(&buf[pos..], &mut out);
                break;
            }
            Some(literal_len) => {
                if literal_len > 0 {
                    transform(&buf[pos..pos + literal_len], &mut out);
                }
                let span = placeholder_span(buf, pos + literal_len);
                out.extend_from_slice(&buf[pos + literal_len..pos + literal_len + span]);
                pos += literal_len + span;
            }
        }
    }
    out
}

// ----------------------------------------------------------------------
// Pass 2: escape sequences
// ----------------------------------------------------------------------

fn replace_escapes(buf: &[u8], errors: &mut Vec<Error>) -> Vec<u8> {
    map_literal_runs(buf, |run, out| {
        let mut pos = 0;
        while pos < run.len() {
            let b = run[pos];
            if b != b'\\' {
                out.push(b);
                pos += 1;
                continue;
            }
            let Some(&esc) = run.get(pos + 1) else {
                errors.push(Error::ParseSyntax("dangling escape at end of text".into()));
                break;
            };
            pos += 2;
            match esc.to_ascii_lowercase() {
                b'a' => out.push(0x07),
                b'b' => out.push(0x08),
                b'f' => out.push(0x0C),
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'v' => out.push(0x0B),
                b'\\' => out.push(b'\\'),
                b'x' => {
                    let digits = run.get(pos..pos + 2).filter(|d| {
                        d.iter().all(u8::is_ascii_hexdigit)
                    });
                    match digits {
                        None => errors.push(Error::ParseSyntax(
                            "\\x must be followed by two hex digits".into(),
                        )),
                        Some(digits) => {
                            pos += 2;
                            let value = hex_value(digits);
                            if value == u32::from(PLACEHOLDER_SENTINEL) {
                                errors.push(Error::ParseSyntax(
                                    "cannot use \\xFF as it is a reserved character in this library"
                                        .into(),
                                ));
                            } else {
                                out.push(value as u8);
                            }
                        }
                    }
                }
                b'u' => {
                    let mut digits = 0;
                    while digits < 6
                        && run
                            .get(pos + digits)
                            .is_some_and(u8::is_ascii_hexdigit)
                    {
                        digits += 1;
                    }
                    if digits == 0 {
                        errors.push(Error::ParseSyntax(
                            "\\u must be followed by 1 to 6 hex digits".into(),
                        ));
                        continue;
                    }
                    let raw = &run[pos..pos + digits];
                    pos += digits;
                    let code = hex_value(raw);
                    match char::from_u32(code) {
                        Some(c) => {
                            let mut utf8 = [0u8; 4];
                            out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                        }
                        None => errors.push(Error::ParseSyntax(format!(
                            "invalid unicode character found: 0x{code:x}"
                        ))),
                    }
                }
                other => errors.push(Error::ParseSyntax(format!(
                    "invalid escaped character found after slash: {}",
                    char::from(other)
                ))),
            }
        }
    })
}

fn hex_value(digits: &[u8]) -> u32 {
    digits.iter().fold(0u32, |acc, &d| {
        acc * 16 + u32::from((d as char).to_digit(16).unwrap_or(0))
    })
}

// ----------------------------------------------------------------------
// Pass 3: embedded static references
// ----------------------------------------------------------------------

fn replace_static_refs(
    buf: &[u8],
    namespace: &str,
    dict: &Dictionary,
    errors: &mut Vec<Error>,
) -> (Vec<u8>, Vec<TransIndex>) {
    let mut embedded = Vec::new();
    let out = map_literal_runs(buf, |run, out| {
        let mut last = 0;
        for caps in EMBEDDED_REF.captures_iter(run) {
            let whole = caps.get(0).expect("match");
            out.extend_from_slice(&run[last..whole.start()]);
            last = whole.end();

            let first = String::from_utf8_lossy(caps.get(1).expect("name").as_bytes());
            let (ns_name, id) = match caps.get(2) {
                Some(second) => (
                    first.into_owned(),
                    String::from_utf8_lossy(second.as_bytes()).into_owned(),
                ),
                None => (namespace.to_owned(), first.into_owned()),
            };

            let Some(ns) = dict.namespace(&ns_name) else {
                errors.push(Error::ParseSemantic(format!(
                    "invalid namespace for specifier {ns_name}.{id}"
                )));
                continue;
            };
            let Some(index) = ns.index_of(&id) else {
                errors.push(Error::ParseSemantic(format!(
                    "invalid translation ID in namespace for specifier {ns_name}.{id}"
                )));
                continue;
            };

            out.push(PLACEHOLDER_SENTINEL);
            out.push(0);
            out.push(VariableType::StaticTranslation as u8);
            out.extend_from_slice(&index.as_u32().to_le_bytes());
            if !embedded.contains(&index) {
                embedded.push(index);
            }
        }
        out.extend_from_slice(&run[last..]);
    });
    (out, embedded)
}

// ----------------------------------------------------------------------
// Reverse rendering
// ----------------------------------------------------------------------

/// Render bytecode back into the authored text form, for diagnostics
/// and generated-file comments. Malformed bytecode renders inline
/// markers rather than failing.
#[must_use]
pub fn render(
    bytecode: &[u8],
    vars: &[TranslationVar],
    dict: &Dictionary,
    namespace: &str,
) -> String {
    const ENDED_EARLY: &str = "STRING_ENDED_EARLY";
    let mut out: Vec<u8> = Vec::with_capacity(bytecode.len());
    let mut pos = 0;

    while pos < bytecode.len() {
        let b = bytecode[pos];
        pos += 1;

        // control bytes re-escape
        if b < 0x20 {
            match b {
                0x07 => out.extend_from_slice(b"\\a"),
                0x08 => out.extend_from_slice(b"\\b"),
                0x0C => out.extend_from_slice(b"\\f"),
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                b'\t' => out.extend_from_slice(b"\\t"),
                0x0B => out.extend_from_slice(b"\\v"),
                other => out.extend_from_slice(format!("\\x{other:02x}").as_bytes()),
            }
            continue;
        }

        // a literal backslash that would read as an escape gets doubled
        if b == b'\\' {
            if let Some(&next) = bytecode.get(pos) {
                if matches!(next, b'a' | b'b' | b'f' | b'n' | b'r' | b't' | b'v' | b'\\' | b'x' | b'u')
                {
                    pos += 1;
                    out.extend_from_slice(b"\\\\");
                    out.push(next);
                    if next == b'\\' {
                        out.push(next);
                    }
                    continue;
                }
            }
            out.push(b);
            continue;
        }

        if b != PLACEHOLDER_SENTINEL {
            out.push(b);
            continue;
        }

        // static translations render as {{*Name}}
        if bytecode
            .get(pos + 1)
            .is_some_and(|&f| VariableType::from_low_bits(f) == VariableType::StaticTranslation)
        {
            out.extend_from_slice(b"{{*");
            pos += 2;
            match bytecode.get(pos..pos + 4) {
                None => out.extend_from_slice(ENDED_EARLY.as_bytes()),
                Some(raw) => {
                    pos += 4;
                    let index = TransIndex(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
                    match dict.reverse_lookup(index) {
                        Some((ns, id)) if ns == namespace => out.extend_from_slice(id.as_bytes()),
                        Some((ns, id)) => {
                            out.extend_from_slice(format!("{ns}.{id}").as_bytes());
                        }
                        None => out.extend_from_slice(b"NOT_FOUND"),
                    }
                }
            }
            out.extend_from_slice(b"}}");
            continue;
        }

        out.extend_from_slice(b"{{.");
        match bytecode.get(pos) {
            None => out.extend_from_slice(ENDED_EARLY.as_bytes()),
            Some(&var_index) => {
                pos += 1;
                if var_index == 0 {
                    out.extend_from_slice(PLURAL_COUNT_VAR.as_bytes());
                } else if let Some(var) = vars.get(usize::from(var_index) - 1) {
                    out.extend_from_slice(var.name.as_bytes());
                } else {
                    out.extend_from_slice(b"ERROR_BAD_VAR_INDEX");
                }
            }
        }

        let flag_byte = match bytecode.get(pos) {
            None => {
                out.extend_from_slice(ENDED_EARLY.as_bytes());
                out.extend_from_slice(b"}}");
                break;
            }
            Some(&f) => {
                pos += 1;
                f
            }
        };

        if flag_byte & 0xF0 != 0 {
            out.push(b'|');
            if flag_byte & FMT_PAD_RIGHT != 0 {
                out.push(b'-');
            }
            if flag_byte & FMT_PAD_ZERO != 0 {
                out.push(b'0');
            }
            if flag_byte & FMT_HAS_WIDTH != 0 {
                match bytecode.get(pos) {
                    None => out.extend_from_slice(ENDED_EARLY.as_bytes()),
                    Some(&w) => {
                        pos += 1;
                        out.extend_from_slice(w.to_string().as_bytes());
                    }
                }
            }
            if flag_byte & FMT_HAS_PRECISION != 0 {
                match bytecode.get(pos) {
                    None => out.extend_from_slice(ENDED_EARLY.as_bytes()),
                    Some(&p) => {
                        pos += 1;
                        out.extend_from_slice(format!(".{p}").as_bytes());
                    }
                }
            }
        }

        if VariableType::from_low_bits(flag_byte) == VariableType::DateTime {
            match bytecode.get(pos) {
                None => out.extend_from_slice(ENDED_EARLY.as_bytes()),
                Some(&len) => {
                    pos += 1;
                    match bytecode.get(pos..pos + usize::from(len)) {
                        None => out.extend_from_slice(ENDED_EARLY.as_bytes()),
                        Some(spec) => {
                            pos += usize::from(len);
                            out.push(b'!');
                            out.extend_from_slice(spec);
                        }
                    }
                }
            }
        }

        out.extend_from_slice(b"}}");
    }

    String::from_utf8_lossy(&out).into_owned()
}
