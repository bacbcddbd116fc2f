//! Runtime argument values passed to catalog lookups.

use core::fmt;

use chrono::NaiveDateTime;

use crate::types::TransIndex;

/// A currency amount: display symbol plus a scaled integer amount.
///
/// Scaling (cents, mills, …) is the caller's convention; the library
/// formats the integer with locale grouping and prefixes the symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    pub symbol: String,
    pub amount: i64,
}

impl Currency {
    #[must_use]
    pub fn new(symbol: impl Into<String>, amount: i64) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
        }
    }
}

/// One argument to a `get*` call.
///
/// Placeholders check the argument against their declared
/// [`VariableType`](crate::types::VariableType); a mismatch yields a
/// `FormatArgType` error rather than garbage output.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Currency(Currency),
    /// A direct translation index, consumed by `VariableTranslation`
    /// placeholders.
    Index(TransIndex),
}

impl Value {
    /// Short noun used in argument-type error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "integer",
            Self::Uint(_) => "unsigned integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::DateTime(_) => "date-time",
            Self::Currency(_) => "currency",
            Self::Index(_) => "translation index",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => v.fmt(f),
            Self::Uint(v) => v.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::Bool(v) => v.fmt(f),
            Self::DateTime(v) => v.fmt(f),
            Self::Currency(c) => write!(f, "{} {}", c.symbol, c.amount),
            Self::Index(ix) => ix.fmt(f),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Uint(u64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<Currency> for Value {
    fn from(value: Currency) -> Self {
        Self::Currency(value)
    }
}

impl From<TransIndex> for Value {
    fn from(value: TransIndex) -> Self {
        Self::Index(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_natural_forms() {
        assert_eq!(Value::from("ab").to_string(), "ab");
        assert_eq!(Value::from(-3i64).to_string(), "-3");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::Currency(Currency::new("USD", 1200)).to_string(), "USD 1200");
    }
}
