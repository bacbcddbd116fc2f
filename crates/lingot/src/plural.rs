//! The plural-rule mini-language and its packed 2-byte encoding.
//!
//! # Invariants
//!
//! 1. A rule occupies exactly 2 bytes: operator + between-delta in byte
//!    0, primary operand in byte 1.
//! 2. `render()` is the parsing inverse: re-parsing a rendered rule
//!    reproduces the same packed bytes.
//! 3. Evaluation is a pure function of (rule, count).
//!
//! Grammar, with ASCII whitespace skipped between tokens:
//!
//! ```text
//! rule := "^"
//!       | ("=" | "<" | ">" | "<=" | ">=") N
//!       | "~" N "-" N          N := 0..255
//! ```

use core::fmt;

use crate::error::Error;

/// Comparison operator of a plural rule, stored in the low 3 bits of the
/// first byte. The top 5 bits hold the between-delta (0–31);
/// `BetweenHigh` marks deltas 32–63.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    All,
    Eq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Between,
    BetweenHigh,
}

const OP_ALL: u8 = 0;
const OP_EQ: u8 = 1;
const OP_LT: u8 = 2;
const OP_LT_EQ: u8 = 3;
const OP_GT: u8 = 4;
const OP_GT_EQ: u8 = 5;
const OP_BETWEEN: u8 = 6;
const OP_BETWEEN_HIGH: u8 = 7;

/// Largest allowed spread of a `~a-b` rule (`b - a`).
const MAX_BETWEEN_DIFF: u16 = 63;
/// Deltas at or above this are encoded with `BetweenHigh`.
const HALF_BETWEEN_DIFF: u16 = 32;

/// A packed 2-byte plural rule, evaluated against counts 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluralRule {
    op: u8,
    i0: u8,
}

impl PluralRule {
    /// The `^` rule: matches every count.
    pub const ALL: PluralRule = PluralRule { op: OP_ALL, i0: 0 };

    /// Decode from the on-disk byte pair.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            op: bytes[0],
            i0: bytes[1],
        }
    }

    /// Encode to the on-disk byte pair.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.op, self.i0]
    }

    #[must_use]
    pub fn op(self) -> CompareOp {
        match self.op & 7 {
            OP_ALL => CompareOp::All,
            OP_EQ => CompareOp::Eq,
            OP_LT => CompareOp::Lt,
            OP_LT_EQ => CompareOp::LtEq,
            OP_GT => CompareOp::Gt,
            OP_GT_EQ => CompareOp::GtEq,
            OP_BETWEEN => CompareOp::Between,
            _ => CompareOp::BetweenHigh,
        }
    }

    #[must_use]
    pub fn is_match_all(self) -> bool {
        self.op & 7 == OP_ALL
    }

    fn delta(self) -> u16 {
        u16::from(self.op >> 3)
    }

    /// Evaluate the rule against a count.
    #[must_use]
    pub fn matches(self, count: u8) -> bool {
        let c = u16::from(count);
        let i0 = u16::from(self.i0);
        match self.op() {
            CompareOp::All => true,
            CompareOp::Eq => c == i0,
            CompareOp::Lt => c < i0,
            CompareOp::LtEq => c <= i0,
            CompareOp::Gt => c > i0,
            CompareOp::GtEq => c >= i0,
            CompareOp::Between => i0 <= c && c <= i0 + self.delta(),
            CompareOp::BetweenHigh => i0 <= c && c <= i0 + self.delta() + HALF_BETWEEN_DIFF,
        }
    }

    /// Parse the textual rule form.
    ///
    /// # Errors
    ///
    /// `ParseSyntax` on an unknown leading operator, a non-numeric or
    /// out-of-range operand, a `~` without a dash, an inverted or
    /// too-wide range, or trailing input.
    pub fn parse(text: &str) -> Result<Self, Error> {
        Parser::new(text).parse()
    }

    /// Render back to the textual form. Re-parsing the result yields the
    /// same packed bytes.
    #[must_use]
    pub fn render(self) -> String {
        let i0 = self.i0;
        match self.op() {
            CompareOp::All => "^".to_owned(),
            CompareOp::Eq => format!("={i0}"),
            CompareOp::Lt => format!("<{i0}"),
            CompareOp::LtEq => format!("<={i0}"),
            CompareOp::Gt => format!(">{i0}"),
            CompareOp::GtEq => format!(">={i0}"),
            CompareOp::Between => format!("~{i0}-{}", u16::from(i0) + self.delta()),
            CompareOp::BetweenHigh => {
                format!("~{i0}-{}", u16::from(i0) + self.delta() + HALF_BETWEEN_DIFF)
            }
        }
    }
}

impl fmt::Display for PluralRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Consume up to 3 digits; more digits are left as trailing input.
    fn number(&mut self) -> Result<u8, Error> {
        let mut value: u16 = 0;
        let mut digits = 0;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() && digits < 3 {
            value = value * 10 + u16::from(self.bytes[self.pos] - b'0');
            digits += 1;
            self.pos += 1;
        }
        if digits == 0 || value > 255 {
            return Err(Error::ParseSyntax(
                "operator must be followed by a number between 0 and 255".into(),
            ));
        }
        Ok(value as u8)
    }

    fn parse(&mut self) -> Result<PluralRule, Error> {
        let Some(&first) = self.bytes.first() else {
            return Err(Error::ParseSyntax("must start with one of: ^ = < > ~".into()));
        };

        let mut op = match first {
            b'^' => {
                self.pos += 1;
                self.skip_whitespace();
                if !self.at_end() {
                    return Err(Error::ParseSyntax(
                        "^ operator cannot have anything after it".into(),
                    ));
                }
                return Ok(PluralRule::ALL);
            }
            b'=' => OP_EQ,
            b'<' => OP_LT,
            b'>' => OP_GT,
            b'~' => OP_BETWEEN,
            _ => {
                return Err(Error::ParseSyntax("must start with one of: ^ = < > ~".into()));
            }
        };
        self.pos += 1;

        // `<` and `>` extend to `<=` and `>=`
        self.skip_whitespace();
        if (op == OP_LT || op == OP_GT)
            && self.pos < self.bytes.len()
            && self.bytes[self.pos] == b'='
        {
            op += 1;
            self.pos += 1;
            self.skip_whitespace();
        }

        let first_num = self.number()?;
        self.skip_whitespace();

        if op != OP_BETWEEN {
            if !self.at_end() {
                return Err(Error::ParseSyntax("nothing can follow the number".into()));
            }
            return Ok(PluralRule { op, i0: first_num });
        }

        // `~ a-b`
        if self.at_end() || self.bytes[self.pos] != b'-' {
            return Err(Error::ParseSyntax(
                "~ operator must have a dash following the first number".into(),
            ));
        }
        self.pos += 1;
        self.skip_whitespace();
        let second_num = self.number().map_err(|_| {
            Error::ParseSyntax(format!(
                "the second number of the ~ operator must be a number between 0-{MAX_BETWEEN_DIFF} plus the first number"
            ))
        })?;
        let diff = i32::from(second_num) - i32::from(first_num);
        if diff < 0 || diff > i32::from(MAX_BETWEEN_DIFF) {
            return Err(Error::ParseSyntax(format!(
                "the second number of the ~ operator must be a number between 0-{MAX_BETWEEN_DIFF} plus the first number"
            )));
        }
        self.skip_whitespace();
        if !self.at_end() {
            return Err(Error::ParseSyntax("nothing can follow the second number".into()));
        }

        let diff = diff as u16;
        let (op, delta) = if diff >= HALF_BETWEEN_DIFF {
            (OP_BETWEEN_HIGH, diff - HALF_BETWEEN_DIFF)
        } else {
            (OP_BETWEEN, diff)
        };
        Ok(PluralRule {
            op: op | ((delta as u8) << 3),
            i0: first_num,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> PluralRule {
        PluralRule::parse(text).unwrap()
    }

    #[test]
    fn all_matches_everything() {
        let rule = parse("^");
        for c in [0u8, 1, 7, 255] {
            assert!(rule.matches(c));
        }
        assert_eq!(rule.to_bytes(), [0, 0]);
    }

    #[test]
    fn unary_operators() {
        assert!(parse("=3").matches(3));
        assert!(!parse("=3").matches(4));
        assert!(parse("<3").matches(2));
        assert!(!parse("<3").matches(3));
        assert!(parse("<=3").matches(3));
        assert!(parse(">3").matches(4));
        assert!(!parse(">3").matches(3));
        assert!(parse(">=3").matches(3));
    }

    #[test]
    fn whitespace_between_tokens() {
        assert_eq!(parse("< = 12"), parse("<=12"));
        assert_eq!(parse("~ 2 - 7"), parse("~2-7"));
        assert_eq!(parse("= 255"), parse("=255"));
    }

    #[test]
    fn between_low_and_high_encodings() {
        let low = parse("~2-7");
        assert_eq!(low.op(), CompareOp::Between);
        assert!(low.matches(2) && low.matches(7));
        assert!(!low.matches(1) && !low.matches(8));

        // delta 63 packs as BetweenHigh with stored delta 31
        let edge = parse("~0-63");
        assert_eq!(edge.op(), CompareOp::BetweenHigh);
        assert_eq!(edge.to_bytes(), [OP_BETWEEN_HIGH | (31 << 3), 0]);
        assert!(edge.matches(0) && edge.matches(63));
        assert!(!edge.matches(64));

        // delta 32 is the first high encoding
        let first_high = parse("~10-42");
        assert_eq!(first_high.op(), CompareOp::BetweenHigh);
        assert!(first_high.matches(42));
        assert!(!first_high.matches(43));
    }

    #[test]
    fn between_rejects_inverted_and_too_wide() {
        assert!(PluralRule::parse("~0-64").is_err());
        assert!(PluralRule::parse("~5-4").is_err());
        assert!(PluralRule::parse("~5").is_err());
        assert!(PluralRule::parse("~5-").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(PluralRule::parse("").is_err());
        assert!(PluralRule::parse("x5").is_err());
        assert!(PluralRule::parse("=").is_err());
        assert!(PluralRule::parse("=256").is_err());
        assert!(PluralRule::parse("=1000").is_err());
        assert!(PluralRule::parse("=5x").is_err());
        assert!(PluralRule::parse("^ extra").is_err());
        assert!(PluralRule::parse("~1-2-3").is_err());
    }

    #[test]
    fn render_is_the_parsing_inverse() {
        for text in ["^", "=0", "=255", "<9", "<=10", ">99", ">=100", "~2-7", "~0-63", "~200-255"] {
            let rule = parse(text);
            let rendered = rule.render();
            assert_eq!(PluralRule::parse(&rendered).unwrap(), rule, "{text} -> {rendered}");
        }
    }

    #[test]
    fn high_boundary_counts() {
        let rule = parse("~200-255");
        assert!(rule.matches(200));
        assert!(rule.matches(255));
        assert!(!rule.matches(199));
    }
}
