//! Error and diagnostic types shared across the pipeline.
//!
//! The kind set is closed: the compiler, the binary codecs, and the
//! runtime interpreter all report through [`Error`]. Compilation is the
//! one place errors accumulate instead of short-circuiting, so it wraps
//! its collected list in a [`CompileReport`].

use std::fmt;

use thiserror::Error;

/// Every failure the library can produce.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed plural rule, variable reference, escape, or embedded
    /// reference.
    #[error("syntax: {0}")]
    ParseSyntax(String),

    /// Unknown variable, duplicate declaration, missing or forbidden
    /// date-time specifier, bad variable type, and similar meaning-level
    /// problems.
    #[error("{0}")]
    ParseSemantic(String),

    /// Over 255 rules or variables, a bytecode length cap, or a soft-cap
    /// violation on a binary file.
    #[error("limit exceeded: {0}")]
    OverflowLimit(String),

    /// A catalog's stored dictionary hash does not match the loaded
    /// dictionary.
    #[error("dictionary does not match")]
    DictionaryMismatch,

    /// Embedded static translations form a loop. The path lists the
    /// participating entries in traversal order.
    #[error("found embedded translation loop: {path}")]
    EmbeddingCycle { path: String },

    /// An embedding chain exceeded the maximum depth of 100.
    #[error("max embedded translation nested level (100) reached: {path}")]
    EmbeddingDepth { path: String },

    /// A translation index or name does not resolve.
    #[error("{0}")]
    IndexOutOfRange(String),

    /// The fallback chain ended at the default language without any rule
    /// slice for the requested translation.
    #[error("no rules found for translation")]
    NoRules,

    /// Plural lookup found no matching rule. Carries the catalog's
    /// configured missing-plural-rule text, which the `must_get*` forms
    /// return in place of a translation.
    #[error("no plural rule matches")]
    NoPluralMatch { fallback_text: String },

    /// Missing, self-referential, or hash-incompatible fallback, or a
    /// fallback assigned out of topological order.
    #[error("fallback chain: {0}")]
    FallbackChain(String),

    /// Underlying stream failure or byte-level inconsistency, tagged with
    /// the offset at which it was detected.
    #[error("@{offset} {message}")]
    Io { offset: u64, message: String },

    /// A runtime argument is incompatible with the placeholder's
    /// variable type.
    #[error("{0}")]
    FormatArgType(String),

    /// A locale formatter failed to initialize or to format.
    #[error("formatter unavailable: {0}")]
    FormatterUnavailable(String),

    /// Lifecycle violation on the dictionary registry (double install,
    /// load before install, variable load after catalogs exist).
    #[error("registry: {0}")]
    Registry(String),

    /// One or more errors accumulated over a whole compilation.
    #[error("{0}")]
    Compile(CompileReport),
}

impl Error {
    pub(crate) fn io(offset: u64, message: impl Into<String>) -> Self {
        Self::Io {
            offset,
            message: message.into(),
        }
    }

    /// Re-wrap the message of a diagnostic kind with a location prefix,
    /// keeping the kind itself. Only the kinds the line compiler emits
    /// are prefixed; everything else passes through untouched.
    pub(crate) fn with_prefix(self, prefix: &str) -> Self {
        match self {
            Self::ParseSyntax(m) => Self::ParseSyntax(format!("{prefix}{m}")),
            Self::ParseSemantic(m) => Self::ParseSemantic(format!("{prefix}{m}")),
            Self::OverflowLimit(m) => Self::OverflowLimit(format!("{prefix}{m}")),
            Self::IndexOutOfRange(m) => Self::IndexOutOfRange(format!("{prefix}{m}")),
            other => other,
        }
    }
}

/// Errors and warnings collected across one compilation.
///
/// Warnings never fail a compilation; a non-empty error list discards all
/// partial progress.
#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    pub errors: Vec<Error>,
    pub warnings: Vec<String>,
}

impl CompileReport {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
            first = false;
        }
        Ok(())
    }
}
