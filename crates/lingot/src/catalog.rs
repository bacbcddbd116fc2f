//! The per-language catalog: string heap, rule tables, fallback chain,
//! and the public lookup API.
//!
//! # Invariants
//!
//! 1. `rules` and `translations` each carry one trailing sentinel, so
//!    rule i spans `[rules[i].start_pos, rules[i+1].start_pos)` and
//!    translation i owns rules `[translations[i], translations[i+1])`.
//! 2. A catalog never mutates its heaps after load; the only one-shot
//!    assignment is the fallback link.
//! 3. The fallback being assigned must already have its own fallback
//!    assigned, which forces a topological order and makes fallback
//!    loops unrepresentable.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::dictionary::Dictionary;
use crate::error::Error;
use crate::expand;
use crate::format::{DefaultFormatter, Formatter};
use crate::plural::PluralRule;
use crate::types::{TransIndex, MAX_EMBEDDED_DEPTH};
use crate::value::Value;

/// Language metadata carried inside a compiled catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogSettings {
    pub name: String,
    pub language_identifier: String,
    pub fallback_name: String,
    pub missing_plural_rule: String,
}

/// Loose shape check for a language identifier: dash-separated ASCII
/// alphanumeric subtags, the first alphabetic.
pub(crate) fn is_valid_language_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let Some(first) = parts.next() else {
        return false;
    };
    if first.is_empty()
        || first.len() > 8
        || !first.bytes().all(|b| b.is_ascii_alphabetic())
    {
        return false;
    }
    parts.all(|p| {
        !p.is_empty() && p.len() <= 8 && p.bytes().all(|b| b.is_ascii_alphanumeric())
    })
}

/// One rule-table entry: where its bytecode begins, and its plural rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RuleEntry {
    pub start_pos: u32,
    pub rule: PluralRule,
}

/// The one-shot fallback assignment. The default language links to
/// itself; every other language links to another catalog.
pub(crate) enum FallbackLink {
    SelfLink,
    Other(Arc<LanguageCatalog>),
}

/// A loaded language: immutable string heap, rule tables, settings, and
/// a reference to the shared dictionary.
pub struct LanguageCatalog {
    strings_data: Vec<u8>,
    rules: Vec<RuleEntry>,
    translations: Vec<u32>,
    settings: CatalogSettings,
    dict: Arc<Dictionary>,
    fallback: OnceLock<FallbackLink>,
    formatter: OnceLock<Arc<dyn Formatter>>,
}

impl fmt::Debug for LanguageCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageCatalog")
            .field("language_identifier", &self.settings.language_identifier)
            .field("num_translations", &self.num_translations())
            .field("num_rules", &(self.rules.len() - 1))
            .field("data_size", &self.strings_data.len())
            .finish_non_exhaustive()
    }
}

impl LanguageCatalog {
    pub(crate) fn from_parts(
        strings_data: Vec<u8>,
        rules: Vec<RuleEntry>,
        translations: Vec<u32>,
        settings: CatalogSettings,
        dict: Arc<Dictionary>,
    ) -> Self {
        debug_assert!(!rules.is_empty() && !translations.is_empty());
        debug_assert_eq!(rules.last().map(|r| r.start_pos), Some(strings_data.len() as u32));
        Self {
            strings_data,
            rules,
            translations,
            settings,
            dict,
            fallback: OnceLock::new(),
            formatter: OnceLock::new(),
        }
    }

    /// Mark this catalog as the default language (fallback = itself).
    pub(crate) fn mark_default(&self) {
        let _ = self.fallback.set(FallbackLink::SelfLink);
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Number of translations in the catalog's dictionary.
    #[must_use]
    pub fn num_translations(&self) -> u32 {
        (self.translations.len() - 1) as u32
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    #[must_use]
    pub fn language_identifier(&self) -> &str {
        &self.settings.language_identifier
    }

    #[must_use]
    pub fn fallback_name(&self) -> &str {
        &self.settings.fallback_name
    }

    #[must_use]
    pub fn missing_plural_rule(&self) -> &str {
        &self.settings.missing_plural_rule
    }

    #[must_use]
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dict
    }

    /// Whether this catalog is its own fallback (the default language).
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self.fallback.get(), Some(FallbackLink::SelfLink))
    }

    /// `"Namespace.Entry"` for a translation index, for diagnostics.
    #[must_use]
    pub fn translation_id_lookup(&self, index: TransIndex) -> Option<String> {
        self.dict
            .reverse_lookup(index)
            .map(|(ns, id)| format!("{ns}.{id}"))
    }

    // ------------------------------------------------------------------
    // Fallback assignment
    // ------------------------------------------------------------------

    /// Assign the fallback language. Exactly-once; see the module
    /// invariants for the ordering rule that precludes loops.
    ///
    /// # Errors
    ///
    /// `FallbackChain` when the link is already set, self-referential,
    /// out of topological order, or disagrees with the declared
    /// fallback name; `DictionaryMismatch` hash incompatibilities are
    /// reported as `FallbackChain` with that message.
    pub fn set_fallback(&self, fallback: &Arc<LanguageCatalog>) -> Result<(), Error> {
        if self.fallback.get().is_some() {
            return Err(Error::FallbackChain("fallback language already set".into()));
        }
        if std::ptr::eq(self, Arc::as_ptr(fallback)) {
            return Err(Error::FallbackChain(
                "fallback language and parent language cannot be the same".into(),
            ));
        }
        if fallback.fallback.get().is_none() {
            return Err(Error::FallbackChain(format!(
                "fallback language \"{}\" must already have its fallback language set",
                fallback.language_identifier()
            )));
        }
        if !Arc::ptr_eq(&self.dict, &fallback.dict) && !self.dict.hash_matches(&fallback.dict) {
            return Err(Error::FallbackChain(
                "dictionaries of the two languages do not match".into(),
            ));
        }
        if self.settings.fallback_name != fallback.language_identifier() {
            if !self.settings.fallback_name.is_empty() {
                return Err(Error::FallbackChain(format!(
                    "fallback language identifier \"{}\" and parent language \"{}\" fallback language \"{}\" must match",
                    fallback.language_identifier(),
                    self.language_identifier(),
                    self.settings.fallback_name
                )));
            }
            if !fallback.is_default() {
                return Err(Error::FallbackChain(
                    "fallback language is not the default language".into(),
                ));
            }
        }
        self.fallback
            .set(FallbackLink::Other(Arc::clone(fallback)))
            .map_err(|_| Error::FallbackChain("fallback language already set".into()))
    }

    /// Install a custom locale formatter. One-shot; must happen before
    /// the first lookup that needs one.
    pub fn install_formatter(&self, formatter: Arc<dyn Formatter>) -> Result<(), Error> {
        self.formatter
            .set(formatter)
            .map_err(|_| Error::Registry("formatter already installed".into()))
    }

    pub(crate) fn formatter(&self) -> &Arc<dyn Formatter> {
        self.formatter.get_or_init(|| Arc::new(DefaultFormatter))
    }

    // ------------------------------------------------------------------
    // Lookup API
    // ------------------------------------------------------------------

    /// Retrieve a non-plural translation: the first `^` rule if any,
    /// otherwise the first rule in declaration order.
    pub fn get(&self, index: TransIndex, args: &[Value]) -> Result<String, Error> {
        self.get_real(index, None, 0, args)
    }

    /// Retrieve a plural translation. When no rule matches, the error
    /// carries the catalog's missing-plural-rule text.
    pub fn get_plural(
        &self,
        index: TransIndex,
        plural_count: u32,
        args: &[Value],
    ) -> Result<String, Error> {
        self.get_real(index, Some(plural_count), 0, args)
    }

    /// Retrieve a non-plural translation by namespace and entry name.
    pub fn get_named(&self, namespace: &str, id: &str, args: &[Value]) -> Result<String, Error> {
        self.get_real_named(namespace, id, None, args)
    }

    /// Retrieve a plural translation by namespace and entry name.
    pub fn get_plural_named(
        &self,
        namespace: &str,
        id: &str,
        plural_count: u32,
        args: &[Value],
    ) -> Result<String, Error> {
        self.get_real_named(namespace, id, Some(plural_count), args)
    }

    /// Like [`get`](Self::get), blanking the result on error.
    #[must_use]
    pub fn must_get(&self, index: TransIndex, args: &[Value]) -> String {
        blank_on_error(self.get(index, args))
    }

    /// Like [`get_plural`](Self::get_plural), returning the
    /// missing-plural-rule text when no rule matches and a blank string
    /// on any other error.
    #[must_use]
    pub fn must_get_plural(&self, index: TransIndex, plural_count: u32, args: &[Value]) -> String {
        blank_on_error(self.get_plural(index, plural_count, args))
    }

    /// Like [`get_named`](Self::get_named), blanking on error.
    #[must_use]
    pub fn must_get_named(&self, namespace: &str, id: &str, args: &[Value]) -> String {
        blank_on_error(self.get_named(namespace, id, args))
    }

    /// Like [`get_plural_named`](Self::get_plural_named), blanking on
    /// error.
    #[must_use]
    pub fn must_get_plural_named(
        &self,
        namespace: &str,
        id: &str,
        plural_count: u32,
        args: &[Value],
    ) -> String {
        blank_on_error(self.get_plural_named(namespace, id, plural_count, args))
    }

    fn get_real_named(
        &self,
        namespace: &str,
        id: &str,
        plural_count: Option<u32>,
        args: &[Value],
    ) -> Result<String, Error> {
        let Some(ns) = self.dict.namespace(namespace) else {
            return Err(Error::IndexOutOfRange(format!(
                "invalid namespace \"{namespace}\""
            )));
        };
        let Some(index) = ns.index_of(id) else {
            return Err(Error::IndexOutOfRange(format!(
                "invalid translation ID \"{namespace}.{id}\""
            )));
        };
        self.get_real(index, plural_count, 0, args)
    }

    /// Every `get*` form funnels here.
    pub(crate) fn get_real(
        &self,
        index: TransIndex,
        plural_count: Option<u32>,
        embedded_depth: usize,
        args: &[Value],
    ) -> Result<String, Error> {
        if index.as_u32() >= self.num_translations() {
            return Err(Error::IndexOutOfRange(format!(
                "invalid index location: {index}"
            )));
        }
        if embedded_depth > MAX_EMBEDDED_DEPTH {
            return Err(Error::EmbeddingDepth {
                path: self
                    .translation_id_lookup(index)
                    .unwrap_or_else(|| index.to_string()),
            });
        }

        // Walk the fallback chain to the first language that has rules.
        let mut current: &LanguageCatalog = self;
        let (slice_start, slice_len) = loop {
            let (start, len) = current.slice_bounds(index);
            if len != 0 {
                break (start, len);
            }
            match current.fallback.get() {
                None => {
                    return Err(Error::FallbackChain("fallback language was not set".into()))
                }
                Some(FallbackLink::SelfLink) => return Err(Error::NoRules),
                Some(FallbackLink::Other(next)) => current = next.as_ref(),
            }
        };

        let slice = &current.rules[slice_start..slice_start + slice_len];
        let matching = match plural_count {
            None => slice
                .iter()
                .position(|r| r.rule.is_match_all())
                .unwrap_or(0),
            Some(count) => {
                let clamped = count.min(255) as u8;
                match slice.iter().position(|r| r.rule.matches(clamped)) {
                    Some(i) => i,
                    None => {
                        return Err(Error::NoPluralMatch {
                            fallback_text: current.settings.missing_plural_rule.clone(),
                        })
                    }
                }
            }
        };

        // Expansion runs against `self` so embedded lookups restart at
        // the originally-requested language.
        let bytecode = current.bytecode_for(slice_start + matching);
        expand::expand(self, bytecode, plural_count, index, embedded_depth, args)
    }

    // ------------------------------------------------------------------
    // Internal table access
    // ------------------------------------------------------------------

    fn slice_bounds(&self, index: TransIndex) -> (usize, usize) {
        let i = index.as_usize();
        let start = self.translations[i] as usize;
        let end = self.translations[i + 1] as usize;
        (start, end - start)
    }

    fn bytecode_for(&self, rule_index: usize) -> &[u8] {
        let start = self.rules[rule_index].start_pos as usize;
        let end = self.rules[rule_index + 1].start_pos as usize;
        &self.strings_data[start..end]
    }

    pub(crate) fn strings_data(&self) -> &[u8] {
        &self.strings_data
    }

    pub(crate) fn rules(&self) -> &[RuleEntry] {
        &self.rules
    }

    pub(crate) fn translations(&self) -> &[u32] {
        &self.translations
    }

    pub(crate) fn settings(&self) -> &CatalogSettings {
        &self.settings
    }
}

fn blank_on_error(result: Result<String, Error>) -> String {
    match result {
        Ok(s) => s,
        Err(Error::NoPluralMatch { fallback_text }) => fallback_text,
        Err(_) => String::new(),
    }
}
