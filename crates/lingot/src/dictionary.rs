//! The dictionary: the shared table of namespaces and translation IDs.
//!
//! # Invariants
//!
//! 1. Namespace and entry iteration order is authoring order; indices
//!    are dense across namespaces.
//! 2. A dictionary is immutable once shared: the compiler fills variable
//!    lists while it still owns the value, then freezes it in an `Arc`.
//! 3. The 20-byte identity hash is SHA-1 over the primary serialized
//!    form and is computed exactly once (while writing or while
//!    reading). It is the sole compatibility token between catalogs.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::document::Document;
use crate::error::Error;
use crate::types::{TransIndex, TranslationVar};
use crate::wire;

static NAMESPACE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("namespace pattern"));
static TRANSLATION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][\p{L}\p{N}_]*$").expect("translation-id pattern"));

/// Reserved top-level key holding language settings, never a namespace.
pub const SETTINGS_KEY: &str = "Settings";

/// One namespace: its entry-name table and, when loaded, the declared
/// variables of each entry in declaration order.
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    ids: IndexMap<String, TransIndex>,
    vars: Vec<Vec<TranslationVar>>,
}

impl Namespace {
    pub(crate) fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            ids: IndexMap::with_capacity(capacity),
            vars: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Entry names in declaration order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }

    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<TransIndex> {
        self.ids.get(id).copied()
    }

    pub(crate) fn insert(&mut self, id: String, index: TransIndex) {
        self.ids.insert(id, index);
    }

    pub(crate) fn name_at(&self, local: usize) -> Option<&str> {
        self.ids.get_index(local).map(|(k, _)| k.as_str())
    }

    /// Declared variables of the entry at a local index, if loaded.
    #[must_use]
    pub fn vars_at(&self, local: usize) -> Option<&[TranslationVar]> {
        self.vars.get(local).map(Vec::as_slice)
    }

    pub(crate) fn set_vars(&mut self, vars: Vec<Vec<TranslationVar>>) {
        debug_assert_eq!(vars.len(), self.ids.len());
        self.vars = vars;
    }
}

/// The shared catalog of namespaces and translation IDs.
#[derive(Debug, Clone)]
pub struct Dictionary {
    namespaces: IndexMap<String, Namespace>,
    hash: [u8; 20],
    vars_loaded: bool,
    total: u32,
}

impl Dictionary {
    pub(crate) fn from_parts(
        namespaces: IndexMap<String, Namespace>,
        hash: [u8; 20],
        vars_loaded: bool,
    ) -> Self {
        let total = namespaces.values().map(|n| n.len() as u32).sum();
        Self {
            namespaces,
            hash,
            vars_loaded,
            total,
        }
    }

    /// Build a dictionary from a translation document: every top-level
    /// key except `Settings` is a namespace, every key inside one is a
    /// translation ID. Names are validated, sizes are capped, and the
    /// identity hash is computed from the serialized form.
    ///
    /// # Errors
    ///
    /// All problems are accumulated and returned together.
    pub(crate) fn from_document(doc: &Document) -> Result<Self, Vec<Error>> {
        let mut errors = Vec::new();
        let mut namespaces: IndexMap<String, Namespace> = IndexMap::new();
        let mut num_translations: u64 = 0;
        let mut ids_size: u64 = 0;
        let mut namespaces_size: u64 = 0;

        for (name, node) in doc.iter() {
            if name == SETTINGS_KEY {
                continue;
            }
            if name.len() > 255 {
                errors.push(Error::OverflowLimit(format!(
                    "namespace \"{name}\" cannot be longer than 255 bytes"
                )));
                continue;
            }
            if !NAMESPACE_NAME.is_match(name) {
                errors.push(Error::ParseSemantic(format!(
                    "namespace \"{name}\" must start with a letter or underscore and contain only alphanumeric and underscore characters"
                )));
                continue;
            }
            if namespaces.contains_key(name) {
                errors.push(Error::ParseSemantic(format!(
                    "namespace \"{name}\" used more than once"
                )));
                continue;
            }
            let Some(ids) = node.as_map() else {
                errors.push(Error::ParseSemantic(format!(
                    "namespace \"{name}\" is not a dictionary"
                )));
                continue;
            };

            let mut namespace = Namespace::new(name.to_owned(), ids.len());
            namespaces_size += name.len() as u64;
            for (id, _) in ids.iter() {
                if id.len() > u16::MAX as usize {
                    errors.push(Error::OverflowLimit(format!(
                        "{name}.{id}: must be smaller than 64KB"
                    )));
                } else if !id.starts_with(|c: char| c.is_ascii_uppercase()) {
                    errors.push(Error::ParseSemantic(format!(
                        "{name}.{id}: must start with an upper case character (A-Z)"
                    )));
                } else if !TRANSLATION_ID.is_match(id) {
                    errors.push(Error::ParseSemantic(format!(
                        "{name}.{id}: can only contain unicode letters, unicode numbers, and underscores"
                    )));
                } else if namespace.index_of(id).is_some() {
                    errors.push(Error::ParseSemantic(format!(
                        "{name}.{id}: used more than once"
                    )));
                } else {
                    namespace.insert(id.to_owned(), TransIndex(num_translations as u32));
                    num_translations += 1;
                    ids_size += id.len() as u64;
                }
            }
            namespace.set_vars(vec![Vec::new(); namespace.len()]);
            namespaces.insert(name.to_owned(), namespace);
        }

        let header = wire::DictHeader {
            num_translations: num_translations.min(u64::from(u32::MAX)) as u32,
            num_namespaces: namespaces.len() as u32,
            ids_size: ids_size.min(u64::from(u32::MAX)) as u32,
            namespaces_size: namespaces_size.min(u64::from(u32::MAX)) as u32,
        };
        if num_translations > u64::from(u32::MAX) || ids_size > u64::from(u32::MAX) {
            errors.push(Error::OverflowLimit("u32 overflow occurred".into()));
        } else if let Err(e) = header.check_soft_caps() {
            errors.push(e);
        } else if header.compiled_file_size() > u64::from(u32::MAX) {
            errors.push(Error::OverflowLimit(
                "final dictionary file size cannot be larger than 4GB".into(),
            ));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let mut dict = Self::from_parts(namespaces, [0; 20], true);
        match wire::writer::dictionary_hash(&dict) {
            Ok(hash) => dict.hash = hash,
            Err(e) => return Err(vec![e]),
        }
        Ok(dict)
    }

    /// Total translation count across all namespaces.
    #[must_use]
    pub fn num_translations(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn num_namespaces(&self) -> usize {
        self.namespaces.len()
    }

    /// The 20-byte SHA-1 identity hash of the serialized dictionary.
    #[must_use]
    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    /// Whether per-entry variable information is present (text-file
    /// origin, or a loaded variable dictionary).
    #[must_use]
    pub fn vars_loaded(&self) -> bool {
        self.vars_loaded
    }

    /// Namespaces in declaration order.
    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values()
    }

    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.get(name)
    }

    /// Map `(namespace, entry)` to its global index.
    #[must_use]
    pub fn lookup(&self, namespace: &str, id: &str) -> Option<TransIndex> {
        self.namespaces.get(namespace)?.index_of(id)
    }

    /// Find the namespace containing a global index, along with the
    /// index of its first entry.
    #[must_use]
    pub(crate) fn namespace_of(&self, index: TransIndex) -> Option<(&Namespace, u32)> {
        let mut start = 0u32;
        for ns in self.namespaces.values() {
            let len = ns.len() as u32;
            if index.as_u32() < start + len {
                return Some((ns, start));
            }
            start += len;
        }
        None
    }

    /// Map a global index back to `(namespace name, entry name)`.
    #[must_use]
    pub fn reverse_lookup(&self, index: TransIndex) -> Option<(&str, &str)> {
        let (ns, start) = self.namespace_of(index)?;
        let local = (index.as_u32() - start) as usize;
        Some((ns.name(), ns.name_at(local)?))
    }

    /// The declared variables of a translation, when loaded.
    #[must_use]
    pub fn entry_vars(&self, index: TransIndex) -> Option<&[TranslationVar]> {
        let (ns, start) = self.namespace_of(index)?;
        ns.vars_at((index.as_u32() - start) as usize)
    }

    #[must_use]
    pub fn hash_matches(&self, other: &Dictionary) -> bool {
        self.hash == other.hash
    }

    pub(crate) fn set_hash(&mut self, hash: [u8; 20]) {
        self.hash = hash;
    }

    pub(crate) fn set_vars_loaded(&mut self, loaded: bool) {
        self.vars_loaded = loaded;
    }

    pub(crate) fn namespace_at_mut(&mut self, index: usize) -> Option<&mut Namespace> {
        self.namespaces.get_index_mut(index).map(|(_, ns)| ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;

    fn doc(json: &str) -> Document {
        Document::from_json_str(json).unwrap()
    }

    #[test]
    fn indices_are_dense_across_namespaces() {
        let dict = Dictionary::from_document(&doc(
            r#"{"Settings":{},"First":{"A":"1","B":"2"},"Second":{"C":"3"}}"#,
        ))
        .unwrap();
        assert_eq!(dict.num_translations(), 3);
        assert_eq!(dict.lookup("First", "A"), Some(TransIndex(0)));
        assert_eq!(dict.lookup("First", "B"), Some(TransIndex(1)));
        assert_eq!(dict.lookup("Second", "C"), Some(TransIndex(2)));
        assert_eq!(dict.lookup("Second", "A"), None);
    }

    #[test]
    fn reverse_lookup_finds_namespace_by_cumulative_size() {
        let dict = Dictionary::from_document(&doc(
            r#"{"First":{"A":"1","B":"2"},"Second":{"C":"3"}}"#,
        ))
        .unwrap();
        assert_eq!(dict.reverse_lookup(TransIndex(1)), Some(("First", "B")));
        assert_eq!(dict.reverse_lookup(TransIndex(2)), Some(("Second", "C")));
        assert_eq!(dict.reverse_lookup(TransIndex(3)), None);
    }

    #[test]
    fn settings_is_not_a_namespace() {
        let dict =
            Dictionary::from_document(&doc(r#"{"Settings":{"X":"y"},"NS":{"A":"1"}}"#)).unwrap();
        assert_eq!(dict.num_namespaces(), 1);
        assert!(dict.namespace("Settings").is_none());
    }

    #[test]
    fn bad_names_accumulate_errors() {
        let errs = Dictionary::from_document(&doc(
            r#"{"9bad":{"A":"1"},"Ok":{"lower":"1","Ok2":"2","Sp ace":"3"}}"#,
        ))
        .unwrap_err();
        // namespace starting with a digit, lowercase entry, entry with space
        assert_eq!(errs.len(), 3);
    }

    #[test]
    fn duplicate_namespace_is_rejected() {
        // the document deduplicates keys itself, so exercise the internal path
        let mut inner = Document::new();
        inner.insert_text("A", "1");
        let mut top = Document::new();
        top.insert("NS", Node::Map(inner));
        let dict = Dictionary::from_document(&top).unwrap();
        assert_eq!(dict.num_translations(), 1);
    }

    #[test]
    fn hash_is_stable_for_identical_documents() {
        let a = Dictionary::from_document(&doc(r#"{"NS":{"A":"1","B":"2"}}"#)).unwrap();
        let b = Dictionary::from_document(&doc(r#"{"NS":{"A":"1","B":"2"}}"#)).unwrap();
        let c = Dictionary::from_document(&doc(r#"{"NS":{"B":"1","A":"2"}}"#)).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert!(a.hash_matches(&b));
    }
}
