//! The dictionary registry and the load/save entry points.
//!
//! A [`Registry`] owns the install-once dictionary slot that every
//! catalog of one translation set shares. It is an explicit value, not
//! a process global: tests and embedders construct as many independent
//! registries as they need.
//!
//! # Invariants
//!
//! 1. Install-once: a second default-language or dictionary load fails
//!    until [`Registry::clear`] is called.
//! 2. Variable dictionaries load at most once, immediately after the
//!    dictionary and before any catalog load.
//! 3. Loaded catalogs never observe a dictionary change: they hold
//!    their own `Arc`.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, RwLock};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::catalog::LanguageCatalog;
use crate::compile::{self, CompileOptions};
use crate::dictionary::Dictionary;
use crate::document::Document;
use crate::error::Error;
use crate::wire;

/// Result of loading a language from its text form.
#[derive(Debug)]
pub struct TextLoad {
    pub catalog: Arc<LanguageCatalog>,
    /// Non-fatal findings, each located as `namespace.entry`.
    pub warnings: Vec<String>,
}

/// Owner of the shared dictionary slot.
#[derive(Default)]
pub struct Registry {
    dict: RwLock<Option<Arc<Dictionary>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the installed dictionary, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Dictionary>> {
        self.dict.read().expect("registry lock").clone()
    }

    #[must_use]
    pub fn has_current(&self) -> bool {
        self.dict.read().expect("registry lock").is_some()
    }

    /// Erase the stored dictionary. Catalogs loaded before the clear
    /// keep working; they are simply incompatible with catalogs loaded
    /// against a different dictionary. Returns whether one was loaded.
    pub fn clear(&self) -> bool {
        self.dict.write().expect("registry lock").take().is_some()
    }

    fn install(&self, dict: Arc<Dictionary>) -> Result<(), Error> {
        let mut slot = self.dict.write().expect("registry lock");
        if slot.is_some() {
            return Err(Error::Registry("dictionary already loaded".into()));
        }
        *slot = Some(dict);
        Ok(())
    }

    fn require(&self) -> Result<Arc<Dictionary>, Error> {
        self.current().ok_or_else(|| {
            Error::Registry(
                "the dictionary has not been loaded yet; load the default language text file or a compiled dictionary first"
                    .into(),
            )
        })
    }

    // ------------------------------------------------------------------
    // Text loads
    // ------------------------------------------------------------------

    /// Compile the default language, build its dictionary, and install
    /// it. The returned catalog is its own fallback.
    pub fn load_default_text(
        &self,
        doc: &Document,
        options: &CompileOptions,
    ) -> Result<TextLoad, Error> {
        if self.has_current() {
            return Err(Error::Registry(
                "the dictionary was already loaded; load this language as a non-default text file"
                    .into(),
            ));
        }
        let (catalog, warnings) =
            compile::compile(doc, None, options).map_err(Error::Compile)?;
        self.install(Arc::clone(catalog.dictionary()))?;
        let catalog = Arc::new(catalog);
        catalog.mark_default();
        debug!(language = %catalog.language_identifier(), "loaded default language from text");
        Ok(TextLoad { catalog, warnings })
    }

    /// Compile a non-default language against the installed dictionary.
    /// The fallback still needs to be assigned afterwards.
    pub fn load_text(&self, doc: &Document, options: &CompileOptions) -> Result<TextLoad, Error> {
        let dict = self.require()?;
        let (catalog, warnings) =
            compile::compile(doc, Some(dict), options).map_err(Error::Compile)?;
        let catalog = Arc::new(catalog);
        debug!(language = %catalog.language_identifier(), "loaded language from text");
        Ok(TextLoad { catalog, warnings })
    }

    // ------------------------------------------------------------------
    // Binary loads
    // ------------------------------------------------------------------

    /// Load a compiled dictionary file. Install-once.
    pub fn load_dictionary<R: Read>(&self, reader: R, compressed: bool) -> Result<(), Error> {
        if self.has_current() {
            return Err(Error::Registry("dictionary already loaded".into()));
        }
        let dict = with_decompressed(reader, compressed, |r| wire::read_dictionary(r))?;
        self.install(Arc::new(dict))
    }

    /// Load the companion variable dictionary. Must directly follow
    /// [`load_dictionary`](Self::load_dictionary), before any catalog
    /// is loaded (the dictionary must not be shared yet).
    pub fn load_dictionary_vars<R: Read>(&self, reader: R, compressed: bool) -> Result<(), Error> {
        let mut slot = self.dict.write().expect("registry lock");
        let Some(dict) = slot.as_mut() else {
            return Err(Error::Registry(
                "the dictionary has not been loaded yet; load the default language text file or a compiled dictionary first"
                    .into(),
            ));
        };
        let Some(dict) = Arc::get_mut(dict) else {
            return Err(Error::Registry(
                "the variable dictionary must be loaded before any catalog shares the dictionary"
                    .into(),
            ));
        };
        with_decompressed(reader, compressed, |r| {
            wire::read_dictionary_vars(r, dict)
        })
    }

    /// Load a compiled catalog. The fallback still needs to be
    /// assigned afterwards.
    pub fn load_catalog<R: Read>(
        &self,
        reader: R,
        compressed: bool,
    ) -> Result<Arc<LanguageCatalog>, Error> {
        let dict = self.require()?;
        let catalog =
            with_decompressed(reader, compressed, |r| wire::read_catalog(r, &dict))?;
        debug!(language = %catalog.language_identifier(), "loaded compiled catalog");
        Ok(Arc::new(catalog))
    }

    /// Load the default language's compiled catalog; it becomes its own
    /// fallback.
    pub fn load_default_catalog<R: Read>(
        &self,
        reader: R,
        compressed: bool,
    ) -> Result<Arc<LanguageCatalog>, Error> {
        let catalog = self.load_catalog(reader, compressed)?;
        catalog.mark_default();
        Ok(catalog)
    }
}

fn with_decompressed<R: Read, T>(
    reader: R,
    compressed: bool,
    parse: impl FnOnce(&mut dyn Read) -> Result<T, Error>,
) -> Result<T, Error> {
    if compressed {
        parse(&mut GzDecoder::new(reader))
    } else {
        let mut reader = reader;
        parse(&mut reader)
    }
}

// ----------------------------------------------------------------------
// Saving
// ----------------------------------------------------------------------

fn with_compressed<W: Write>(
    writer: W,
    compressed: bool,
    write: impl FnOnce(&mut dyn Write) -> Result<(), Error>,
) -> Result<(), Error> {
    if compressed {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        write(&mut encoder)?;
        encoder
            .finish()
            .map(|_| ())
            .map_err(|e| Error::io(0, format!("could not finish gzip stream: {e}")))
    } else {
        let mut writer = writer;
        write(&mut writer)
    }
}

/// Serialize a dictionary, optionally gzip-framed.
pub fn save_dictionary<W: Write>(
    dict: &Dictionary,
    writer: W,
    compressed: bool,
) -> Result<(), Error> {
    with_compressed(writer, compressed, |w| {
        wire::write_dictionary(dict, w).map(|_| ())
    })
}

/// Serialize a variable dictionary, optionally gzip-framed.
pub fn save_dictionary_vars<W: Write>(
    dict: &Dictionary,
    writer: W,
    compressed: bool,
) -> Result<(), Error> {
    with_compressed(writer, compressed, |w| wire::write_dictionary_vars(dict, w))
}

/// Serialize a catalog, optionally gzip-framed.
pub fn save_catalog<W: Write>(
    catalog: &LanguageCatalog,
    writer: W,
    compressed: bool,
) -> Result<(), Error> {
    with_compressed(writer, compressed, |w| wire::write_catalog(catalog, w))
}

/// Write a catalog to a file path.
pub fn save_catalog_file(
    catalog: &LanguageCatalog,
    path: &Path,
    compressed: bool,
) -> Result<(), Error> {
    let file = std::fs::File::create(path)
        .map_err(|e| Error::io(0, format!("could not create {}: {e}", path.display())))?;
    save_catalog(catalog, file, compressed)
}

// ----------------------------------------------------------------------
// Fallback-chain linking
// ----------------------------------------------------------------------

/// Assign fallbacks for a whole set of loaded catalogs in topological
/// order. Catalogs with an empty declared fallback link straight to the
/// default language; the rest link to the catalog whose identifier
/// matches their declaration.
///
/// # Errors
///
/// `FallbackChain` when a declaration cannot be resolved (missing
/// language, or mutually-dependent declarations that never become
/// linkable).
pub fn link_fallbacks(
    catalogs: &[Arc<LanguageCatalog>],
    default: &Arc<LanguageCatalog>,
) -> Result<(), Error> {
    let mut linked: Vec<&Arc<LanguageCatalog>> = vec![default];
    let mut remaining: Vec<&Arc<LanguageCatalog>> = catalogs
        .iter()
        .filter(|c| !Arc::ptr_eq(c, default))
        .collect();

    while !remaining.is_empty() {
        let mut progressed = false;
        let mut deferred = Vec::with_capacity(remaining.len());
        for candidate in remaining {
            let target = if candidate.fallback_name().is_empty() {
                Some(default)
            } else {
                linked
                    .iter()
                    .find(|l| l.language_identifier() == candidate.fallback_name())
                    .copied()
            };
            match target {
                Some(target) => {
                    candidate.set_fallback(target)?;
                    linked.push(candidate);
                    progressed = true;
                }
                None => deferred.push(candidate),
            }
        }
        remaining = deferred;
        if !progressed && !remaining.is_empty() {
            let stuck: Vec<&str> = remaining
                .iter()
                .map(|c| c.language_identifier())
                .collect();
            return Err(Error::FallbackChain(format!(
                "fallback languages could not be set for: {}",
                stuck.join(", ")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_JSON: &str = r#"{
        "Settings":{"LanguageName":"English","LanguageIdentifier":"en","MissingPluralRule":"?"},
        "NS":{"Hi":"Hello","Bye":"Goodbye"}
    }"#;

    fn default_doc() -> Document {
        Document::from_json_str(DEFAULT_JSON).unwrap()
    }

    #[test]
    fn install_once_then_clear() {
        let registry = Registry::new();
        assert!(!registry.has_current());
        let loaded = registry
            .load_default_text(&default_doc(), &CompileOptions::default())
            .unwrap();
        assert!(registry.has_current());
        assert!(loaded.catalog.is_default());

        // a second default load is rejected
        assert!(matches!(
            registry.load_default_text(&default_doc(), &CompileOptions::default()),
            Err(Error::Registry(_))
        ));

        assert!(registry.clear());
        assert!(!registry.clear());
        assert!(registry
            .load_default_text(&default_doc(), &CompileOptions::default())
            .is_ok());
    }

    #[test]
    fn non_default_load_requires_a_dictionary() {
        let registry = Registry::new();
        assert!(matches!(
            registry.load_text(&default_doc(), &CompileOptions::default()),
            Err(Error::Registry(_))
        ));
    }

    #[test]
    fn catalog_load_requires_a_dictionary() {
        let registry = Registry::new();
        assert!(matches!(
            registry.load_catalog(&b"GTR"[..], false),
            Err(Error::Registry(_))
        ));
    }

    #[test]
    fn vars_load_is_rejected_once_shared() {
        let registry = Registry::new();
        let loaded = registry
            .load_default_text(&default_doc(), &CompileOptions::default())
            .unwrap();
        // the default catalog holds a second Arc to the dictionary
        let mut vars_bytes = Vec::new();
        save_dictionary_vars(loaded.catalog.dictionary(), &mut vars_bytes, false).unwrap();
        assert!(matches!(
            registry.load_dictionary_vars(vars_bytes.as_slice(), false),
            Err(Error::Registry(_))
        ));
    }

    #[test]
    fn link_fallbacks_orders_topologically() {
        let registry = Registry::new();
        let default = registry
            .load_default_text(&default_doc(), &CompileOptions::default())
            .unwrap()
            .catalog;

        let make = |ident: &str, fallback: &str| {
            let json = format!(
                r#"{{"Settings":{{"LanguageName":"{ident}","LanguageIdentifier":"{ident}","MissingPluralRule":"?","FallbackLanguage":"{fallback}"}},"NS":{{"Hi":"{ident} hi"}}}}"#
            );
            registry
                .load_text(&Document::from_json_str(&json).unwrap(), &CompileOptions::default())
                .unwrap()
                .catalog
        };

        // given out of dependency order on purpose
        let c = make("fr-CA", "fr");
        let b = make("fr", "en");
        let all = vec![Arc::clone(&c), Arc::clone(&b), Arc::clone(&default)];
        link_fallbacks(&all, &default).unwrap();

        // fr-CA -> fr -> en
        assert_eq!(c.get_named("NS", "Bye", &[]).unwrap(), "Goodbye");
    }

    #[test]
    fn link_fallbacks_reports_unresolvable() {
        let registry = Registry::new();
        let default = registry
            .load_default_text(&default_doc(), &CompileOptions::default())
            .unwrap()
            .catalog;

        let json = r#"{"Settings":{"LanguageName":"German","LanguageIdentifier":"de","MissingPluralRule":"?","FallbackLanguage":"nope"},"NS":{"Hi":"Hallo"}}"#;
        let orphan = registry
            .load_text(&Document::from_json_str(json).unwrap(), &CompileOptions::default())
            .unwrap()
            .catalog;

        let err = link_fallbacks(&[orphan], &default).unwrap_err();
        assert!(err.to_string().contains("de"), "{err}");
    }
}
