#![forbid(unsafe_code)]

//! Compact binary localization catalogs with a bytecode interpreter.
//!
//! Translations are authored per language in a structured text form,
//! compiled into packed binary catalogs that share a single dictionary,
//! and retrieved at runtime through constant indices. Translation
//! bodies compile to a small bytecode — literal bytes interleaved with
//! variable placeholders — which the interpreter expands on lookup with
//! plural-rule selection, locale-aware formatting, and fallback-chain
//! resolution.
//!
//! # Quick Start
//!
//! ```
//! use lingot::{CompileOptions, Document, Registry, TransIndex, Value};
//!
//! let doc = Document::from_json_str(r#"{
//!     "Settings": {
//!         "LanguageName": "English",
//!         "LanguageIdentifier": "en",
//!         "MissingPluralRule": "a few"
//!     },
//!     "Greetings": {
//!         "Hello": { "Name": "String", "^": "Hello, {{.Name}}!" },
//!         "Items": { "=0": "no items", "=1": "one item",
//!                    "^": "{{.PluralCount}} items" }
//!     }
//! }"#).unwrap();
//!
//! let registry = Registry::new();
//! let loaded = registry.load_default_text(&doc, &CompileOptions::default()).unwrap();
//! let catalog = loaded.catalog;
//!
//! assert_eq!(
//!     catalog.get_named("Greetings", "Hello", &[Value::from("Ada")]).unwrap(),
//!     "Hello, Ada!"
//! );
//! assert_eq!(
//!     catalog.get_plural(TransIndex(1), 7, &[]).unwrap(),
//!     "7 items"
//! );
//! ```
//!
//! The compiled artifacts round-trip through three binary files: the
//! dictionary (`DTR`, shared by every language and identified by a
//! SHA-1 hash), an optional variable dictionary (`VTR`, needed to
//! compile non-default languages against a compiled dictionary), and
//! one catalog per language (`GTR`).

pub mod bytecode;
pub mod catalog;
pub mod compile;
pub mod dictionary;
pub mod document;
pub mod error;
mod expand;
pub mod format;
pub mod plural;
pub mod registry;
pub mod types;
pub mod value;
pub mod wire;

pub use catalog::{CatalogSettings, LanguageCatalog};
pub use compile::CompileOptions;
pub use dictionary::{Dictionary, Namespace};
pub use document::{Document, Node};
pub use error::{CompileReport, Error};
pub use format::{DefaultFormatter, FormatSpec, Formatter};
pub use plural::{CompareOp, PluralRule};
pub use registry::{
    link_fallbacks, save_catalog, save_catalog_file, save_dictionary, save_dictionary_vars,
    Registry, TextLoad,
};
pub use types::{TransIndex, TranslationVar, VariableType, MAX_EMBEDDED_DEPTH};
pub use value::{Currency, Value};
