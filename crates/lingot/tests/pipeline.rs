//! End-to-end pipeline tests: author a document, compile it, exercise
//! lookups, round-trip through the binary forms, and resolve fallback
//! chains — the full life of a translation set.

use std::sync::Arc;

use lingot::{
    link_fallbacks, save_catalog, save_dictionary, save_dictionary_vars, CompileOptions,
    CompileReport, Document, Error, LanguageCatalog, Registry, TransIndex, Value,
};

const DEFAULT_JSON: &str = r#"{
    "Settings": {
        "LanguageName": "English",
        "LanguageIdentifier": "en",
        "MissingPluralRule": "a bunch"
    },
    "NS": {
        "Hi": "Hello",
        "W": { "x": "String", "^": "[{{.x|-5}}]" },
        "B": { "=0": "none", "=1": "one", "^": "many ({{.PluralCount}})" },
        "A": "X",
        "C": "see {{*A}} end",
        "T": "default",
        "OnlyOne": { "=1": "exactly one" }
    },
    "Other": {
        "Q": "{{*NS.Hi}} from afar"
    }
}"#;

fn load_default() -> (Registry, Arc<LanguageCatalog>) {
    let registry = Registry::new();
    let doc = Document::from_json_str(DEFAULT_JSON).unwrap();
    let loaded = registry
        .load_default_text(&doc, &CompileOptions::default())
        .unwrap();
    assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
    (registry, loaded.catalog)
}

fn ix(catalog: &LanguageCatalog, ns: &str, id: &str) -> TransIndex {
    catalog.dictionary().lookup(ns, id).unwrap()
}

// ── Lookup scenarios ────────────────────────────────────────────────────

#[test]
fn plain_string() {
    let (_registry, catalog) = load_default();
    assert_eq!(
        catalog.get(ix(&catalog, "NS", "Hi"), &[]).unwrap(),
        "Hello"
    );
}

#[test]
fn width_formatting() {
    let (_registry, catalog) = load_default();
    assert_eq!(
        catalog
            .get(ix(&catalog, "NS", "W"), &[Value::from("ab")])
            .unwrap(),
        "[ab   ]"
    );
}

#[test]
fn plural_selection() {
    let (_registry, catalog) = load_default();
    let b = ix(&catalog, "NS", "B");
    assert_eq!(catalog.get_plural(b, 0, &[]).unwrap(), "none");
    assert_eq!(catalog.get_plural(b, 1, &[]).unwrap(), "one");
    assert_eq!(catalog.get_plural(b, 7, &[]).unwrap(), "many (7)");
}

#[test]
fn plural_counts_above_255_clamp_for_selection_only() {
    let (_registry, catalog) = load_default();
    let b = ix(&catalog, "NS", "B");
    // selection clamps to 255, but the substituted count is untouched
    assert_eq!(catalog.get_plural(b, 1000, &[]).unwrap(), "many (1,000)");
}

#[test]
fn static_embedding() {
    let (_registry, catalog) = load_default();
    assert_eq!(
        catalog.get(ix(&catalog, "NS", "C"), &[]).unwrap(),
        "see X end"
    );
    // cross-namespace reference
    assert_eq!(
        catalog.get(ix(&catalog, "Other", "Q"), &[]).unwrap(),
        "Hello from afar"
    );
}

#[test]
fn missing_plural_rule_text_is_carried_by_the_error() {
    let (_registry, catalog) = load_default();
    let only_one = ix(&catalog, "NS", "OnlyOne");
    match catalog.get_plural(only_one, 5, &[]) {
        Err(Error::NoPluralMatch { fallback_text }) => assert_eq!(fallback_text, "a bunch"),
        other => panic!("expected NoPluralMatch, got {other:?}"),
    }
    assert_eq!(catalog.must_get_plural(only_one, 5, &[]), "a bunch");
    assert_eq!(catalog.must_get_plural(only_one, 1, &[]), "exactly one");
}

#[test]
fn fallback_resolution() {
    let (registry, default) = load_default();
    // the second language leaves NS.T (and most of the rest) out
    let second = registry
        .load_text(
            &Document::from_json_str(
                r#"{
                    "Settings": {
                        "LanguageName": "Deutsch",
                        "LanguageIdentifier": "de",
                        "MissingPluralRule": "einige"
                    },
                    "NS": { "Hi": "Hallo" }
                }"#,
            )
            .unwrap(),
            &CompileOptions::default(),
        )
        .unwrap()
        .catalog;
    second.set_fallback(&default).unwrap();

    assert_eq!(second.get(ix(&second, "NS", "Hi"), &[]).unwrap(), "Hallo");
    assert_eq!(second.get(ix(&second, "NS", "T"), &[]).unwrap(), "default");
    assert_eq!(second.name(), "Deutsch");
    assert_eq!(second.language_identifier(), "de");
    assert_eq!(second.fallback_name(), "");
}

#[test]
fn cycle_detection_reports_participants() {
    let registry = Registry::new();
    let doc = Document::from_json_str(
        r#"{
            "Settings": {
                "LanguageName": "English",
                "LanguageIdentifier": "en",
                "MissingPluralRule": "?"
            },
            "NS": { "A": "{{*B}}", "B": "{{*A}}" }
        }"#,
    )
    .unwrap();
    let err = registry
        .load_default_text(&doc, &CompileOptions::default())
        .unwrap_err();
    let Error::Compile(CompileReport { errors, .. }) = err else {
        panic!("expected a compile report");
    };
    match errors.as_slice() {
        [Error::EmbeddingCycle { path }] => assert_eq!(path, "NS.A -> NS.B -> NS.A"),
        other => panic!("expected a cycle, got {other:?}"),
    }
}

// ── Binary round-trips ──────────────────────────────────────────────────

#[test]
fn dictionary_write_read_preserves_identity() {
    let (_registry, catalog) = load_default();
    let dict = catalog.dictionary();

    for compressed in [false, true] {
        let mut bytes = Vec::new();
        save_dictionary(dict, &mut bytes, compressed).unwrap();

        let fresh = Registry::new();
        fresh.load_dictionary(bytes.as_slice(), compressed).unwrap();
        let read = fresh.current().unwrap();

        assert_eq!(read.hash(), dict.hash());
        assert_eq!(read.num_translations(), dict.num_translations());
        let read_names: Vec<&str> = read.namespaces().map(|n| n.name()).collect();
        let orig_names: Vec<&str> = dict.namespaces().map(|n| n.name()).collect();
        assert_eq!(read_names, orig_names);
        assert_eq!(read.lookup("Other", "Q"), dict.lookup("Other", "Q"));
        assert_eq!(
            read.reverse_lookup(TransIndex(0)),
            dict.reverse_lookup(TransIndex(0))
        );
    }
}

#[test]
fn catalog_write_read_preserves_every_lookup() {
    let (_registry, catalog) = load_default();

    for compressed in [false, true] {
        let mut dict_bytes = Vec::new();
        save_dictionary(catalog.dictionary(), &mut dict_bytes, compressed).unwrap();
        let mut cat_bytes = Vec::new();
        save_catalog(&catalog, &mut cat_bytes, compressed).unwrap();

        let fresh = Registry::new();
        fresh
            .load_dictionary(dict_bytes.as_slice(), compressed)
            .unwrap();
        let read = fresh
            .load_default_catalog(cat_bytes.as_slice(), compressed)
            .unwrap();

        assert_eq!(read.num_translations(), catalog.num_translations());
        assert_eq!(read.missing_plural_rule(), catalog.missing_plural_rule());
        for i in 0..catalog.num_translations() {
            let index = TransIndex(i);
            let args = [Value::from("ab")];
            assert_eq!(
                read.must_get(index, &args),
                catalog.must_get(index, &args),
                "non-plural mismatch at {i}"
            );
            for count in [0u32, 1, 2, 7] {
                assert_eq!(
                    read.must_get_plural(index, count, &args),
                    catalog.must_get_plural(index, count, &args),
                    "plural mismatch at {i} count {count}"
                );
            }
        }
    }
}

#[test]
fn corrupted_catalog_hash_is_a_dictionary_mismatch() {
    let (_registry, catalog) = load_default();
    let mut cat_bytes = Vec::new();
    save_catalog(&catalog, &mut cat_bytes, false).unwrap();
    // the dictionary hash lives at offset 20 of the header
    cat_bytes[20] ^= 0xFF;

    let fresh = Registry::new();
    let mut dict_bytes = Vec::new();
    save_dictionary(catalog.dictionary(), &mut dict_bytes, false).unwrap();
    fresh.load_dictionary(dict_bytes.as_slice(), false).unwrap();
    assert!(matches!(
        fresh.load_catalog(cat_bytes.as_slice(), false),
        Err(Error::DictionaryMismatch)
    ));
}

#[test]
fn variable_dictionary_enables_non_default_compiles() {
    let (_registry, catalog) = load_default();
    let mut dict_bytes = Vec::new();
    save_dictionary(catalog.dictionary(), &mut dict_bytes, false).unwrap();
    let mut vars_bytes = Vec::new();
    save_dictionary_vars(catalog.dictionary(), &mut vars_bytes, false).unwrap();
    let mut cat_bytes = Vec::new();
    save_catalog(&catalog, &mut cat_bytes, false).unwrap();

    let fresh = Registry::new();
    fresh.load_dictionary(dict_bytes.as_slice(), false).unwrap();

    // without the variable dictionary, text compiles are refused
    let de_doc = Document::from_json_str(
        r#"{
            "Settings": {
                "LanguageName": "Deutsch",
                "LanguageIdentifier": "de",
                "MissingPluralRule": "einige"
            },
            "NS": { "W": { "x": "String", "^": "<{{.x}}>" } }
        }"#,
    )
    .unwrap();
    assert!(fresh
        .load_text(&de_doc, &CompileOptions::default())
        .is_err());

    fresh
        .load_dictionary_vars(vars_bytes.as_slice(), false)
        .unwrap();
    assert!(fresh.current().unwrap().vars_loaded());

    let default = fresh
        .load_default_catalog(cat_bytes.as_slice(), false)
        .unwrap();
    let second = fresh
        .load_text(&de_doc, &CompileOptions::default())
        .unwrap()
        .catalog;
    second.set_fallback(&default).unwrap();

    assert_eq!(
        second
            .get_named("NS", "W", &[Value::from("ab")])
            .unwrap(),
        "<ab>"
    );
    // everything else falls through to the loaded default
    assert_eq!(second.get_named("NS", "Hi", &[]).unwrap(), "Hello");
}

#[test]
fn whole_set_links_in_topological_order() {
    let (registry, default) = load_default();
    let mut catalogs = vec![Arc::clone(&default)];
    for (ident, fallback, hi) in [
        ("fr-CA", "fr", "Salut"),
        ("fr", "", "Bonjour"),
        ("de", "fr", "Hallo"),
    ] {
        let json = format!(
            r#"{{
                "Settings": {{
                    "LanguageName": "{ident}",
                    "LanguageIdentifier": "{ident}",
                    "MissingPluralRule": "?",
                    "FallbackLanguage": "{fallback}"
                }},
                "NS": {{ "Hi": "{hi}" }}
            }}"#
        );
        catalogs.push(
            registry
                .load_text(
                    &Document::from_json_str(&json).unwrap(),
                    &CompileOptions::default(),
                )
                .unwrap()
                .catalog,
        );
    }
    link_fallbacks(&catalogs, &default).unwrap();

    let fr_ca = &catalogs[1];
    assert_eq!(fr_ca.get_named("NS", "Hi", &[]).unwrap(), "Salut");
    // NS.T is only defined in the default language, three hops away
    assert_eq!(fr_ca.get_named("NS", "T", &[]).unwrap(), "default");
}

#[test]
fn lenient_json_front_end_accepts_trailing_commas() {
    let registry = Registry::new();
    let json = "{\n  \"Settings\": {\n    \"LanguageName\": \"English\",\n    \"LanguageIdentifier\": \"en\",\n    \"MissingPluralRule\": \"?\",\n  },\n  \"NS\": { \"Hi\": \"Hello\" }\n}";
    assert!(Document::from_json_str(json).is_err());
    let doc = Document::from_json_str_lenient(json).unwrap();
    let loaded = registry
        .load_default_text(&doc, &CompileOptions::default())
        .unwrap();
    assert_eq!(loaded.catalog.get_named("NS", "Hi", &[]).unwrap(), "Hello");
}
