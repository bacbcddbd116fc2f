//! Property-based round-trip invariants:
//!
//! 1. Rendering a packed plural rule and re-parsing it reproduces the
//!    same two bytes, for every representable rule.
//! 2. Generated documents with arbitrary literals, format flags, and
//!    embedded references compile and expand correctly.
//! 3. A dictionary written, read, and written again produces identical
//!    bytes and an identical identity hash.
//! 4. A compiled catalog written and read back answers every lookup
//!    identically.

use lingot::{
    save_catalog, save_dictionary, CompileOptions, Document, PluralRule, Registry, TransIndex,
    Value,
};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

fn unary_rule_text() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("="), Just("<"), Just("<="), Just(">"), Just(">=")],
        0u16..=255,
    )
        .prop_map(|(op, n)| format!("{op}{n}"))
}

fn between_rule_text() -> impl Strategy<Value = String> {
    (0u16..=255, 0u16..=63)
        .prop_filter("range must stay in 0..=255", |(a, d)| a + d <= 255)
        .prop_map(|(a, d)| format!("~{a}-{}", a + d))
}

fn rule_text() -> impl Strategy<Value = String> {
    prop_oneof![Just("^".to_owned()), unary_rule_text(), between_rule_text()]
}

/// Literal fragments that survive compilation untouched.
fn literal_text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 .,:;()!?'+-]{0,24}"
}

fn entry_id() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z0-9_]{0,8}"
}

// ── Plural rules ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn plural_rule_render_parse_is_identity(text in rule_text()) {
        let rule = PluralRule::parse(&text).expect("generated rule parses");
        let rendered = rule.render();
        let reparsed = PluralRule::parse(&rendered).expect("rendered rule parses");
        prop_assert_eq!(reparsed.to_bytes(), rule.to_bytes());
    }

    #[test]
    fn between_rules_match_exactly_their_range(
        (a, d) in (0u16..=255, 0u16..=63)
            .prop_filter("range must stay in 0..=255", |(a, d)| a + d <= 255)
    ) {
        let rule = PluralRule::parse(&format!("~{a}-{}", a + d)).unwrap();
        for count in 0..=255u16 {
            let expected = count >= a && count <= a + d;
            prop_assert_eq!(rule.matches(count as u8), expected, "count {}", count);
        }
    }
}

// ── Generated documents ─────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_documents_compile_and_expand(
        before in literal_text(),
        after in literal_text(),
        width in 0u16..=255,
        pad_right in any::<bool>(),
    ) {
        let flags = if pad_right {
            format!("-{width}")
        } else {
            width.to_string()
        };
        let body = format!("{before}{{{{.x|{flags}}}}}{after} {{{{*A}}}}");
        let json = format!(
            r#"{{
                "Settings": {{
                    "LanguageName": "English",
                    "LanguageIdentifier": "en",
                    "MissingPluralRule": "?"
                }},
                "NS": {{
                    "A": "anchor",
                    "E": {{ "x": "String", "^": {} }}
                }}
            }}"#,
            serde_json::to_string(&body).unwrap()
        );
        let registry = Registry::new();
        let loaded = registry
            .load_default_text(&Document::from_json_str(&json).unwrap(), &CompileOptions::default())
            .expect("generated document compiles");

        // compile → expand must place the argument with the given width
        let catalog = loaded.catalog;
        let e = catalog.dictionary().lookup("NS", "E").unwrap();
        let out = catalog.get(e, &[Value::from("zz")]).unwrap();
        prop_assert!(out.contains("zz"));
        prop_assert!(out.ends_with(" anchor"));
    }
}

// ── Binary round-trips ──────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn dictionary_write_read_write_is_stable(
        ids in proptest::collection::btree_set(entry_id(), 1..12),
    ) {
        let entries: Vec<String> = ids
            .iter()
            .map(|id| format!(r#""{id}":"body of {id}""#))
            .collect();
        let json = format!(
            r#"{{
                "Settings": {{
                    "LanguageName": "English",
                    "LanguageIdentifier": "en",
                    "MissingPluralRule": "?"
                }},
                "NS": {{ {} }}
            }}"#,
            entries.join(",")
        );
        let registry = Registry::new();
        let loaded = registry
            .load_default_text(&Document::from_json_str(&json).unwrap(), &CompileOptions::default())
            .unwrap();
        let dict = loaded.catalog.dictionary();

        let mut first = Vec::new();
        save_dictionary(dict, &mut first, false).unwrap();

        let fresh = Registry::new();
        fresh.load_dictionary(first.as_slice(), false).unwrap();
        let read = fresh.current().unwrap();
        prop_assert_eq!(read.hash(), dict.hash());

        let mut second = Vec::new();
        save_dictionary(&read, &mut second, false).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn catalog_write_read_preserves_lookups(
        bodies in proptest::collection::vec(literal_text(), 1..8),
        counts in proptest::collection::vec(0u32..=300, 4),
    ) {
        let entries: Vec<String> = bodies
            .iter()
            .enumerate()
            .map(|(i, body)| {
                format!(
                    r#""E{i}":{{"=1":{},"^":{}}}"#,
                    serde_json::to_string(&format!("one {body}")).unwrap(),
                    serde_json::to_string(body).unwrap()
                )
            })
            .collect();
        let json = format!(
            r#"{{
                "Settings": {{
                    "LanguageName": "English",
                    "LanguageIdentifier": "en",
                    "MissingPluralRule": "?"
                }},
                "NS": {{ {} }}
            }}"#,
            entries.join(",")
        );
        let registry = Registry::new();
        let catalog = registry
            .load_default_text(&Document::from_json_str(&json).unwrap(), &CompileOptions::default())
            .unwrap()
            .catalog;

        let mut dict_bytes = Vec::new();
        save_dictionary(catalog.dictionary(), &mut dict_bytes, false).unwrap();
        let mut cat_bytes = Vec::new();
        save_catalog(&catalog, &mut cat_bytes, false).unwrap();

        let fresh = Registry::new();
        fresh.load_dictionary(dict_bytes.as_slice(), false).unwrap();
        let read = fresh.load_default_catalog(cat_bytes.as_slice(), false).unwrap();

        for i in 0..catalog.num_translations() {
            let index = TransIndex(i);
            prop_assert_eq!(read.must_get(index, &[]), catalog.must_get(index, &[]));
            for &count in &counts {
                prop_assert_eq!(
                    read.must_get_plural(index, count, &[]),
                    catalog.must_get_plural(index, count, &[])
                );
            }
        }
    }
}
