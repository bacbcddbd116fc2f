//! The text compiler: drives a front-end-agnostic document into a
//! dictionary and a compiled language catalog.
//!
//! Variable declarations are extracted sequentially (for the default
//! language they populate the shared dictionary); rule bodies then
//! compile in parallel across a rayon pool, each landing in its own
//! result slot. The join stitches slots in (namespace, entry, rule)
//! order, so output is a deterministic function of the document no
//! matter how workers interleave.
//!
//! Errors and warnings accumulate across the whole document; any error
//! discards the compiled catalog.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use rayon::prelude::*;
use regex::Regex;
use tracing::debug;

use crate::bytecode::{self, VarTable};
use crate::catalog::{is_valid_language_tag, CatalogSettings, LanguageCatalog, RuleEntry};
use crate::dictionary::{Dictionary, SETTINGS_KEY};
use crate::document::{Document, Node};
use crate::error::{CompileReport, Error};
use crate::plural::PluralRule;
use crate::types::{TransIndex, TranslationVar, VariableType, MAX_EMBEDDED_DEPTH};
use crate::wire::{CatalogHeader, RULE16_SIZE, RULE32_SIZE};

static VARIABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{N}_]+$").expect("variable name pattern"));

/// Knobs for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Permit single rule bodies above 64 KiB (widens the on-disk rule
    /// records from 4 to 8 bytes).
    pub allow_big_strings: bool,
}

/// One translation entry queued for body compilation.
struct EntryJob {
    location: String,
    namespace: String,
    rules: Vec<(PluralRule, String)>,
    vars: VarTable,
    present: bool,
}

/// Per-entry output slot of the parallel phase.
struct EntrySlot {
    compiled: Vec<(PluralRule, Vec<u8>)>,
    embedded: Vec<TransIndex>,
    errors: Vec<Error>,
}

/// Compile one document into a catalog.
///
/// With no `existing_dict`, the document defines the dictionary and the
/// result is the default language; otherwise the dictionary (which must
/// carry variable information) defines the shape and mismatches warn.
pub(crate) fn compile(
    doc: &Document,
    existing_dict: Option<Arc<Dictionary>>,
    options: &CompileOptions,
) -> Result<(LanguageCatalog, Vec<String>), CompileReport> {
    let mut report = CompileReport::default();

    let settings = read_settings(doc, &mut report);
    let is_default = existing_dict.is_none();

    let mut owned_dict = None;
    let shared_dict = match existing_dict {
        Some(dict) => {
            if !dict.vars_loaded() {
                report.errors.push(Error::ParseSemantic(
                    "given dictionary must carry variable information (text-file origin or a loaded variable dictionary)"
                        .into(),
                ));
                return Err(report);
            }
            Some(dict)
        }
        None => {
            match Dictionary::from_document(doc) {
                Ok(dict) => owned_dict = Some(dict),
                Err(errors) => {
                    report.errors.extend(errors);
                    return Err(report);
                }
            }
            None
        }
    };
    let dict_view: &Dictionary = shared_dict
        .as_deref()
        .or(owned_dict.as_ref())
        .expect("dictionary present");

    // Snapshot the dictionary layout so the extraction loop below can
    // run without holding a borrow on the dictionary itself.
    let layout: Vec<(String, Vec<String>)> = dict_view
        .namespaces()
        .map(|ns| {
            (
                ns.name().to_owned(),
                ns.entry_names().map(str::to_owned).collect(),
            )
        })
        .collect();

    // ------------------------------------------------------------------
    // Sequential phase: property tuples and variable declarations
    // ------------------------------------------------------------------

    let mut jobs: Vec<EntryJob> = Vec::with_capacity(dict_view.num_translations() as usize);
    let mut declared_vars: Vec<Vec<Vec<TranslationVar>>> = Vec::with_capacity(layout.len());
    let mut seen_namespaces: Vec<&str> = Vec::new();
    let mut global_index = 0u32;

    for (ns_name, entry_names) in &layout {
        let mut ns_declared: Vec<Vec<TranslationVar>> = Vec::with_capacity(entry_names.len());
        let doc_namespace = match doc.get(ns_name) {
            Some(node) => {
                seen_namespaces.push(ns_name);
                match node.as_map() {
                    Some(map) => Some(map),
                    None => {
                        report
                            .warnings
                            .push(format!("namespace \"{ns_name}\" could not be read"));
                        None
                    }
                }
            }
            None => {
                if !is_default {
                    report
                        .warnings
                        .push(format!("namespace \"{ns_name}\" not found in language file"));
                }
                None
            }
        };

        let mut seen_entries: Vec<&str> = Vec::with_capacity(entry_names.len());
        for entry_name in entry_names {
            let location = format!("{ns_name}.{entry_name}");
            let entry_index = global_index;
            global_index += 1;

            let value = doc_namespace.and_then(|ns| {
                let v = ns.get(entry_name);
                if v.is_some() {
                    seen_entries.push(entry_name);
                }
                v
            });
            let Some(value) = value else {
                if doc_namespace.is_some() {
                    report
                        .warnings
                        .push(format!("{location}: translation is missing from namespace"));
                }
                ns_declared.push(Vec::new());
                jobs.push(EntryJob {
                    location,
                    namespace: ns_name.clone(),
                    rules: Vec::new(),
                    vars: VarTable::new(),
                    present: false,
                });
                continue;
            };

            // property tuples: a scalar is shorthand for a single ^ rule
            let mut props: Vec<(&str, &str)> = Vec::new();
            match value {
                Node::Text(text) => props.push(("^", text)),
                Node::Map(map) => {
                    for (prop_name, prop_value) in map.iter() {
                        match prop_value.as_text() {
                            Some(text) => props.push((prop_name, text)),
                            None => report.errors.push(Error::ParseSemantic(format!(
                                "{location}.{prop_name}: must be a string"
                            ))),
                        }
                    }
                }
            }

            let default_vars = if is_default {
                None
            } else {
                Some(dict_view.entry_vars(TransIndex(entry_index)).unwrap_or(&[]))
            };
            let (rules, vars, declared) =
                extract_entry(&props, &location, default_vars, &mut report);
            ns_declared.push(declared);
            jobs.push(EntryJob {
                location,
                namespace: ns_name.clone(),
                rules,
                vars,
                present: true,
            });
        }

        // entries present in the document but absent from the dictionary
        if let Some(doc_ns) = doc_namespace {
            for (id, _) in doc_ns.iter() {
                if !seen_entries.contains(&id) {
                    report
                        .warnings
                        .push(format!("{ns_name}.{id}: extra translation in namespace"));
                }
            }
        }
        declared_vars.push(ns_declared);
    }

    for (name, _) in doc.iter() {
        if name != SETTINGS_KEY && !seen_namespaces.contains(&name) {
            report.warnings.push(format!("{name}: extra namespace"));
        }
    }

    // Install the declared variables for the default language, then
    // freeze the dictionary for sharing.
    let dict: Arc<Dictionary> = match shared_dict {
        Some(dict) => dict,
        None => {
            let mut dict = owned_dict.expect("owned dictionary");
            for (ns_index, ns_vars) in declared_vars.into_iter().enumerate() {
                if let Some(ns) = dict.namespace_at_mut(ns_index) {
                    ns.set_vars(ns_vars);
                }
            }
            Arc::new(dict)
        }
    };

    // ------------------------------------------------------------------
    // Parallel phase: rule bodies into per-entry slots
    // ------------------------------------------------------------------

    let allow_big_strings = options.allow_big_strings;
    let slots: Vec<EntrySlot> = jobs
        .par_iter()
        .map(|job| {
            let mut slot = EntrySlot {
                compiled: Vec::with_capacity(job.rules.len()),
                embedded: Vec::new(),
                errors: Vec::new(),
            };
            for (rule_num, (rule, body)) in job.rules.iter().enumerate() {
                let line = bytecode::compile_line(body, &job.vars, &job.namespace, &dict);
                let prefix = format!("{}: Rule #{} ", job.location, rule_num + 1);
                slot.errors
                    .extend(line.errors.into_iter().map(|e| e.with_prefix(&prefix)));

                let mut compiled = line.bytecode;
                let over_cap = if allow_big_strings {
                    compiled.len() > u32::MAX as usize
                } else {
                    compiled.len() > usize::from(u16::MAX)
                };
                if over_cap {
                    slot.errors.push(Error::OverflowLimit(format!(
                        "{}: Rule #{} is too long",
                        job.location,
                        rule_num + 1
                    )));
                    compiled = Vec::new();
                }
                slot.compiled.push((*rule, compiled));

                for index in line.embedded {
                    if !slot.embedded.contains(&index) {
                        slot.embedded.push(index);
                    }
                }
            }
            if job.present && job.rules.is_empty() {
                slot.errors.push(Error::ParseSemantic(format!(
                    "{}: translation has no rules",
                    job.location
                )));
            }
            slot
        })
        .collect();

    // ------------------------------------------------------------------
    // Deterministic stitch
    // ------------------------------------------------------------------

    let mut strings_data = Vec::new();
    let mut rules: Vec<RuleEntry> = Vec::new();
    let mut translations: Vec<u32> = Vec::with_capacity(jobs.len() + 1);
    translations.push(0);
    for slot in &slots {
        report.errors.extend(slot.errors.iter().cloned());
        for (rule, compiled) in &slot.compiled {
            rules.push(RuleEntry {
                start_pos: strings_data.len() as u32,
                rule: *rule,
            });
            strings_data.extend_from_slice(compiled);
        }
        translations.push(rules.len() as u32);
    }
    rules.push(RuleEntry {
        start_pos: strings_data.len() as u32,
        rule: PluralRule::ALL,
    });

    // ------------------------------------------------------------------
    // Loop detection over embedded static references
    // ------------------------------------------------------------------

    let mut embedded_graph: BTreeMap<u32, Vec<TransIndex>> = BTreeMap::new();
    for (index, slot) in slots.iter().enumerate() {
        if !slot.embedded.is_empty() {
            embedded_graph.insert(index as u32, slot.embedded.clone());
        }
    }
    if let Some(error) = find_embedding_problem(&embedded_graph, &jobs) {
        report.errors.push(error);
        return Err(report);
    }

    // ------------------------------------------------------------------
    // Size caps
    // ------------------------------------------------------------------

    let mut rule_record_size = RULE16_SIZE;
    for pair in rules.windows(2) {
        if pair[1].start_pos - pair[0].start_pos > u32::from(u16::MAX) {
            rule_record_size = RULE32_SIZE;
            break;
        }
    }
    let settings_size = settings_blob_size(&settings);
    let header = CatalogHeader {
        rule_record_size,
        num_rules: (rules.len() - 1) as u32,
        num_translations: (translations.len() - 1) as u32,
        settings_size: settings_size.min(u64::from(u32::MAX)) as u32,
        data_size: strings_data.len().min(u32::MAX as usize) as u32,
        dict_hash: *dict.hash(),
    };
    if strings_data.len() > u32::MAX as usize || settings_size > u64::from(u32::MAX) {
        report
            .errors
            .push(Error::OverflowLimit("u32 overflow occurred".into()));
    } else if let Err(e) = header.check_soft_caps() {
        report.errors.push(e);
    } else if header.compiled_file_size() > u64::from(u32::MAX) {
        report.errors.push(Error::OverflowLimit(
            "final file size cannot be larger than 4GB".into(),
        ));
    }

    debug!(
        language = %settings.language_identifier,
        translations = translations.len() - 1,
        rules = rules.len() - 1,
        data_bytes = strings_data.len(),
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "compiled translation document"
    );

    if report.has_errors() {
        return Err(report);
    }
    Ok((
        LanguageCatalog::from_parts(strings_data, rules, translations, settings, dict),
        report.warnings,
    ))
}

fn settings_blob_size(settings: &CatalogSettings) -> u64 {
    [
        &settings.name,
        &settings.language_identifier,
        &settings.fallback_name,
        &settings.missing_plural_rule,
    ]
    .iter()
    .map(|s| 2 + s.len() as u64)
    .sum()
}

// ----------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------

fn read_settings(doc: &Document, report: &mut CompileReport) -> CatalogSettings {
    let mut settings = CatalogSettings::default();
    let settings_map = match doc.get(SETTINGS_KEY) {
        None => {
            report
                .errors
                .push(Error::ParseSemantic("could not find settings".into()));
            return settings;
        }
        Some(node) => match node.as_map() {
            None => {
                report
                    .errors
                    .push(Error::ParseSemantic("settings is an invalid type".into()));
                return settings;
            }
            Some(map) => map,
        },
    };

    let mut required = |name: &str| -> Option<String> {
        match settings_map.get(name) {
            None => {
                report
                    .errors
                    .push(Error::ParseSemantic(format!("Settings.{name} is missing")));
                None
            }
            Some(node) => match node.as_text() {
                None => {
                    report.errors.push(Error::ParseSemantic(format!(
                        "Settings.{name} is not a string"
                    )));
                    None
                }
                Some("") => {
                    report
                        .errors
                        .push(Error::ParseSemantic(format!("Settings.{name} is blank")));
                    None
                }
                Some(value) => Some(value.to_owned()),
            },
        }
    };

    let language_identifier = required("LanguageIdentifier");
    let language_name = required("LanguageName");
    let missing_plural_rule = required("MissingPluralRule");

    if let Some(identifier) = language_identifier {
        if is_valid_language_tag(&identifier) {
            settings.language_identifier = identifier;
        } else {
            report.errors.push(Error::ParseSemantic(
                "Settings.LanguageIdentifier is not valid".into(),
            ));
        }
    }
    if let Some(name) = language_name {
        settings.name = name;
    }
    if let Some(missing) = missing_plural_rule {
        settings.missing_plural_rule = missing;
    }
    // optional
    if let Some(fallback) = settings_map.get("FallbackLanguage").and_then(Node::as_text) {
        settings.fallback_name = fallback.to_owned();
    }
    settings
}

// ----------------------------------------------------------------------
// Per-entry property extraction
// ----------------------------------------------------------------------

fn extract_entry(
    props: &[(&str, &str)],
    location: &str,
    default_vars: Option<&[TranslationVar]>,
    report: &mut CompileReport,
) -> (Vec<(PluralRule, String)>, VarTable, Vec<TranslationVar>) {
    let mut rules: Vec<(PluralRule, String)> = Vec::with_capacity(1);
    let mut vars = VarTable::new();
    let mut declared: Vec<TranslationVar> = Vec::new();
    let mut too_many_rules = false;
    let mut too_many_vars = false;
    let mut num_vars = 0usize;

    for &(prop_name, prop_value) in props {
        match prop_name.chars().next() {
            // authoring comment
            Some('\\') => {}
            Some('^' | '=' | '<' | '>' | '~') => {
                let rule = match PluralRule::parse(prop_name) {
                    Ok(rule) => rule,
                    Err(e) => {
                        report
                            .errors
                            .push(e.with_prefix(&format!("{location}: \"{prop_name}\": ")));
                        continue;
                    }
                };
                if rules.len() >= 255 {
                    if !too_many_rules {
                        report.errors.push(Error::OverflowLimit(format!(
                            "{location}: cannot have more than 255 plural rules"
                        )));
                        too_many_rules = true;
                    }
                    continue;
                }
                rules.push((rule, prop_value.to_owned()));
            }
            _ => {
                num_vars += 1;
                if num_vars > 255 {
                    if !too_many_vars {
                        report.errors.push(Error::OverflowLimit(format!(
                            "{location}: cannot have more than 255 variables"
                        )));
                        too_many_vars = true;
                    }
                    continue;
                }
                if !VARIABLE_NAME.is_match(prop_name) {
                    report.errors.push(Error::ParseSemantic(format!(
                        "{location}: \"{prop_name}\" is not a valid variable name"
                    )));
                    continue;
                }
                if prop_name.len() > 255 {
                    report.errors.push(Error::OverflowLimit(format!(
                        "{location}: \"{prop_name}\" variable name cannot be longer than 255 bytes"
                    )));
                    continue;
                }
                if vars.contains(prop_name) {
                    report.errors.push(Error::ParseSemantic(format!(
                        "{location}: \"{prop_name}\" was declared more than once"
                    )));
                    continue;
                }
                let var_type = match VariableType::parse_name(prop_value) {
                    Some(VariableType::StaticTranslation) | None => {
                        report.errors.push(Error::ParseSemantic(format!(
                            "{location}: \"{prop_name}\" has an invalid variable type \"{prop_value}\""
                        )));
                        continue;
                    }
                    Some(ty) => ty,
                };

                let var_index = vars.declare(prop_name, var_type);
                match default_vars {
                    None => declared.push(TranslationVar {
                        name: prop_name.to_owned(),
                        var_type,
                    }),
                    Some(defaults) => {
                        // index 0 is the implicit PluralCount, so declared
                        // variable #N sits at defaults[N - 1]
                        let n = usize::from(var_index);
                        if n > defaults.len() {
                            report.warnings.push(format!(
                                "{location}: Variable #{n} does not exist in the default language"
                            ));
                        } else {
                            let expected = &defaults[n - 1];
                            if expected.name != prop_name || expected.var_type != var_type {
                                report.warnings.push(format!(
                                    "{location}: Variable #{n} does not match the default language"
                                ));
                            }
                        }
                    }
                }
            }
        }
    }

    if let Some(defaults) = default_vars {
        if num_vars != defaults.len() {
            report.warnings.push(format!(
                "{location}: number of variables ({num_vars}) does not match the default language ({})",
                defaults.len()
            ));
        }
    }
    (rules, vars, declared)
}

// ----------------------------------------------------------------------
// Embedded-reference loop detection
// ----------------------------------------------------------------------

/// Depth-first search over the embedded-reference graph. A node already
/// on the active path is a cycle; a path over [`MAX_EMBEDDED_DEPTH`]
/// nodes is a depth violation. Nodes are visited in index order so
/// reports are deterministic.
fn find_embedding_problem(
    graph: &BTreeMap<u32, Vec<TransIndex>>,
    jobs: &[EntryJob],
) -> Option<Error> {
    fn visit(
        graph: &BTreeMap<u32, Vec<TransIndex>>,
        current: u32,
        path: &mut Vec<u32>,
    ) -> Option<Vec<u32>> {
        let already_on_path = path.contains(&current);
        path.push(current);
        if path.len() > MAX_EMBEDDED_DEPTH || already_on_path {
            return Some(path.clone());
        }
        if let Some(targets) = graph.get(&current) {
            for target in targets {
                if graph.contains_key(&target.as_u32()) || path.contains(&target.as_u32()) {
                    if let Some(found) = visit(graph, target.as_u32(), path) {
                        return Some(found);
                    }
                }
            }
        }
        path.pop();
        None
    }

    for &start in graph.keys() {
        let mut path = Vec::new();
        if let Some(found) = visit(graph, start, &mut path) {
            let names: Vec<&str> = found
                .iter()
                .map(|&i| jobs.get(i as usize).map_or("?", |j| j.location.as_str()))
                .collect();
            let path = names.join(" -> ");
            return Some(if found.len() > MAX_EMBEDDED_DEPTH {
                Error::EmbeddingDepth { path }
            } else {
                Error::EmbeddingCycle { path }
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_json(json: &str) -> Result<(LanguageCatalog, Vec<String>), CompileReport> {
        let doc = Document::from_json_str(json).unwrap();
        compile(&doc, None, &CompileOptions::default())
    }

    const SETTINGS: &str =
        r#""Settings":{"LanguageName":"English","LanguageIdentifier":"en","MissingPluralRule":"??"}"#;

    #[test]
    fn scalar_entry_is_a_single_match_all_rule() {
        let (catalog, warnings) =
            compile_json(&format!(r#"{{{SETTINGS},"NS":{{"Hi":"Hello"}}}}"#)).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(catalog.num_translations(), 1);
        assert_eq!(catalog.name(), "English");
        assert_eq!(catalog.language_identifier(), "en");
        assert_eq!(catalog.missing_plural_rule(), "??");
    }

    #[test]
    fn missing_settings_fields_accumulate() {
        let report = compile_json(r#"{"Settings":{"LanguageName":""},"NS":{"Hi":"x"}}"#)
            .unwrap_err();
        // blank name, missing identifier, missing missing-plural-rule
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn entry_must_have_rules() {
        let report = compile_json(&format!(
            r#"{{{SETTINGS},"NS":{{"Hi":{{"x":"String"}}}}}}"#
        ))
        .unwrap_err();
        assert!(report
            .errors
            .iter()
            .any(|e| e.to_string().contains("has no rules")));
    }

    #[test]
    fn comment_properties_are_ignored() {
        let (catalog, _) = compile_json(&format!(
            r#"{{{SETTINGS},"NS":{{"Hi":{{"\\note":"ignored","^":"Hello"}}}}}}"#
        ))
        .unwrap();
        assert_eq!(catalog.get(TransIndex(0), &[]).unwrap(), "Hello");
    }

    #[test]
    fn invalid_variable_type_is_an_error() {
        let report = compile_json(&format!(
            r#"{{{SETTINGS},"NS":{{"Hi":{{"x":"NotAType","^":"a"}}}}}}"#
        ))
        .unwrap_err();
        assert!(matches!(report.errors.as_slice(), [Error::ParseSemantic(_)]));

        let report = compile_json(&format!(
            r#"{{{SETTINGS},"NS":{{"Hi":{{"x":"StaticTranslation","^":"a"}}}}}}"#
        ))
        .unwrap_err();
        assert!(matches!(report.errors.as_slice(), [Error::ParseSemantic(_)]));
    }

    #[test]
    fn duplicate_variable_is_an_error() {
        // document keys dedup in JSON, so exercise extract_entry directly
        let mut report = CompileReport::default();
        let props = [("x", "String"), ("x", "Integer"), ("^", "body")];
        let (rules, _, _) = extract_entry(&props, "NS.Hi", None, &mut report);
        assert_eq!(rules.len(), 1);
        assert!(matches!(report.errors.as_slice(), [Error::ParseSemantic(_)]));
    }

    #[test]
    fn plural_count_cannot_be_redeclared() {
        let mut report = CompileReport::default();
        let props = [("PluralCount", "Integer"), ("^", "body")];
        extract_entry(&props, "NS.Hi", None, &mut report);
        assert!(matches!(report.errors.as_slice(), [Error::ParseSemantic(_)]));
    }

    #[test]
    fn rule_overflow_reports_once() {
        let mut report = CompileReport::default();
        let owned: Vec<(String, String)> = (0..=256)
            .map(|i| (format!("={}", i % 250), "body".to_owned()))
            .collect();
        let props: Vec<(&str, &str)> = owned
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let (rules, _, _) = extract_entry(&props, "NS.Hi", None, &mut report);
        assert_eq!(rules.len(), 255);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], Error::OverflowLimit(_)));
    }

    #[test]
    fn non_default_language_warns_on_variable_mismatches() {
        let defaults = [
            TranslationVar {
                name: "x".into(),
                var_type: VariableType::String,
            },
        ];
        let mut report = CompileReport::default();
        let props = [("x", "Integer"), ("y", "String"), ("^", "body")];
        extract_entry(&props, "NS.Hi", Some(&defaults), &mut report);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 3); // mismatch, nonexistent, count
        assert!(report.warnings[0].contains("Variable #1 does not match"));
        assert!(report.warnings[1]
            .contains("Variable #2 does not exist in the default language"));
        assert!(report.warnings[2].contains("number of variables (2)"));
    }

    #[test]
    fn cycle_detection_reports_the_path() {
        let report = compile_json(&format!(
            r#"{{{SETTINGS},"NS":{{"A":"{{{{*B}}}}","B":"{{{{*A}}}}"}}}}"#
        ))
        .unwrap_err();
        match report.errors.as_slice() {
            [Error::EmbeddingCycle { path }] => assert_eq!(path, "NS.A -> NS.B -> NS.A"),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_embedding_is_a_cycle() {
        let report = compile_json(&format!(
            r#"{{{SETTINGS},"NS":{{"A":"{{{{*A}}}}"}}}}"#
        ))
        .unwrap_err();
        match report.errors.as_slice() {
            [Error::EmbeddingCycle { path }] => assert_eq!(path, "NS.A -> NS.A"),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    /// A namespace of entries `E0 -> E1 -> … -> E<links>` where every
    /// entry but the last embeds the next. `links` entries carry an
    /// embedded reference; the final entry is the literal `"end"`.
    fn chain_namespace(links: usize) -> String {
        let mut namespace = String::new();
        for i in 0..=links {
            if i > 0 {
                namespace.push(',');
            }
            if i < links {
                namespace.push_str(&format!(r#""E{i}":"{{{{*E{}}}}}""#, i + 1));
            } else {
                namespace.push_str(&format!(r#""E{i}":"end""#));
            }
        }
        namespace
    }

    #[test]
    fn deep_chains_hit_the_depth_limit() {
        // 101 embedding entries → a traversal path of 101 nodes
        let namespace = chain_namespace(MAX_EMBEDDED_DEPTH + 1);
        let report = compile_json(&format!(r#"{{{SETTINGS},"NS":{{{namespace}}}}}"#))
            .unwrap_err();
        assert!(matches!(
            report.errors.as_slice(),
            [Error::EmbeddingDepth { .. }]
        ));
    }

    #[test]
    fn chain_of_100_embeddings_is_accepted() {
        let namespace = chain_namespace(MAX_EMBEDDED_DEPTH);
        let (catalog, _) =
            compile_json(&format!(r#"{{{SETTINGS},"NS":{{{namespace}}}}}"#)).unwrap();
        assert_eq!(catalog.get(TransIndex(0), &[]).unwrap(), "end");
    }

    #[test]
    fn extra_and_missing_shapes_warn_for_non_default() {
        let default_doc = Document::from_json_str(&format!(
            r#"{{{SETTINGS},"NS":{{"A":"a","B":"b"}}}}"#
        ))
        .unwrap();
        let (default, _) = compile(&default_doc, None, &CompileOptions::default()).unwrap();
        let dict = Arc::clone(default.dictionary());

        let second_doc = Document::from_json_str(
            r#"{"Settings":{"LanguageName":"Deutsch","LanguageIdentifier":"de","MissingPluralRule":"?"},
                "NS":{"A":"a2","Extra":"x"},"Surplus":{"Q":"q"}}"#,
        )
        .unwrap();
        let (_, warnings) = compile(&second_doc, Some(dict), &CompileOptions::default()).unwrap();
        assert!(warnings.iter().any(|w| w.contains("NS.B: translation is missing")));
        assert!(warnings.iter().any(|w| w.contains("NS.Extra: extra translation")));
        assert!(warnings.iter().any(|w| w.contains("Surplus: extra namespace")));
    }

    #[test]
    fn compilation_is_deterministic_across_pool_sizes() {
        let json = format!(
            r#"{{{SETTINGS},"NS":{{"A":"{{{{*B}}}} one","B":"two","C":{{"=0":"none","^":"some"}}}},"M":{{"D":"{{{{*NS.A}}}}"}}}}"#
        );
        let baseline = compile_json(&json).unwrap().0;
        for threads in [1, 4] {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap();
            let (catalog, _) = pool.install(|| compile_json(&json)).unwrap();
            assert_eq!(catalog.strings_data(), baseline.strings_data());
            assert_eq!(catalog.rules(), baseline.rules());
            assert_eq!(catalog.translations(), baseline.translations());
        }
    }
}
