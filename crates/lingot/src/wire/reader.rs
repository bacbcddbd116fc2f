//! Deserialization of dictionaries, variable dictionaries, and catalogs.
//!
//! Every read is validated against the header's declared sizes; the
//! first inconsistency is returned with the byte offset at which it was
//! detected, and the stream must end exactly at the computed file size.

use std::io::{self, Read};
use std::sync::Arc;

use indexmap::IndexMap;
use sha1::{Digest, Sha1};

use super::{
    CatalogHeader, DictHeader, CATALOG_MAGIC, DICT_MAGIC, RULE16_SIZE, RULE32_SIZE, VARS_MAGIC,
};
use crate::catalog::{is_valid_language_tag, CatalogSettings, LanguageCatalog, RuleEntry};
use crate::dictionary::{Dictionary, Namespace};
use crate::error::Error;
use crate::plural::PluralRule;
use crate::types::{TransIndex, TranslationVar, VariableType};

/// Byte-counting reader with an optional running SHA-1.
struct CountingReader<R: Read> {
    inner: R,
    read: u64,
    prev: u64,
    hasher: Option<Sha1>,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R, hashed: bool) -> Self {
        Self {
            inner,
            read: 0,
            prev: 0,
            hasher: hashed.then(Sha1::new),
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.prev = self.read;
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::io(self.prev, "file ended early")
            } else {
                Error::io(self.prev, e.to_string())
            }
        })?;
        self.read += buf.len() as u64;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&buf[..]);
        }
        Ok(())
    }

    fn bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// The file must stop exactly at the computed size.
    fn expect_end(&mut self, expected: u64) -> Result<(), Error> {
        if self.read != expected {
            return Err(Error::io(
                self.read,
                format!("end of file not reached ({} != {expected})", self.read),
            ));
        }
        let mut probe = [0u8; 1];
        match self.inner.read(&mut probe) {
            Ok(0) => Ok(()),
            Ok(_) => Err(Error::io(self.read, "trailing bytes after end of file")),
            Err(e) => Err(Error::io(self.read, e.to_string())),
        }
    }

    fn finish_hash(self) -> [u8; 20] {
        self.hasher.map_or([0; 20], |h| h.finalize().into())
    }
}

/// Accumulate per-element lengths, rejecting any prefix that overruns
/// the declared total and requiring the final sum to land exactly on it.
struct LengthAccumulator {
    accum: u64,
    expected: u64,
    what: &'static str,
    base_offset: u64,
    record_size: u64,
}

impl LengthAccumulator {
    fn new(expected: u64, what: &'static str, base_offset: u64, record_size: u64) -> Self {
        Self {
            accum: 0,
            expected,
            what,
            base_offset,
            record_size,
        }
    }

    fn add(&mut self, index: u64, len: u64) -> Result<u64, Error> {
        let start = self.accum;
        self.accum += len;
        if self.accum > self.expected {
            return Err(Error::io(
                self.base_offset + index * self.record_size,
                format!(
                    "length of accumulated [{}] data read ({}) at index ({index}) has exceeded given data length ({})",
                    self.what, self.accum, self.expected
                ),
            ));
        }
        Ok(start)
    }

    fn finish(&self, end_offset: u64) -> Result<(), Error> {
        if self.accum != self.expected {
            return Err(Error::io(
                end_offset,
                format!(
                    "length of accumulated [{}] data read ({}) did not reach the end ({})",
                    self.what, self.accum, self.expected
                ),
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Dictionary (`DTR`)
// ----------------------------------------------------------------------

/// Read a dictionary file; the identity hash is computed over the bytes
/// as they stream through.
pub fn read_dictionary<R: Read>(reader: R) -> Result<Dictionary, Error> {
    let mut r = CountingReader::new(reader, true);

    let mut magic = [0u8; 4];
    r.fill(&mut magic)?;
    if magic[0..3] != DICT_MAGIC {
        return Err(Error::io(0, "invalid file header"));
    }
    let header = DictHeader {
        num_translations: r.u32()?,
        num_namespaces: r.u32()?,
        ids_size: r.u32()?,
        namespaces_size: r.u32()?,
    };
    header.check_soft_caps()?;

    // entry-name sizes, then the concatenated names
    let sizes_base = r.read;
    let mut id_sizes = Vec::with_capacity(header.num_translations as usize);
    {
        let raw = r.bytes(header.num_translations as usize * 2)?;
        for pair in raw.chunks_exact(2) {
            id_sizes.push(u16::from_le_bytes([pair[0], pair[1]]));
        }
    }
    let ids_blob = r.bytes(header.ids_size as usize)?;
    let mut ids = Vec::with_capacity(id_sizes.len());
    let mut id_lengths = LengthAccumulator::new(
        u64::from(header.ids_size),
        "translation IDs",
        sizes_base,
        2,
    );
    for (i, &len) in id_sizes.iter().enumerate() {
        let start = id_lengths.add(i as u64, u64::from(len))? as usize;
        let name = std::str::from_utf8(&ids_blob[start..start + usize::from(len)])
            .map_err(|_| Error::io(sizes_base, "translation ID is not valid UTF-8"))?;
        ids.push(name.to_owned());
    }
    id_lengths.finish(r.read)?;

    // namespace records, then the concatenated names
    let ns_base = r.read;
    let mut ns_records = Vec::with_capacity(header.num_namespaces as usize);
    for _ in 0..header.num_namespaces {
        let record = r.u32()?;
        ns_records.push((record & 0x00FF_FFFF, (record >> 24) as u8));
    }
    let ns_blob = r.bytes(header.namespaces_size as usize)?;

    let mut namespaces: IndexMap<String, Namespace> = IndexMap::new();
    let mut entry_counts = LengthAccumulator::new(
        u64::from(header.num_translations),
        "translation ID offsets",
        ns_base,
        4,
    );
    let mut name_lengths = LengthAccumulator::new(
        u64::from(header.namespaces_size),
        "namespace names",
        ns_base,
        4,
    );
    for (i, &(entry_count, name_len)) in ns_records.iter().enumerate() {
        let id_start = entry_counts.add(i as u64, u64::from(entry_count))? as usize;
        let name_start = name_lengths.add(i as u64, u64::from(name_len))? as usize;
        let name = std::str::from_utf8(&ns_blob[name_start..name_start + usize::from(name_len)])
            .map_err(|_| Error::io(ns_base, "namespace name is not valid UTF-8"))?;
        if namespaces.contains_key(name) {
            return Err(Error::io(
                ns_base + i as u64 * 4,
                format!("namespace \"{name}\" appears more than once"),
            ));
        }
        let mut namespace = Namespace::new(name.to_owned(), entry_count as usize);
        for (local, id) in ids[id_start..id_start + entry_count as usize].iter().enumerate() {
            namespace.insert(id.clone(), TransIndex((id_start + local) as u32));
        }
        namespaces.insert(name.to_owned(), namespace);
    }
    entry_counts.finish(r.read)?;
    name_lengths.finish(r.read)?;

    r.expect_end(header.compiled_file_size())?;
    let hash = r.finish_hash();
    Ok(Dictionary::from_parts(namespaces, hash, false))
}

// ----------------------------------------------------------------------
// Variable dictionary (`VTR`)
// ----------------------------------------------------------------------

/// Read a companion variable dictionary into a loaded dictionary.
/// Additive: fills the per-entry variable lists and flips
/// `vars_loaded`.
pub fn read_dictionary_vars<R: Read>(reader: R, dict: &mut Dictionary) -> Result<(), Error> {
    let mut r = CountingReader::new(reader, false);

    let mut magic = [0u8; 3];
    r.fill(&mut magic)?;
    if magic != VARS_MAGIC {
        return Err(Error::io(0, "invalid file header"));
    }

    for ns_index in 0..dict.num_namespaces() {
        let entry_count = dict.namespace_at_mut(ns_index).map_or(0, |ns| ns.len());
        let mut all_vars = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let mut count = [0u8; 1];
            r.fill(&mut count)?;
            let mut vars = Vec::with_capacity(usize::from(count[0]));
            for _ in 0..count[0] {
                let mut head = [0u8; 2];
                r.fill(&mut head)?;
                let name_bytes = r.bytes(usize::from(head[0]))?;
                let name = String::from_utf8(name_bytes)
                    .map_err(|_| Error::io(r.prev, "variable name is not valid UTF-8"))?;
                vars.push(TranslationVar {
                    name,
                    var_type: VariableType::from_low_bits(head[1]),
                });
            }
            all_vars.push(vars);
        }
        if let Some(ns) = dict.namespace_at_mut(ns_index) {
            ns.set_vars(all_vars);
        }
    }

    dict.set_vars_loaded(true);
    Ok(())
}

// ----------------------------------------------------------------------
// Catalog (`GTR`)
// ----------------------------------------------------------------------

/// Read a compiled catalog against its dictionary. The stored hash must
/// match the dictionary byte for byte.
pub fn read_catalog<R: Read>(
    reader: R,
    dict: &Arc<Dictionary>,
) -> Result<LanguageCatalog, Error> {
    let mut r = CountingReader::new(reader, false);

    let mut magic = [0u8; 3];
    r.fill(&mut magic)?;
    if magic != CATALOG_MAGIC {
        return Err(Error::io(0, "invalid file header"));
    }
    let mut record_size = [0u8; 1];
    r.fill(&mut record_size)?;
    let rule_record_size = record_size[0];
    if rule_record_size != RULE16_SIZE && rule_record_size != RULE32_SIZE {
        return Err(Error::io(
            3,
            format!(
                "invalid translation record size ({rule_record_size} != ({RULE16_SIZE} || {RULE32_SIZE}))"
            ),
        ));
    }
    let header = CatalogHeader {
        rule_record_size,
        num_rules: r.u32()?,
        num_translations: r.u32()?,
        settings_size: r.u32()?,
        data_size: r.u32()?,
        dict_hash: {
            let mut hash = [0u8; 20];
            r.fill(&mut hash)?;
            hash
        },
    };
    header.check_soft_caps()?;
    if &header.dict_hash != dict.hash() {
        return Err(Error::DictionaryMismatch);
    }
    if header.num_translations != dict.num_translations() {
        return Err(Error::io(
            8,
            format!(
                "number of translations ({}) does not match number in dictionary ({})",
                header.num_translations,
                dict.num_translations()
            ),
        ));
    }

    // settings: four length-prefixed strings
    let settings_base = r.read;
    let blob = r.bytes(header.settings_size as usize)?;
    let mut fields = Vec::with_capacity(4);
    let mut pos = 0usize;
    for _ in 0..4 {
        let Some(raw_len) = blob.get(pos..pos + 2) else {
            return Err(Error::io(
                settings_base + pos as u64,
                "invalid settings length",
            ));
        };
        let len = usize::from(u16::from_le_bytes([raw_len[0], raw_len[1]]));
        pos += 2;
        let Some(raw) = blob.get(pos..pos + len) else {
            return Err(Error::io(
                settings_base + pos as u64,
                "invalid string length",
            ));
        };
        let value = String::from_utf8(raw.to_vec())
            .map_err(|_| Error::io(settings_base + pos as u64, "setting is not valid UTF-8"))?;
        pos += len;
        fields.push(value);
    }
    if pos != blob.len() {
        return Err(Error::io(
            settings_base + pos as u64,
            format!("settings length not completely consumed ({pos} != {})", blob.len()),
        ));
    }
    if !is_valid_language_tag(&fields[1]) {
        return Err(Error::io(
            settings_base,
            format!("invalid language tag: {}", fields[1]),
        ));
    }
    let mut fields = fields.into_iter();
    let settings = CatalogSettings {
        name: fields.next().unwrap_or_default(),
        language_identifier: fields.next().unwrap_or_default(),
        fallback_name: fields.next().unwrap_or_default(),
        missing_plural_rule: fields.next().unwrap_or_default(),
    };

    // rule records → start positions by prefix sum, plus the sentinel
    let rules_base = r.read;
    let mut rules = Vec::with_capacity(header.num_rules as usize + 1);
    let mut rule_lengths = LengthAccumulator::new(
        u64::from(header.data_size),
        "rules",
        rules_base,
        u64::from(rule_record_size),
    );
    {
        let raw = r.bytes(header.num_rules as usize * usize::from(rule_record_size))?;
        for (i, record) in raw.chunks_exact(usize::from(rule_record_size)).enumerate() {
            let (len, rule) = if rule_record_size == RULE16_SIZE {
                (
                    u32::from(u16::from_le_bytes([record[0], record[1]])),
                    PluralRule::from_bytes([record[2], record[3]]),
                )
            } else {
                (
                    u32::from_le_bytes([record[0], record[1], record[2], record[3]]),
                    PluralRule::from_bytes([record[4], record[5]]),
                )
            };
            let start = rule_lengths.add(i as u64, u64::from(len))?;
            rules.push(RuleEntry {
                start_pos: start as u32,
                rule,
            });
        }
    }
    rule_lengths.finish(r.read)?;
    rules.push(RuleEntry {
        start_pos: header.data_size,
        rule: PluralRule::ALL,
    });

    // rule-slice counts → start indices by prefix sum, plus the sentinel
    let slices_base = r.read;
    let mut translations = Vec::with_capacity(header.num_translations as usize + 1);
    let mut slice_lengths = LengthAccumulator::new(
        u64::from(header.num_rules),
        "rule slices",
        slices_base,
        1,
    );
    {
        let raw = r.bytes(header.num_translations as usize)?;
        for (i, &count) in raw.iter().enumerate() {
            let start = slice_lengths.add(i as u64, u64::from(count))?;
            translations.push(start as u32);
        }
    }
    slice_lengths.finish(r.read)?;
    translations.push(header.num_rules);

    let mut strings_data = vec![0u8; header.data_size as usize];
    r.fill(&mut strings_data)?;

    r.expect_end(header.compiled_file_size())?;

    Ok(LanguageCatalog::from_parts(
        strings_data,
        rules,
        translations,
        settings,
        Arc::clone(dict),
    ))
}
