//! Serialization of dictionaries, variable dictionaries, and catalogs.

use std::io::{self, Write};

use sha1::{Digest, Sha1};

use super::{
    CatalogHeader, DictHeader, CATALOG_MAGIC, DICT_MAGIC, RULE16_SIZE, RULE32_SIZE, VARS_MAGIC,
};
use crate::catalog::LanguageCatalog;
use crate::dictionary::Dictionary;
use crate::error::Error;

/// Byte-counting writer with an optional running SHA-1.
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
    hasher: Option<Sha1>,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W, hashed: bool) -> Self {
        Self {
            inner,
            written: 0,
            hasher: hashed.then(Sha1::new),
        }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.inner.write_all(bytes).map_err(|e| {
            Error::io(self.written, format!("could not write {} bytes: {e}", bytes.len()))
        })?;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(bytes);
        }
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn put_u16(&mut self, value: u16) -> Result<(), Error> {
        self.put(&value.to_le_bytes())
    }

    fn put_u32(&mut self, value: u32) -> Result<(), Error> {
        self.put(&value.to_le_bytes())
    }

    fn finish_hash(self) -> [u8; 20] {
        self.hasher.map_or([0; 20], |h| h.finalize().into())
    }
}

/// Write the primary dictionary form and return the SHA-1 identity hash
/// of the written stream.
///
/// # Errors
///
/// `OverflowLimit` on soft-cap violations, `Io` on write failures or a
/// final size disagreement.
pub fn write_dictionary<W: Write>(dict: &Dictionary, writer: W) -> Result<[u8; 20], Error> {
    let num_translations = dict.num_translations();
    let mut ids_size = 0u64;
    let mut namespaces_size = 0u64;
    for ns in dict.namespaces() {
        namespaces_size += ns.name().len() as u64;
        for id in ns.entry_names() {
            ids_size += id.len() as u64;
        }
    }
    if ids_size > u64::from(u32::MAX) || namespaces_size > u64::from(u32::MAX) {
        return Err(Error::OverflowLimit("u32 overflow occurred".into()));
    }

    let header = DictHeader {
        num_translations,
        num_namespaces: dict.num_namespaces() as u32,
        ids_size: ids_size as u32,
        namespaces_size: namespaces_size as u32,
    };
    header.check_soft_caps()?;
    let expected_size = header.compiled_file_size();
    if expected_size > u64::from(u32::MAX) {
        return Err(Error::OverflowLimit(
            "filesize cannot be greater than 4GB".into(),
        ));
    }

    let mut w = CountingWriter::new(writer, true);
    w.put(&DICT_MAGIC)?;
    w.put(&[0u8])?;
    w.put_u32(header.num_translations)?;
    w.put_u32(header.num_namespaces)?;
    w.put_u32(header.ids_size)?;
    w.put_u32(header.namespaces_size)?;

    for ns in dict.namespaces() {
        for id in ns.entry_names() {
            w.put_u16(id.len() as u16)?;
        }
    }
    for ns in dict.namespaces() {
        for id in ns.entry_names() {
            w.put(id.as_bytes())?;
        }
    }
    for ns in dict.namespaces() {
        // low 24 bits entry count, high 8 bits name length
        let record = (ns.len() as u32 & 0x00FF_FFFF) | ((ns.name().len() as u32) << 24);
        w.put_u32(record)?;
    }
    for ns in dict.namespaces() {
        w.put(ns.name().as_bytes())?;
    }

    if w.written != expected_size {
        return Err(Error::io(
            w.written,
            format!(
                "output file size ({}) did not match what it should ({expected_size})",
                w.written
            ),
        ));
    }
    Ok(w.finish_hash())
}

/// The dictionary's identity hash: the SHA-1 of its serialized form.
pub(crate) fn dictionary_hash(dict: &Dictionary) -> Result<[u8; 20], Error> {
    write_dictionary(dict, io::sink())
}

/// Write the companion variable dictionary. Only the 3 magic bytes head
/// the stream; the body iterates entries in dictionary order.
///
/// # Errors
///
/// `Registry` when the dictionary has no variable information loaded.
pub fn write_dictionary_vars<W: Write>(dict: &Dictionary, writer: W) -> Result<(), Error> {
    if !dict.vars_loaded() {
        return Err(Error::Registry(
            "can only write a variable dictionary when the dictionary has variables loaded".into(),
        ));
    }

    let mut w = CountingWriter::new(writer, false);
    w.put(&VARS_MAGIC)?;
    for ns in dict.namespaces() {
        for local in 0..ns.len() {
            let vars = ns.vars_at(local).unwrap_or(&[]);
            w.put(&[vars.len() as u8])?;
            for var in vars {
                w.put(&[var.name.len() as u8, var.var_type as u8])?;
                w.put(var.name.as_bytes())?;
            }
        }
    }
    Ok(())
}

/// Write a compiled catalog. `Rule32` records are selected only when
/// some bytecode exceeds 65535 bytes.
///
/// # Errors
///
/// `OverflowLimit` on soft-cap violations, `Io` on write failures or a
/// final size disagreement.
pub fn write_catalog<W: Write>(catalog: &LanguageCatalog, writer: W) -> Result<(), Error> {
    let rules = catalog.rules();
    let translations = catalog.translations();
    let strings_data = catalog.strings_data();

    let mut rule_record_size = RULE16_SIZE;
    for pair in rules.windows(2) {
        if pair[1].start_pos - pair[0].start_pos > u32::from(u16::MAX) {
            rule_record_size = RULE32_SIZE;
            break;
        }
    }

    let settings = catalog.settings();
    let mut settings_blob = Vec::new();
    for value in [
        &settings.name,
        &settings.language_identifier,
        &settings.fallback_name,
        &settings.missing_plural_rule,
    ] {
        if value.len() > usize::from(u16::MAX) {
            return Err(Error::OverflowLimit(
                "settings string cannot be longer than 64KB".into(),
            ));
        }
        settings_blob.extend_from_slice(&(value.len() as u16).to_le_bytes());
        settings_blob.extend_from_slice(value.as_bytes());
    }

    let header = CatalogHeader {
        rule_record_size,
        num_rules: (rules.len() - 1) as u32,
        num_translations: catalog.num_translations(),
        settings_size: settings_blob.len() as u32,
        data_size: strings_data.len() as u32,
        dict_hash: *catalog.dictionary().hash(),
    };
    header.check_soft_caps()?;
    let expected_size = header.compiled_file_size();
    if expected_size > u64::from(u32::MAX) {
        return Err(Error::OverflowLimit(
            "filesize cannot be greater than 4GB".into(),
        ));
    }

    let mut w = CountingWriter::new(writer, false);
    w.put(&CATALOG_MAGIC)?;
    w.put(&[header.rule_record_size])?;
    w.put_u32(header.num_rules)?;
    w.put_u32(header.num_translations)?;
    w.put_u32(header.settings_size)?;
    w.put_u32(header.data_size)?;
    w.put(&header.dict_hash)?;
    w.put(&settings_blob)?;

    for pair in rules.windows(2) {
        let len = pair[1].start_pos - pair[0].start_pos;
        let rule = pair[0].rule.to_bytes();
        if rule_record_size == RULE16_SIZE {
            w.put_u16(len as u16)?;
            w.put(&rule)?;
        } else {
            w.put_u32(len)?;
            w.put(&rule)?;
            w.put(&[0u8, 0u8])?;
        }
    }

    for pair in translations.windows(2) {
        let count = pair[1] - pair[0];
        if count > 255 {
            return Err(Error::OverflowLimit(
                "cannot have more than 255 plural rules".into(),
            ));
        }
        w.put(&[count as u8])?;
    }

    w.put(strings_data)?;

    if w.written != expected_size {
        return Err(Error::io(
            w.written,
            format!(
                "output file size ({}) did not match what it should ({expected_size})",
                w.written
            ),
        ));
    }
    Ok(())
}
