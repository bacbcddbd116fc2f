//! The binary on-disk formats: dictionary (`DTR`), variable dictionary
//! (`VTR`), and per-language catalog (`GTR`).
//!
//! All integers are little-endian and every structure is assembled and
//! disassembled through explicit byte codecs — no in-memory
//! reinterpretation, so the format is identical on every platform.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Bad magic | `Io` with offset 0 |
//! | Section length disagreement | `Io` with the element's offset |
//! | Missing or trailing bytes | `Io` at the detection offset |
//! | Soft cap exceeded | `OverflowLimit` |
//! | Catalog hash ≠ dictionary hash | `DictionaryMismatch` |

pub(crate) mod reader;
pub(crate) mod writer;

pub use reader::{read_catalog, read_dictionary, read_dictionary_vars};
pub use writer::{write_catalog, write_dictionary, write_dictionary_vars};

use crate::error::Error;

pub const DICT_MAGIC: [u8; 3] = *b"DTR";
pub const VARS_MAGIC: [u8; 3] = *b"VTR";
pub const CATALOG_MAGIC: [u8; 3] = *b"GTR";

/// `DTR` header: 3 magic bytes, one reserved zero byte, four u32 fields.
pub(crate) const DICT_HEADER_SIZE: u64 = 20;
/// `GTR` header: magic, rule record size, four u32 fields, 20-byte hash.
pub(crate) const CATALOG_HEADER_SIZE: u64 = 40;

/// Rule record with a u16 byte length.
pub(crate) const RULE16_SIZE: u8 = 4;
/// Rule record with a u32 byte length and two bytes of padding.
pub(crate) const RULE32_SIZE: u8 = 8;

pub(crate) const ID_SIZE_RECORD: u64 = 2;
pub(crate) const NAMESPACE_RECORD: u64 = 4;
pub(crate) const RULE_SLICE_RECORD: u64 = 1;

// Soft caps; a reader rejects files exceeding any of these.
pub(crate) const SOFT_LIMIT_NUM_NAMESPACES: u32 = 1_000;
pub(crate) const SOFT_LIMIT_IDS_SIZE: u32 = 32 * 1024 * 1024;
pub(crate) const SOFT_LIMIT_NAMESPACES_SIZE: u32 = 1024 * 1024;
pub(crate) const SOFT_LIMIT_NUM_RULES: u32 = 1_000_000;
pub(crate) const SOFT_LIMIT_NUM_TRANSLATIONS: u32 = 1_000_000;
pub(crate) const SOFT_LIMIT_SETTINGS_SIZE: u32 = 1024 * 1024;
/// 3.5 GiB.
pub(crate) const SOFT_LIMIT_DATA_SIZE: u32 = 3_758_096_384;

// The soft caps must keep any accepted file under the 4 GiB hard limit.
const _: () = {
    let catalog_max = CATALOG_HEADER_SIZE
        + SOFT_LIMIT_NUM_RULES as u64 * RULE32_SIZE as u64
        + SOFT_LIMIT_NUM_TRANSLATIONS as u64 * RULE_SLICE_RECORD
        + SOFT_LIMIT_SETTINGS_SIZE as u64
        + SOFT_LIMIT_DATA_SIZE as u64;
    assert!(catalog_max <= u32::MAX as u64);

    let dict_max = DICT_HEADER_SIZE
        + SOFT_LIMIT_NUM_TRANSLATIONS as u64 * ID_SIZE_RECORD
        + SOFT_LIMIT_NUM_NAMESPACES as u64 * NAMESPACE_RECORD
        + SOFT_LIMIT_IDS_SIZE as u64
        + SOFT_LIMIT_NAMESPACES_SIZE as u64;
    assert!(dict_max <= u32::MAX as u64);
};

fn check_cap(value: u32, cap: u32, what: &str) -> Result<(), Error> {
    if value > cap {
        return Err(Error::OverflowLimit(format!(
            "{what} cannot be larger than {cap}"
        )));
    }
    Ok(())
}

/// Parsed `DTR` header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DictHeader {
    pub num_translations: u32,
    pub num_namespaces: u32,
    pub ids_size: u32,
    pub namespaces_size: u32,
}

impl DictHeader {
    pub(crate) fn compiled_file_size(&self) -> u64 {
        DICT_HEADER_SIZE
            + u64::from(self.num_translations) * ID_SIZE_RECORD
            + u64::from(self.num_namespaces) * NAMESPACE_RECORD
            + u64::from(self.ids_size)
            + u64::from(self.namespaces_size)
    }

    pub(crate) fn check_soft_caps(&self) -> Result<(), Error> {
        check_cap(
            self.num_translations,
            SOFT_LIMIT_NUM_TRANSLATIONS,
            "num translations",
        )?;
        check_cap(
            self.num_namespaces,
            SOFT_LIMIT_NUM_NAMESPACES,
            "num namespaces",
        )?;
        check_cap(self.ids_size, SOFT_LIMIT_IDS_SIZE, "IDs size")?;
        check_cap(
            self.namespaces_size,
            SOFT_LIMIT_NAMESPACES_SIZE,
            "namespaces size",
        )
    }
}

/// Parsed `GTR` header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CatalogHeader {
    pub rule_record_size: u8,
    pub num_rules: u32,
    pub num_translations: u32,
    pub settings_size: u32,
    pub data_size: u32,
    pub dict_hash: [u8; 20],
}

impl CatalogHeader {
    pub(crate) fn compiled_file_size(&self) -> u64 {
        CATALOG_HEADER_SIZE
            + u64::from(self.num_rules) * u64::from(self.rule_record_size)
            + u64::from(self.num_translations) * RULE_SLICE_RECORD
            + u64::from(self.settings_size)
            + u64::from(self.data_size)
    }

    pub(crate) fn check_soft_caps(&self) -> Result<(), Error> {
        check_cap(self.num_rules, SOFT_LIMIT_NUM_RULES, "num translation rules")?;
        check_cap(
            self.num_translations,
            SOFT_LIMIT_NUM_TRANSLATIONS,
            "num translations",
        )?;
        check_cap(self.settings_size, SOFT_LIMIT_SETTINGS_SIZE, "settings size")?;
        check_cap(self.data_size, SOFT_LIMIT_DATA_SIZE, "data size")
    }
}
