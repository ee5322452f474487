// src/stone/meta.rs

//! Meta payload record decoding
//!
//! A Meta payload body is a sequence of `{tag: u16, type: u8, length: u32,
//! value[length]}` records (big-endian). Unknown tags and the legacy
//! `Conflicts` tag are decoded but ignored by the catalog. Dependency and
//! provider values carry `{kind: u8, identifier_len: u16, identifier}`.

use crate::dependency::{Dependency, Kind, Provider};
use crate::error::{Error, Result};
use xxhash_rust::xxh3::xxh3_128;

/// Record tag: which package field a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    Name,
    Architecture,
    Version,
    Summary,
    Description,
    Homepage,
    SourceID,
    Depends,
    Provides,
    Conflicts,
    Release,
    License,
    BuildRelease,
    PackageURI,
    PackageHash,
    PackageSize,
    /// Tolerated and skipped
    Unknown(u16),
}

impl RecordTag {
    pub fn to_wire(self) -> u16 {
        match self {
            RecordTag::Name => 1,
            RecordTag::Architecture => 2,
            RecordTag::Version => 3,
            RecordTag::Summary => 4,
            RecordTag::Description => 5,
            RecordTag::Homepage => 6,
            RecordTag::SourceID => 7,
            RecordTag::Depends => 8,
            RecordTag::Provides => 9,
            RecordTag::Conflicts => 10,
            RecordTag::Release => 11,
            RecordTag::License => 12,
            RecordTag::BuildRelease => 13,
            RecordTag::PackageURI => 14,
            RecordTag::PackageHash => 15,
            RecordTag::PackageSize => 16,
            RecordTag::Unknown(raw) => raw,
        }
    }

    pub fn from_wire(raw: u16) -> Self {
        match raw {
            1 => RecordTag::Name,
            2 => RecordTag::Architecture,
            3 => RecordTag::Version,
            4 => RecordTag::Summary,
            5 => RecordTag::Description,
            6 => RecordTag::Homepage,
            7 => RecordTag::SourceID,
            8 => RecordTag::Depends,
            9 => RecordTag::Provides,
            10 => RecordTag::Conflicts,
            11 => RecordTag::Release,
            12 => RecordTag::License,
            13 => RecordTag::BuildRelease,
            14 => RecordTag::PackageURI,
            15 => RecordTag::PackageHash,
            16 => RecordTag::PackageSize,
            other => RecordTag::Unknown(other),
        }
    }
}

/// Decoded record value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    String(String),
    Dependency(Dependency),
    Provider(Provider),
    /// Unrecognised value type, kept raw
    Unknown(Vec<u8>),
}

impl RecordValue {
    /// Unsigned view of any integer value
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RecordValue::Int8(v) => u64::try_from(*v).ok(),
            RecordValue::Uint8(v) => Some(u64::from(*v)),
            RecordValue::Int16(v) => u64::try_from(*v).ok(),
            RecordValue::Uint16(v) => Some(u64::from(*v)),
            RecordValue::Int32(v) => u64::try_from(*v).ok(),
            RecordValue::Uint32(v) => Some(u64::from(*v)),
            RecordValue::Int64(v) => u64::try_from(*v).ok(),
            RecordValue::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// One decoded `(tag, value)` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub tag: RecordTag,
    pub value: RecordValue,
}

/// Record value types on the wire
const TYPE_INT8: u8 = 1;
const TYPE_UINT8: u8 = 2;
const TYPE_INT16: u8 = 3;
const TYPE_UINT16: u8 = 4;
const TYPE_INT32: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_INT64: u8 = 7;
const TYPE_UINT64: u8 = 8;
const TYPE_STRING: u8 = 9;
const TYPE_DEPENDENCY: u8 = 10;
const TYPE_PROVIDER: u8 = 11;

fn expect_len(tag: u16, expected: usize, value: &[u8], offset: usize) -> Result<()> {
    if value.len() != expected {
        return Err(Error::Corrupt(format!(
            "record tag {tag} at offset {offset}: value is {} bytes, expected {expected}",
            value.len()
        )));
    }
    Ok(())
}

fn decode_capability(value: &[u8], offset: usize) -> Result<(Kind, String)> {
    if value.len() < 3 {
        return Err(Error::Corrupt(format!(
            "capability record at offset {offset} too short ({} bytes)",
            value.len()
        )));
    }
    let kind = Kind::from_wire(value[0])?;
    let id_len = u16::from_be_bytes([value[1], value[2]]) as usize;
    if value.len() != 3 + id_len {
        return Err(Error::Corrupt(format!(
            "capability record at offset {offset}: identifier length {id_len} does not match value"
        )));
    }
    let identifier = std::str::from_utf8(&value[3..])
        .map_err(|_| Error::Corrupt(format!("capability record at offset {offset} is not UTF-8")))?
        .to_string();
    Ok((kind, identifier))
}

fn decode_value(tag: u16, value_type: u8, value: &[u8], offset: usize) -> Result<RecordValue> {
    let value = match value_type {
        TYPE_INT8 => {
            expect_len(tag, 1, value, offset)?;
            RecordValue::Int8(value[0] as i8)
        }
        TYPE_UINT8 => {
            expect_len(tag, 1, value, offset)?;
            RecordValue::Uint8(value[0])
        }
        TYPE_INT16 => {
            expect_len(tag, 2, value, offset)?;
            RecordValue::Int16(i16::from_be_bytes([value[0], value[1]]))
        }
        TYPE_UINT16 => {
            expect_len(tag, 2, value, offset)?;
            RecordValue::Uint16(u16::from_be_bytes([value[0], value[1]]))
        }
        TYPE_INT32 => {
            expect_len(tag, 4, value, offset)?;
            RecordValue::Int32(i32::from_be_bytes(value.try_into().unwrap()))
        }
        TYPE_UINT32 => {
            expect_len(tag, 4, value, offset)?;
            RecordValue::Uint32(u32::from_be_bytes(value.try_into().unwrap()))
        }
        TYPE_INT64 => {
            expect_len(tag, 8, value, offset)?;
            RecordValue::Int64(i64::from_be_bytes(value.try_into().unwrap()))
        }
        TYPE_UINT64 => {
            expect_len(tag, 8, value, offset)?;
            RecordValue::Uint64(u64::from_be_bytes(value.try_into().unwrap()))
        }
        TYPE_STRING => {
            let s = std::str::from_utf8(value).map_err(|_| {
                Error::Corrupt(format!("string record at offset {offset} is not UTF-8"))
            })?;
            RecordValue::String(s.to_string())
        }
        TYPE_DEPENDENCY => {
            let (kind, identifier) = decode_capability(value, offset)?;
            RecordValue::Dependency(Dependency::new(kind, identifier))
        }
        TYPE_PROVIDER => {
            let (kind, identifier) = decode_capability(value, offset)?;
            RecordValue::Provider(Provider::new(kind, identifier))
        }
        _ => RecordValue::Unknown(value.to_vec()),
    };
    Ok(value)
}

/// A fully decoded Meta payload: the records describing one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaPayload {
    records: Vec<MetaRecord>,
}

impl MetaPayload {
    /// Decode `num_records` records from a decompressed payload body
    pub fn decode(data: &[u8], num_records: u32) -> Result<Self> {
        let mut records = Vec::with_capacity(num_records as usize);
        let mut offset = 0usize;

        for _ in 0..num_records {
            if data.len() < offset + 7 {
                return Err(Error::Corrupt(format!(
                    "truncated record header at offset {offset}"
                )));
            }
            let tag = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let value_type = data[offset + 2];
            let length =
                u32::from_be_bytes(data[offset + 3..offset + 7].try_into().unwrap()) as usize;
            let value_start = offset + 7;

            if data.len() < value_start + length {
                return Err(Error::Corrupt(format!(
                    "truncated record value at offset {value_start} (need {length} bytes)"
                )));
            }

            let value = decode_value(
                tag,
                value_type,
                &data[value_start..value_start + length],
                offset,
            )?;
            records.push(MetaRecord {
                tag: RecordTag::from_wire(tag),
                value,
            });
            offset = value_start + length;
        }

        if offset != data.len() {
            return Err(Error::Corrupt(format!(
                "{} trailing bytes after final record at offset {offset}",
                data.len() - offset
            )));
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[MetaRecord] {
        &self.records
    }

    /// First string value for a tag
    pub fn string(&self, tag: RecordTag) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.tag == tag)
            .and_then(|r| r.value.as_str())
    }

    /// First integer value for a tag, widened to u64
    pub fn u64(&self, tag: RecordTag) -> Option<u64> {
        self.records
            .iter()
            .find(|r| r.tag == tag)
            .and_then(|r| r.value.as_u64())
    }

    /// All string values for a tag, in record order (used for licenses)
    pub fn strings(&self, tag: RecordTag) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .filter_map(|r| r.value.as_str().map(String::from))
            .collect()
    }

    /// Runtime dependencies, in record order
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.records
            .iter()
            .filter(|r| r.tag == RecordTag::Depends)
            .filter_map(|r| match &r.value {
                RecordValue::Dependency(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Explicit providers, in record order
    pub fn providers(&self) -> Vec<Provider> {
        self.records
            .iter()
            .filter(|r| r.tag == RecordTag::Provides)
            .filter_map(|r| match &r.value {
                RecordValue::Provider(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// Stable package identifier derived from the payload fields
    ///
    /// Same inputs always hash to the same identifier. The content hash is
    /// folded in when present so rebuilds with identical version numbers
    /// still get distinct identities.
    pub fn pkg_id(&self) -> String {
        let canonical = format!(
            "{}\0{}\0{}\0{}\0{}\0{}",
            self.string(RecordTag::Name).unwrap_or_default(),
            self.string(RecordTag::Version).unwrap_or_default(),
            self.u64(RecordTag::Release).unwrap_or_default(),
            self.u64(RecordTag::BuildRelease).unwrap_or_default(),
            self.string(RecordTag::Architecture).unwrap_or_default(),
            self.string(RecordTag::PackageHash).unwrap_or_default(),
        );
        format!("{:032x}", xxh3_128(canonical.as_bytes()))
    }
}
