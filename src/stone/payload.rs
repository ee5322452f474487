// src/stone/payload.rs

//! Payload headers and body decompression
//!
//! Each payload header is 32 bytes (big-endian):
//!
//! | offset | size | field                          |
//! |--------|------|--------------------------------|
//! | 0      | 8    | stored size (compressed)       |
//! | 8      | 8    | plain size (decompressed)      |
//! | 16     | 8    | checksum (xxh3-64 of stored)   |
//! | 24     | 4    | record count                   |
//! | 28     | 2    | payload version                |
//! | 30     | 1    | payload type                   |
//! | 31     | 1    | compression                    |

use crate::error::{Error, Result};
use std::io::Read;
use xxhash_rust::xxh3::xxh3_64;

/// Encoded size of [`PayloadHeader`]
pub const PAYLOAD_HEADER_SIZE: usize = 32;

/// What a payload body contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    /// Package metadata records
    Meta,
    /// File content blobs
    Content,
    /// Filesystem layout entries
    Layout,
    /// Content index entries
    Index,
}

impl PayloadType {
    pub fn to_wire(self) -> u8 {
        match self {
            PayloadType::Meta => 1,
            PayloadType::Content => 2,
            PayloadType::Layout => 3,
            PayloadType::Index => 4,
        }
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            1 => Ok(PayloadType::Meta),
            2 => Ok(PayloadType::Content),
            3 => Ok(PayloadType::Layout),
            4 => Ok(PayloadType::Index),
            other => Err(Error::Corrupt(format!("unknown payload type {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PayloadType::Meta => "meta",
            PayloadType::Content => "content",
            PayloadType::Layout => "layout",
            PayloadType::Index => "index",
        }
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a payload body is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd,
    Gzip,
}

impl Compression {
    pub fn to_wire(self) -> u8 {
        match self {
            Compression::None => 1,
            Compression::Zstd => 2,
            Compression::Gzip => 3,
        }
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            1 => Ok(Compression::None),
            2 => Ok(Compression::Zstd),
            3 => Ok(Compression::Gzip),
            other => Err(Error::Corrupt(format!("unknown compression {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zstd => "zstd",
            Compression::Gzip => "gzip",
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decoded payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub stored_size: u64,
    pub plain_size: u64,
    pub checksum: u64,
    pub num_records: u32,
    pub version: u16,
    pub payload_type: PayloadType,
    pub compression: Compression,
}

impl PayloadHeader {
    pub fn decode(buf: &[u8; PAYLOAD_HEADER_SIZE]) -> Result<Self> {
        let stored_size = u64::from_be_bytes(buf[0..8].try_into().unwrap());
        let plain_size = u64::from_be_bytes(buf[8..16].try_into().unwrap());
        let checksum = u64::from_be_bytes(buf[16..24].try_into().unwrap());
        let num_records = u32::from_be_bytes(buf[24..28].try_into().unwrap());
        let version = u16::from_be_bytes(buf[28..30].try_into().unwrap());
        let payload_type = PayloadType::from_wire(buf[30])?;
        let compression = Compression::from_wire(buf[31])?;

        Ok(Self {
            stored_size,
            plain_size,
            checksum,
            num_records,
            version,
            payload_type,
            compression,
        })
    }

    pub fn encode(&self) -> [u8; PAYLOAD_HEADER_SIZE] {
        let mut buf = [0u8; PAYLOAD_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.stored_size.to_be_bytes());
        buf[8..16].copy_from_slice(&self.plain_size.to_be_bytes());
        buf[16..24].copy_from_slice(&self.checksum.to_be_bytes());
        buf[24..28].copy_from_slice(&self.num_records.to_be_bytes());
        buf[28..30].copy_from_slice(&self.version.to_be_bytes());
        buf[30] = self.payload_type.to_wire();
        buf[31] = self.compression.to_wire();
        buf
    }
}

/// Verify a payload body against its header and decompress it
///
/// The checksum covers the stored (compressed) bytes; the plain size is
/// enforced after decompression so a truncated body cannot slip through.
pub fn decompress_payload(header: &PayloadHeader, stored: &[u8]) -> Result<Vec<u8>> {
    if stored.len() as u64 != header.stored_size {
        return Err(Error::Corrupt(format!(
            "truncated payload: {} stored bytes, header says {}",
            stored.len(),
            header.stored_size
        )));
    }

    let checksum = xxh3_64(stored);
    if checksum != header.checksum {
        return Err(Error::Corrupt(format!(
            "payload checksum mismatch: computed {checksum:#018x}, header says {:#018x}",
            header.checksum
        )));
    }

    let plain = match header.compression {
        Compression::None => stored.to_vec(),
        Compression::Zstd => zstd::decode_all(stored)
            .map_err(|e| Error::Corrupt(format!("zstd decompression failed: {e}")))?,
        Compression::Gzip => {
            let mut out = Vec::with_capacity(header.plain_size as usize);
            flate2::read::GzDecoder::new(stored)
                .read_to_end(&mut out)
                .map_err(|e| Error::Corrupt(format!("gzip decompression failed: {e}")))?;
            out
        }
    };

    if plain.len() as u64 != header.plain_size {
        return Err(Error::Corrupt(format!(
            "truncated payload: {} plain bytes, header says {}",
            plain.len(),
            header.plain_size
        )));
    }

    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn header_for(data: &[u8], plain_size: u64, compression: Compression) -> PayloadHeader {
        PayloadHeader {
            stored_size: data.len() as u64,
            plain_size,
            checksum: xxh3_64(data),
            num_records: 1,
            version: 1,
            payload_type: PayloadType::Meta,
            compression,
        }
    }

    #[test]
    fn test_header_round_trip() {
        let header = header_for(b"hello", 5, Compression::None);
        let decoded = PayloadHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_decompress_none() {
        let data = b"record bytes";
        let header = header_for(data, data.len() as u64, Compression::None);
        assert_eq!(decompress_payload(&header, data).unwrap(), data);
    }

    #[test]
    fn test_decompress_zstd() {
        let plain = b"zstd payload body".repeat(16);
        let stored = zstd::encode_all(&plain[..], 0).unwrap();
        let header = header_for(&stored, plain.len() as u64, Compression::Zstd);
        assert_eq!(decompress_payload(&header, &stored).unwrap(), plain);
    }

    #[test]
    fn test_decompress_gzip() {
        let plain = b"gzip payload body".repeat(16);
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&plain).unwrap();
        let stored = encoder.finish().unwrap();
        let header = header_for(&stored, plain.len() as u64, Compression::Gzip);
        assert_eq!(decompress_payload(&header, &stored).unwrap(), plain);
    }

    #[test]
    fn test_checksum_mismatch() {
        let data = b"payload";
        let mut header = header_for(data, data.len() as u64, Compression::None);
        header.checksum ^= 1;
        let err = decompress_payload(&header, data).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_plain_size_mismatch() {
        let data = b"payload";
        let header = header_for(data, 999, Compression::None);
        let err = decompress_payload(&header, data).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
