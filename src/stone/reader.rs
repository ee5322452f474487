// src/stone/reader.rs

//! Sequential stone archive reader
//!
//! Opens a seekable byte source, validates the archive header, then yields
//! payloads one at a time. Payload bodies are read as stored bytes and only
//! decompressed on demand. The input file is held for the lifetime of the
//! reader and closed on drop, including every parse-failure path.

use crate::error::{Error, Result};
use crate::stone::header::{ArchiveHeader, ARCHIVE_HEADER_SIZE};
use crate::stone::meta::MetaPayload;
use crate::stone::payload::{
    decompress_payload, PayloadHeader, PayloadType, PAYLOAD_HEADER_SIZE,
};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::debug;

/// One payload: header plus stored (still compressed) body
#[derive(Debug, Clone)]
pub struct Payload {
    pub header: PayloadHeader,
    stored: Vec<u8>,
}

impl Payload {
    /// Decompress the body, verifying checksum and sizes
    pub fn plain(&self) -> Result<Vec<u8>> {
        decompress_payload(&self.header, &self.stored)
    }

    /// Decode the body as a Meta payload
    pub fn meta(&self) -> Result<MetaPayload> {
        if self.header.payload_type != PayloadType::Meta {
            return Err(Error::Corrupt(format!(
                "expected meta payload, found {}",
                self.header.payload_type
            )));
        }
        MetaPayload::decode(&self.plain()?, self.header.num_records)
    }
}

/// Streaming reader over a stone archive
#[derive(Debug)]
pub struct StoneReader<R: Read + Seek> {
    reader: R,
    pub header: ArchiveHeader,
    remaining: u16,
    offset: u64,
}

impl StoneReader<File> {
    /// Open an archive file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::IoError(format!("failed to open {}: {e}", path.display()))
        })?;
        Self::new(file)
    }
}

impl<R: Read + Seek> StoneReader<R> {
    /// Read and validate the archive header from the start of the source
    pub fn new(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; ARCHIVE_HEADER_SIZE];
        reader
            .read_exact(&mut buf)
            .map_err(|e| Error::Corrupt(format!("short archive header: {e}")))?;
        let header = ArchiveHeader::decode(&buf)?;
        debug!(
            "opened {} archive with {} payloads",
            header.file_type, header.num_payloads
        );

        Ok(Self {
            reader,
            header,
            remaining: header.num_payloads,
            offset: ARCHIVE_HEADER_SIZE as u64,
        })
    }

    /// Read the next payload, or `None` once all payloads are consumed
    pub fn next_payload(&mut self) -> Result<Option<Payload>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let mut buf = [0u8; PAYLOAD_HEADER_SIZE];
        self.reader.read_exact(&mut buf).map_err(|e| {
            Error::Corrupt(format!(
                "truncated payload header at offset {}: {e}",
                self.offset
            ))
        })?;
        let header = PayloadHeader::decode(&buf)?;
        self.offset += PAYLOAD_HEADER_SIZE as u64;

        let mut stored = vec![0u8; header.stored_size as usize];
        self.reader.read_exact(&mut stored).map_err(|e| {
            Error::Corrupt(format!(
                "truncated payload body at offset {}: {e}",
                self.offset
            ))
        })?;
        self.offset += header.stored_size;
        self.remaining -= 1;

        Ok(Some(Payload { header, stored }))
    }

    /// Iterator over the remaining payloads
    pub fn payloads(&mut self) -> Payloads<'_, R> {
        Payloads { reader: self }
    }
}

/// Iterator adapter for [`StoneReader::next_payload`]
pub struct Payloads<'a, R: Read + Seek> {
    reader: &'a mut StoneReader<R>,
}

impl<R: Read + Seek> Iterator for Payloads<'_, R> {
    type Item = Result<Payload>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_payload().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stone::header::FileType;
    use crate::stone::payload::Compression;
    use std::io::Cursor;
    use xxhash_rust::xxh3::xxh3_64;

    fn archive_with(bodies: &[&[u8]], file_type: FileType) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&ArchiveHeader::new(bodies.len() as u16, file_type).encode());
        for body in bodies {
            let header = PayloadHeader {
                stored_size: body.len() as u64,
                plain_size: body.len() as u64,
                checksum: xxh3_64(body),
                num_records: 0,
                version: 1,
                payload_type: PayloadType::Layout,
                compression: Compression::None,
            };
            out.extend_from_slice(&header.encode());
            out.extend_from_slice(body);
        }
        out
    }

    #[test]
    fn test_reads_all_payloads() {
        let archive = archive_with(&[b"first", b"second body"], FileType::Binary);
        let mut reader = StoneReader::new(Cursor::new(archive)).unwrap();
        assert_eq!(reader.header.file_type, FileType::Binary);

        let first = reader.next_payload().unwrap().unwrap();
        assert_eq!(first.plain().unwrap(), b"first");
        let second = reader.next_payload().unwrap().unwrap();
        assert_eq!(second.plain().unwrap(), b"second body");
        assert!(reader.next_payload().unwrap().is_none());
    }

    #[test]
    fn test_payload_iterator() {
        let archive = archive_with(&[b"a", b"b", b"c"], FileType::Repository);
        let mut reader = StoneReader::new(Cursor::new(archive)).unwrap();
        let payloads: Result<Vec<_>> = reader.payloads().collect();
        assert_eq!(payloads.unwrap().len(), 3);
    }

    #[test]
    fn test_truncated_body() {
        let mut archive = archive_with(&[b"full payload body"], FileType::Binary);
        archive.truncate(archive.len() - 4);
        let mut reader = StoneReader::new(Cursor::new(archive)).unwrap();
        let err = reader.next_payload().unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_not_an_archive() {
        let err = StoneReader::new(Cursor::new(b"definitely not a stone".to_vec())).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_short_header() {
        let err = StoneReader::new(Cursor::new(vec![0u8; 4])).unwrap_err();
        assert!(err.to_string().contains("short archive header"));
    }
}
