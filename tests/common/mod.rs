// tests/common/mod.rs

//! Shared fixtures: builds stone archives byte-by-byte so integration tests
//! can exercise the consumer-side parsers without a package build toolchain.

#![allow(dead_code)]

use moss::{Dependency, Provider};
use std::fs;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

const FILE_TYPE_BINARY: u8 = 1;
const FILE_TYPE_REPOSITORY: u8 = 3;

const PAYLOAD_META: u8 = 1;
const COMPRESSION_NONE: u8 = 1;
const COMPRESSION_ZSTD: u8 = 2;

const TAG_NAME: u16 = 1;
const TAG_ARCHITECTURE: u16 = 2;
const TAG_VERSION: u16 = 3;
const TAG_SUMMARY: u16 = 4;
const TAG_DESCRIPTION: u16 = 5;
const TAG_HOMEPAGE: u16 = 6;
const TAG_SOURCE_ID: u16 = 7;
const TAG_DEPENDS: u16 = 8;
const TAG_PROVIDES: u16 = 9;
const TAG_RELEASE: u16 = 11;
const TAG_LICENSE: u16 = 12;
const TAG_BUILD_RELEASE: u16 = 13;
const TAG_PACKAGE_URI: u16 = 14;
const TAG_PACKAGE_HASH: u16 = 15;
const TAG_PACKAGE_SIZE: u16 = 16;

const TYPE_UINT64: u8 = 8;
const TYPE_STRING: u8 = 9;
const TYPE_DEPENDENCY: u8 = 10;
const TYPE_PROVIDER: u8 = 11;

/// Declarative description of one package in a fixture archive
#[derive(Debug, Clone)]
pub struct FixturePackage {
    pub name: String,
    pub version: String,
    pub release: u64,
    pub build_release: u64,
    pub architecture: String,
    pub summary: String,
    pub description: String,
    pub homepage: String,
    pub source_id: String,
    pub licenses: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub providers: Vec<Provider>,
    pub uri: Option<String>,
    pub hash: Option<String>,
    pub size: Option<u64>,
}

impl FixturePackage {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release: 1,
            build_release: 1,
            architecture: "x86_64".to_string(),
            summary: format!("The {name} package"),
            description: String::new(),
            homepage: String::new(),
            source_id: name.to_string(),
            licenses: vec!["MIT".to_string()],
            dependencies: Vec::new(),
            providers: Vec::new(),
            uri: None,
            hash: None,
            size: None,
        }
    }

    pub fn release(mut self, release: u64) -> Self {
        self.release = release;
        self
    }

    pub fn providing(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn depending(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn downloadable(mut self, uri: &str, hash: &str, size: u64) -> Self {
        self.uri = Some(uri.to_string());
        self.hash = Some(hash.to_string());
        self.size = Some(size);
        self
    }
}

fn record(tag: u16, value_type: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(7 + value.len());
    out.extend_from_slice(&tag.to_be_bytes());
    out.push(value_type);
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
    out
}

fn capability(kind: u8, identifier: &str) -> Vec<u8> {
    let mut out = vec![kind];
    out.extend_from_slice(&(identifier.len() as u16).to_be_bytes());
    out.extend_from_slice(identifier.as_bytes());
    out
}

/// Encode a package as meta records, returning `(body, record_count)`
fn meta_records(pkg: &FixturePackage) -> (Vec<u8>, u32) {
    let mut body = Vec::new();
    let mut count = 0u32;
    let mut push = |bytes: Vec<u8>| {
        body.extend(bytes);
        count += 1;
    };

    push(record(TAG_NAME, TYPE_STRING, pkg.name.as_bytes()));
    push(record(TAG_VERSION, TYPE_STRING, pkg.version.as_bytes()));
    push(record(TAG_RELEASE, TYPE_UINT64, &pkg.release.to_be_bytes()));
    push(record(
        TAG_BUILD_RELEASE,
        TYPE_UINT64,
        &pkg.build_release.to_be_bytes(),
    ));
    push(record(
        TAG_ARCHITECTURE,
        TYPE_STRING,
        pkg.architecture.as_bytes(),
    ));
    push(record(TAG_SUMMARY, TYPE_STRING, pkg.summary.as_bytes()));
    push(record(
        TAG_DESCRIPTION,
        TYPE_STRING,
        pkg.description.as_bytes(),
    ));
    push(record(TAG_HOMEPAGE, TYPE_STRING, pkg.homepage.as_bytes()));
    push(record(TAG_SOURCE_ID, TYPE_STRING, pkg.source_id.as_bytes()));
    for license in &pkg.licenses {
        push(record(TAG_LICENSE, TYPE_STRING, license.as_bytes()));
    }
    for dep in &pkg.dependencies {
        push(record(
            TAG_DEPENDS,
            TYPE_DEPENDENCY,
            &capability(dep.kind.to_wire(), &dep.identifier),
        ));
    }
    for provider in &pkg.providers {
        push(record(
            TAG_PROVIDES,
            TYPE_PROVIDER,
            &capability(provider.kind.to_wire(), &provider.identifier),
        ));
    }
    if let Some(uri) = &pkg.uri {
        push(record(TAG_PACKAGE_URI, TYPE_STRING, uri.as_bytes()));
    }
    if let Some(hash) = &pkg.hash {
        push(record(TAG_PACKAGE_HASH, TYPE_STRING, hash.as_bytes()));
    }
    if let Some(size) = pkg.size {
        push(record(TAG_PACKAGE_SIZE, TYPE_UINT64, &size.to_be_bytes()));
    }

    (body, count)
}

fn payload(pkg: &FixturePackage, compress: bool) -> Vec<u8> {
    let (plain, num_records) = meta_records(pkg);
    let (stored, compression) = if compress {
        (zstd::encode_all(&plain[..], 0).unwrap(), COMPRESSION_ZSTD)
    } else {
        (plain.clone(), COMPRESSION_NONE)
    };

    let mut out = Vec::with_capacity(32 + stored.len());
    out.extend_from_slice(&(stored.len() as u64).to_be_bytes());
    out.extend_from_slice(&(plain.len() as u64).to_be_bytes());
    out.extend_from_slice(&xxh3_64(&stored).to_be_bytes());
    out.extend_from_slice(&num_records.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.push(PAYLOAD_META);
    out.push(compression);
    out.extend_from_slice(&stored);
    out
}

fn archive(file_type: u8, payloads: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x006D_6F73u32.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&(payloads.len() as u16).to_be_bytes());
    out.push(file_type);
    out.extend_from_slice(&[0u8; 5]);
    for payload in payloads {
        out.extend_from_slice(payload);
    }
    out
}

/// Write a repository index: one zstd-compressed meta payload per package
pub fn write_index(path: &Path, packages: &[FixturePackage]) {
    let payloads: Vec<Vec<u8>> = packages.iter().map(|p| payload(p, true)).collect();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, archive(FILE_TYPE_REPOSITORY, &payloads)).unwrap();
}

/// Write a single binary package stone with an uncompressed meta payload
pub fn write_package(path: &Path, package: &FixturePackage) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, archive(FILE_TYPE_BINARY, &[payload(package, false)])).unwrap();
}
