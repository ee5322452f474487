// src/db/meta.rs

//! Package metadata catalog
//!
//! Two keyspaces: `entries` maps pkgID to a serialized [`MetaEntry`], and
//! `providers` is the derived reverse index from a provider's canonical
//! string form to the set of pkgIDs offering it. The provider index is
//! rebuilt whenever the entries are rebuilt.

use crate::db::{self, Mutability};
use crate::dependency::{Dependency, Kind, Provider};
use crate::error::{Error, Result};
use crate::stone::{FileType, MetaPayload, RecordTag, StoneReader};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ENTRIES_TABLE: &str = "entries";
const PROVIDERS_TABLE: &str = "providers";

/// One catalog row: the metadata of a single package build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub pkg_id: String,
    pub name: String,
    /// Display version string
    pub version_identifier: String,
    /// Monotonic per upstream source
    pub source_release: u64,
    pub build_release: u64,
    pub architecture: String,
    pub summary: String,
    pub description: String,
    pub homepage: String,
    /// Groups the same upstream source across arches and releases
    pub source_id: String,
    pub licenses: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub providers: Vec<Provider>,
    /// Remote-fetch hints; absent for installed-local entries
    pub uri: Option<String>,
    pub hash: Option<String>,
    pub download_size: Option<u64>,
}

impl MetaEntry {
    /// Materialize an owned entry from a decoded Meta payload
    pub fn from_payload(payload: &MetaPayload) -> Result<Self> {
        let name = payload
            .string(RecordTag::Name)
            .ok_or_else(|| Error::MalformedEntry("meta payload has no name".to_string()))?
            .to_string();
        let version_identifier = payload
            .string(RecordTag::Version)
            .ok_or_else(|| {
                Error::MalformedEntry(format!("meta payload for '{name}' has no version"))
            })?
            .to_string();

        Ok(Self {
            pkg_id: payload.pkg_id(),
            name,
            version_identifier,
            source_release: payload.u64(RecordTag::Release).unwrap_or_default(),
            build_release: payload.u64(RecordTag::BuildRelease).unwrap_or_default(),
            architecture: payload
                .string(RecordTag::Architecture)
                .unwrap_or_default()
                .to_string(),
            summary: payload
                .string(RecordTag::Summary)
                .unwrap_or_default()
                .to_string(),
            description: payload
                .string(RecordTag::Description)
                .unwrap_or_default()
                .to_string(),
            homepage: payload
                .string(RecordTag::Homepage)
                .unwrap_or_default()
                .to_string(),
            source_id: payload
                .string(RecordTag::SourceID)
                .unwrap_or_default()
                .to_string(),
            licenses: payload.strings(RecordTag::License),
            dependencies: payload.dependencies(),
            providers: payload.providers(),
            uri: payload.string(RecordTag::PackageURI).map(String::from),
            hash: payload.string(RecordTag::PackageHash).map(String::from),
            download_size: payload.u64(RecordTag::PackageSize),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn table_name() -> &'static str {
        ENTRIES_TABLE
    }

    /// Field projection used by display surfaces
    pub fn info(&self) -> ItemInfo {
        ItemInfo {
            name: self.name.clone(),
            summary: self.summary.clone(),
            description: self.description.clone(),
            source_release: self.source_release,
            version: self.version_identifier.clone(),
            homepage: self.homepage.clone(),
            licenses: self.licenses.clone(),
        }
    }
}

/// Display projection of a catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemInfo {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub source_release: u64,
    pub version: String,
    pub homepage: String,
    pub licenses: Vec<String>,
}

fn decode_provider_set(bytes: &[u8]) -> Result<Vec<String>> {
    Ok(serde_json::from_slice(bytes)?)
}

fn encode_provider_set(ids: &[String]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(ids)?)
}

/// Append `pkg_id` to a provider row, creating the row when absent
fn index_provider(conn: &Connection, provider: &Provider, pkg_id: &str) -> Result<()> {
    let key = provider.to_string();
    let mut ids = match db::get(conn, PROVIDERS_TABLE, key.as_bytes())? {
        Some(bytes) => decode_provider_set(&bytes)?,
        None => Vec::new(),
    };
    if !ids.iter().any(|id| id == pkg_id) {
        ids.push(pkg_id.to_string());
        db::put(
            conn,
            PROVIDERS_TABLE,
            key.as_bytes(),
            &encode_provider_set(&ids)?,
        )?;
    }
    Ok(())
}

/// Save one entry and index its providers, including the implicit name provider
fn store_entry(conn: &Connection, entry: &MetaEntry) -> Result<()> {
    db::put(conn, ENTRIES_TABLE, entry.pkg_id.as_bytes(), &entry.encode()?)?;
    index_provider(conn, &Provider::package_name(&entry.name), &entry.pkg_id)?;
    for provider in &entry.providers {
        index_provider(conn, provider, &entry.pkg_id)?;
    }
    Ok(())
}

/// Transactional catalog of available or installed packages
pub struct MetaDb {
    path: PathBuf,
    mutability: Mutability,
    conn: Option<Connection>,
}

impl MetaDb {
    /// Open the catalog at `path`, creating keyspaces when writable
    pub fn connect(path: impl Into<PathBuf>, mutability: Mutability) -> Result<Self> {
        let path = path.into();
        let conn = db::open(&path, mutability)?;
        if mutability == Mutability::ReadWrite {
            db::ensure_keyspace(&conn, ENTRIES_TABLE)?;
            db::ensure_keyspace(&conn, PROVIDERS_TABLE)?;
        }
        Ok(Self {
            path,
            mutability,
            conn: Some(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::DatabaseError(format!("{} is closed", self.path.display())))
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        let path = self.path.clone();
        self.conn
            .as_mut()
            .ok_or_else(|| Error::DatabaseError(format!("{} is closed", path.display())))
    }

    /// Display projection for a package; empty default when unknown.
    /// Never fails.
    pub fn info(&self, pkg_id: &str) -> ItemInfo {
        self.get(pkg_id)
            .ok()
            .flatten()
            .map(|entry| entry.info())
            .unwrap_or_default()
    }

    /// Fetch one entry by pkgID
    pub fn get(&self, pkg_id: &str) -> Result<Option<MetaEntry>> {
        match db::get(self.conn()?, ENTRIES_TABLE, pkg_id.as_bytes())? {
            Some(bytes) => Ok(Some(MetaEntry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether the catalog holds an entry for `pkg_id`
    pub fn has_id(&self, pkg_id: &str) -> Result<bool> {
        Ok(db::get(self.conn()?, ENTRIES_TABLE, pkg_id.as_bytes())?.is_some())
    }

    /// Single-field accessor in stone tag terms
    pub fn get_value(&self, pkg_id: &str, tag: RecordTag) -> Result<Option<String>> {
        let Some(entry) = self.get(pkg_id)? else {
            return Ok(None);
        };
        let value = match tag {
            RecordTag::Name => Some(entry.name),
            RecordTag::Version => Some(entry.version_identifier),
            RecordTag::Release => Some(entry.source_release.to_string()),
            RecordTag::BuildRelease => Some(entry.build_release.to_string()),
            RecordTag::Architecture => Some(entry.architecture),
            RecordTag::Summary => Some(entry.summary),
            RecordTag::Description => Some(entry.description),
            RecordTag::Homepage => Some(entry.homepage),
            RecordTag::SourceID => Some(entry.source_id),
            RecordTag::License => Some(entry.licenses.join("; ")),
            RecordTag::PackageURI => entry.uri,
            RecordTag::PackageHash => entry.hash,
            RecordTag::PackageSize => entry.download_size.map(|s| s.to_string()),
            _ => None,
        };
        Ok(value)
    }

    /// All entries in stable (pkgID) order
    pub fn list(&self) -> Result<Vec<MetaEntry>> {
        db::scan(self.conn()?, ENTRIES_TABLE)?
            .into_iter()
            .map(|(_, value)| MetaEntry::decode(&value))
            .collect()
    }

    /// pkgIDs whose entries provide `(kind, matcher)`
    pub fn by_provider(&self, kind: Kind, matcher: &str) -> Result<Vec<String>> {
        let key = Provider::new(kind, matcher).to_string();
        match db::get(self.conn()?, PROVIDERS_TABLE, key.as_bytes())? {
            Some(bytes) => decode_provider_set(&bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Atomically replace the whole catalog with the contents of a stone index
    ///
    /// The wipe and repopulation commit together or not at all. When the load
    /// fails the catalog is wiped and closed instead, so a post-failure
    /// database is observably empty and callers know to re-fetch.
    pub fn load_from_index(&mut self, index: impl AsRef<Path>) -> Result<usize> {
        let index = index.as_ref();
        let result = self.replace_from_index(index);
        match result {
            Ok(count) => {
                info!(
                    "loaded {count} entries from {} into {}",
                    index.display(),
                    self.path.display()
                );
                Ok(count)
            }
            Err(e) => {
                warn!("index load from {} failed: {e}", index.display());
                if let Ok(conn) = self.conn_mut() {
                    let _ = db::transaction(conn, |tx| {
                        db::clear(tx, ENTRIES_TABLE)?;
                        db::clear(tx, PROVIDERS_TABLE)?;
                        Ok(())
                    });
                }
                self.close();
                Err(e)
            }
        }
    }

    fn replace_from_index(&mut self, index: &Path) -> Result<usize> {
        if self.mutability != Mutability::ReadWrite {
            return Err(Error::DatabaseError(format!(
                "{} is read-only",
                self.path.display()
            )));
        }

        let mut reader = StoneReader::open(index)?;
        if reader.header.file_type != FileType::Repository {
            return Err(Error::Corrupt(format!(
                "{} is a {} archive, not a repository index",
                index.display(),
                reader.header.file_type
            )));
        }

        let mut entries = Vec::new();
        for payload in reader.payloads() {
            let payload = payload?;
            let entry = MetaEntry::from_payload(&payload.meta()?)?;
            entries.push(entry);
        }

        let conn = self.conn_mut()?;
        db::transaction(conn, |tx| {
            db::clear(tx, ENTRIES_TABLE)?;
            db::clear(tx, PROVIDERS_TABLE)?;
            for entry in &entries {
                store_entry(tx, entry)?;
            }
            Ok(())
        })?;

        Ok(entries.len())
    }

    /// Record a single entry (installed-set bookkeeping)
    pub fn record(&mut self, entry: &MetaEntry) -> Result<()> {
        let conn = self.conn_mut()?;
        db::transaction(conn, |tx| store_entry(tx, entry))?;
        debug!("recorded {} ({})", entry.name, entry.pkg_id);
        Ok(())
    }

    /// Remove a single entry and drop it from every provider row
    pub fn remove(&mut self, pkg_id: &str) -> Result<()> {
        let conn = self.conn_mut()?;
        db::transaction(conn, |tx| {
            db::delete(tx, ENTRIES_TABLE, pkg_id.as_bytes())?;
            for (key, value) in db::scan(tx, PROVIDERS_TABLE)? {
                let mut ids = decode_provider_set(&value)?;
                let before = ids.len();
                ids.retain(|id| id != pkg_id);
                if ids.is_empty() {
                    db::delete(tx, PROVIDERS_TABLE, &key)?;
                } else if ids.len() != before {
                    db::put(tx, PROVIDERS_TABLE, &key, &encode_provider_set(&ids)?)?;
                }
            }
            Ok(())
        })
    }

    /// Close the store; further calls are no-ops
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!("closed database {}", self.path.display());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}
