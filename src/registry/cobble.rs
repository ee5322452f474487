// src/registry/cobble.rs

//! Side-loaded package plugin
//!
//! Treats local stone files as a single-package source each, so
//! `install ./some.stone` can resolve through the same registry as remote
//! packages. Candidates live in memory; nothing is persisted.

use crate::cache::CachePool;
use crate::db::{ItemInfo, MetaEntry};
use crate::dependency::{Dependency, Kind, Provider};
use crate::error::{Error, Result};
use crate::fetch::{FetchContext, Fetchable};
use crate::installation::Installation;
use crate::registry::{ItemFlags, Plugin, RegistryItem};
use crate::stone::{FileType, PayloadType, StoneReader};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A side-loaded stone and its extracted metadata
#[derive(Debug, Clone)]
pub struct PackageCandidate {
    pub path: PathBuf,
    pub entry: MetaEntry,
}

/// In-memory plugin over locally supplied stone files
pub struct CobblePlugin {
    candidates: HashMap<String, PackageCandidate>,
    pool: CachePool,
}

impl CobblePlugin {
    pub fn new(installation: &Installation) -> Self {
        Self {
            candidates: HashMap::new(),
            pool: CachePool::new(installation),
        }
    }

    /// Parse a local stone and register it as a candidate
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let mut reader = StoneReader::open(path)?;
        if reader.header.file_type != FileType::Binary {
            return Err(Error::Corrupt(format!(
                "{} is a {} archive, not a binary package",
                path.display(),
                reader.header.file_type
            )));
        }

        let mut meta = None;
        for payload in reader.payloads() {
            let payload = payload?;
            if payload.header.payload_type == PayloadType::Meta {
                meta = Some(payload.meta()?);
                break;
            }
        }
        let meta = meta.ok_or_else(|| {
            Error::MalformedEntry(format!("{} has no meta payload", path.display()))
        })?;

        let entry = MetaEntry::from_payload(&meta)?;
        let pkg_id = entry.pkg_id.clone();
        debug!(
            "registered side-loaded {} ({pkg_id}) from {}",
            entry.name,
            path.display()
        );
        self.candidates.insert(
            pkg_id.clone(),
            PackageCandidate {
                path: path.to_path_buf(),
                entry,
            },
        );
        Ok(pkg_id)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn item(&self, pkg_id: impl Into<String>) -> RegistryItem<'_> {
        RegistryItem::new(pkg_id, self, ItemFlags::AVAILABLE)
    }
}

impl Plugin for CobblePlugin {
    fn id(&self) -> &str {
        "cobble"
    }

    fn query_providers(
        &self,
        kind: Kind,
        matcher: &str,
        flags: ItemFlags,
    ) -> Vec<RegistryItem<'_>> {
        if !ItemFlags::AVAILABLE.matches(flags) {
            return Vec::new();
        }
        let wanted = Provider::new(kind, matcher);
        self.candidates
            .values()
            .filter(|c| {
                (kind == Kind::PackageName && c.entry.name == matcher)
                    || c.entry.providers.contains(&wanted)
            })
            .map(|c| self.item(c.entry.pkg_id.clone()))
            .collect()
    }

    fn query_id(&self, pkg_id: &str) -> Option<RegistryItem<'_>> {
        self.candidates.get(pkg_id).map(|_| self.item(pkg_id))
    }

    fn dependencies(&self, pkg_id: &str) -> Vec<Dependency> {
        self.candidates
            .get(pkg_id)
            .map(|c| c.entry.dependencies.clone())
            .unwrap_or_default()
    }

    fn providers(&self, pkg_id: &str) -> Vec<Provider> {
        self.candidates
            .get(pkg_id)
            .map(|c| c.entry.providers.clone())
            .unwrap_or_default()
    }

    fn info(&self, pkg_id: &str) -> ItemInfo {
        self.candidates
            .get(pkg_id)
            .map(|c| c.entry.info())
            .unwrap_or_default()
    }

    fn list(&self, flags: ItemFlags) -> Vec<RegistryItem<'_>> {
        if !ItemFlags::AVAILABLE.matches(flags) {
            return Vec::new();
        }
        self.candidates
            .keys()
            .map(|id| self.item(id.clone()))
            .collect()
    }

    /// Stage the local stone through the cache pool like any other fetch
    fn fetch_item(&self, ctx: &mut FetchContext, pkg_id: &str) -> Result<()> {
        let candidate = self
            .candidates
            .get(pkg_id)
            .ok_or_else(|| Error::NotFound(format!("{pkg_id} is not side-loaded")))?;

        let key = candidate
            .entry
            .hash
            .clone()
            .unwrap_or_else(|| pkg_id.to_string());
        ctx.enqueue(Fetchable {
            url: format!("file://{}", candidate.path.display()),
            destination: self.pool.staging_path(&key),
            expected_size: None,
            expected_hash: candidate.entry.hash.clone(),
            on_complete: None,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.candidates.clear();
    }
}
