// src/registry/remote.rs

//! Remote repository plugin
//!
//! Wraps the per-remote MetaDB. `refresh` enqueues one fetch of the remote's
//! `stone.index`; the completion callback (controller thread) closes and
//! reopens the catalog, then reloads it from the fetched file. `fetch_item`
//! resolves a package's download URI relative to the index URI and targets
//! the cache pool's staging path.

use crate::cache::CachePool;
use crate::db::{ItemInfo, MetaDb, Mutability};
use crate::dependency::{Dependency, Kind, Provider};
use crate::error::{Error, Result};
use crate::fetch::{FetchContext, Fetchable};
use crate::installation::Installation;
use crate::registry::{ItemFlags, Plugin, RegistryItem};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

/// Close, reopen, and atomically repopulate a remote catalog
fn reload(db: &RefCell<MetaDb>, db_path: &Path, index: &Path) -> Result<usize> {
    let mut db = db.borrow_mut();
    db.close();
    *db = MetaDb::connect(db_path, Mutability::ReadWrite)?;
    db.load_from_index(index)
}

/// A named remote repository backed by its own MetaDB
pub struct RemotePlugin {
    name: String,
    uri: String,
    db: Rc<RefCell<MetaDb>>,
    db_path: PathBuf,
    index_path: PathBuf,
    pool: CachePool,
}

impl RemotePlugin {
    /// Open (creating if necessary) the catalog for `name`
    pub fn new(name: &str, uri: &str, installation: &Installation) -> Result<Self> {
        let db_path = installation.remote_db_path(name);
        let db = MetaDb::connect(&db_path, Mutability::ReadWrite)?;
        Ok(Self {
            name: name.to_string(),
            uri: uri.to_string(),
            db: Rc::new(RefCell::new(db)),
            db_path,
            index_path: installation.remote_index_path(name),
            pool: CachePool::new(installation),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Number of catalogued packages
    pub fn package_count(&self) -> usize {
        self.db.borrow().list().map(|l| l.len()).unwrap_or(0)
    }

    /// Enqueue an index refresh
    ///
    /// The callback reopens the MetaDB and atomically replaces its contents
    /// from the downloaded index. A failed load leaves the catalog empty and
    /// closed; the next refresh reopens it.
    pub fn refresh(&self, ctx: &mut FetchContext) {
        let db = Rc::clone(&self.db);
        let db_path = self.db_path.clone();
        let name = self.name.clone();
        info!("refreshing remote '{name}' from {}", self.uri);

        ctx.enqueue(Fetchable {
            url: self.uri.clone(),
            destination: self.index_path.clone(),
            expected_size: None,
            expected_hash: None,
            on_complete: Some(Box::new(move |index| {
                let count = reload(&db, &db_path, index)?;
                info!("remote '{name}' now carries {count} packages");
                Ok(())
            })),
        });
    }

    /// Rebuild the catalog from an already-local index file
    pub fn load_index(&self, index: &Path) -> Result<usize> {
        reload(&self.db, &self.db_path, index)
    }

    /// Download URI for a package, relative to the index location
    fn package_uri(&self, relative: &str) -> String {
        let base = self
            .uri
            .rsplit_once('/')
            .map(|(base, _)| base)
            .unwrap_or(self.uri.as_str());
        format!("{base}/{relative}")
    }

    fn item(&self, pkg_id: impl Into<String>) -> RegistryItem<'_> {
        RegistryItem::new(pkg_id, self, ItemFlags::AVAILABLE)
    }
}

impl Plugin for RemotePlugin {
    fn id(&self) -> &str {
        &self.name
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
        self.db
            .borrow()
            .by_provider(kind, matcher)
            .unwrap_or_default()
            .into_iter()
            .map(|id| self.item(id))
            .collect()
    }

    fn query_id(&self, pkg_id: &str) -> Option<RegistryItem<'_>> {
        match self.db.borrow().has_id(pkg_id) {
            Ok(true) => Some(self.item(pkg_id)),
            _ => None,
        }
    }

    fn dependencies(&self, pkg_id: &str) -> Vec<Dependency> {
        self.db
            .borrow()
            .get(pkg_id)
            .ok()
            .flatten()
            .map(|e| e.dependencies)
            .unwrap_or_default()
    }

    fn providers(&self, pkg_id: &str) -> Vec<Provider> {
        self.db
            .borrow()
            .get(pkg_id)
            .ok()
            .flatten()
            .map(|e| e.providers)
            .unwrap_or_default()
    }

    fn info(&self, pkg_id: &str) -> ItemInfo {
        self.db.borrow().info(pkg_id)
    }

    fn list(&self, flags: ItemFlags) -> Vec<RegistryItem<'_>> {
        if !ItemFlags::AVAILABLE.matches(flags) {
            return Vec::new();
        }
        self.db
            .borrow()
            .list()
            .unwrap_or_default()
            .into_iter()
            .map(|e| self.item(e.pkg_id))
            .collect()
    }

    /// Enqueue the package download into the cache pool's staging area
    ///
    /// The catalog entry must carry a `.stone` URI, a non-empty hash, and a
    /// positive size; anything less is a malformed entry and fatal.
    fn fetch_item(&self, ctx: &mut FetchContext, pkg_id: &str) -> Result<()> {
        let entry = self
            .db
            .borrow()
            .get(pkg_id)?
            .ok_or_else(|| Error::NotFound(format!("{pkg_id} not in remote '{}'", self.name)))?;

        let relative = entry.uri.as_deref().unwrap_or_default();
        if relative.is_empty() {
            return Err(Error::MalformedEntry(format!(
                "{} has no download uri",
                entry.name
            )));
        }
        let pkg_uri = self.package_uri(relative);
        if !pkg_uri.ends_with(".stone") {
            return Err(Error::MalformedEntry(format!(
                "{} download uri '{pkg_uri}' is not a stone",
                entry.name
            )));
        }

        let hash = entry.hash.as_deref().unwrap_or_default();
        if hash.is_empty() {
            return Err(Error::MalformedEntry(format!(
                "{} has no content hash",
                entry.name
            )));
        }

        let expected_size = entry.download_size.unwrap_or_default();
        if expected_size == 0 {
            return Err(Error::MalformedEntry(format!(
                "{} has no download size",
                entry.name
            )));
        }

        debug!("queueing {} from {pkg_uri}", entry.name);
        ctx.enqueue(Fetchable {
            url: pkg_uri,
            destination: self.pool.staging_path(hash),
            expected_size: Some(expected_size),
            expected_hash: Some(hash.to_string()),
            on_complete: None,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.db.borrow_mut().close();
    }
}
