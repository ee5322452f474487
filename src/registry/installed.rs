// src/registry/installed.rs

//! Installed-set plugin
//!
//! A MetaDB reflecting the packages present in the active state. Items are
//! flagged both installed and available: an installed package remains a
//! valid selection candidate, which lets resolvers prefer it over remote
//! copies of the same pkgID.

use crate::db::{ItemInfo, MetaDb, MetaEntry, Mutability};
use crate::dependency::{Dependency, Kind, Provider};
use crate::error::Result;
use crate::fetch::FetchContext;
use crate::installation::Installation;
use crate::registry::{ItemFlags, Plugin, RegistryItem};
use tracing::debug;

/// Plugin over the installed-package catalog
pub struct InstalledPlugin {
    db: MetaDb,
}

impl InstalledPlugin {
    pub fn new(installation: &Installation) -> Result<Self> {
        let db = MetaDb::connect(installation.meta_db_path(), Mutability::ReadWrite)?;
        Ok(Self { db })
    }

    /// Track a newly installed package
    pub fn record(&mut self, entry: &MetaEntry) -> Result<()> {
        self.db.record(entry)
    }

    /// Forget a removed package
    pub fn remove(&mut self, pkg_id: &str) -> Result<()> {
        self.db.remove(pkg_id)
    }

    fn item(&self, pkg_id: impl Into<String>) -> RegistryItem<'_> {
        RegistryItem::new(pkg_id, self, ItemFlags::INSTALLED | ItemFlags::AVAILABLE)
    }
}

impl Plugin for InstalledPlugin {
    fn id(&self) -> &str {
        "installed"
    }

    fn query_providers(
        &self,
        kind: Kind,
        matcher: &str,
        flags: ItemFlags,
    ) -> Vec<RegistryItem<'_>> {
        if !(ItemFlags::INSTALLED | ItemFlags::AVAILABLE).matches(flags) {
            return Vec::new();
        }
        self.db
            .by_provider(kind, matcher)
            .unwrap_or_default()
            .into_iter()
            .map(|id| self.item(id))
            .collect()
    }

    fn query_id(&self, pkg_id: &str) -> Option<RegistryItem<'_>> {
        match self.db.has_id(pkg_id) {
            Ok(true) => Some(self.item(pkg_id)),
            _ => None,
        }
    }

    fn dependencies(&self, pkg_id: &str) -> Vec<Dependency> {
        self.db
            .get(pkg_id)
            .ok()
            .flatten()
            .map(|e| e.dependencies)
            .unwrap_or_default()
    }

    fn providers(&self, pkg_id: &str) -> Vec<Provider> {
        self.db
            .get(pkg_id)
            .ok()
            .flatten()
            .map(|e| e.providers)
            .unwrap_or_default()
    }

    fn info(&self, pkg_id: &str) -> ItemInfo {
        self.db.info(pkg_id)
    }

    fn list(&self, flags: ItemFlags) -> Vec<RegistryItem<'_>> {
        if !(ItemFlags::INSTALLED | ItemFlags::AVAILABLE).matches(flags) {
            return Vec::new();
        }
        self.db
            .list()
            .unwrap_or_default()
            .into_iter()
            .map(|e| self.item(e.pkg_id))
            .collect()
    }

    /// Installed packages are already local; nothing to enqueue
    fn fetch_item(&self, _ctx: &mut FetchContext, pkg_id: &str) -> Result<()> {
        debug!("{pkg_id} is already installed, skipping fetch");
        Ok(())
    }

    fn close(&mut self) {
        self.db.close();
    }
}
