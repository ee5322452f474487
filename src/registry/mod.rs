// src/registry/mod.rs

//! Unified package registry
//!
//! The registry federates an ordered list of plugin sources (installed set,
//! remote repositories, side-loaded stones) behind one query surface. Query
//! results carry their originating plugin so callers keep provenance; the
//! registry itself never collapses duplicates. Downstream resolvers dedupe
//! by pkgID with their own policy.

mod cobble;
mod installed;
mod remote;

pub use cobble::{CobblePlugin, PackageCandidate};
pub use installed::InstalledPlugin;
pub use remote::RemotePlugin;

use crate::db::ItemInfo;
use crate::dependency::{Dependency, Kind, Provider};
use crate::error::Result;
use crate::fetch::FetchContext;
use tracing::debug;

/// Item capability bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFlags(u32);

impl ItemFlags {
    pub const NONE: ItemFlags = ItemFlags(0);
    /// Candidate for selection
    pub const AVAILABLE: ItemFlags = ItemFlags(1 << 0);
    /// Present in the active state
    pub const INSTALLED: ItemFlags = ItemFlags(1 << 1);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ItemFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether an item with these flags satisfies a query filter.
    /// `NONE` matches everything.
    pub fn matches(self, query: ItemFlags) -> bool {
        query == ItemFlags::NONE || self.0 & query.0 != 0
    }
}

impl std::ops::BitOr for ItemFlags {
    type Output = ItemFlags;

    fn bitor(self, rhs: ItemFlags) -> ItemFlags {
        ItemFlags(self.0 | rhs.0)
    }
}

/// Transient query result: a package candidate plus its source plugin
///
/// Items borrow their plugin, so the registry (or plugin) must outlive any
/// result set held by a caller.
#[derive(Clone)]
pub struct RegistryItem<'a> {
    pub pkg_id: String,
    pub plugin: &'a dyn Plugin,
    pub flags: ItemFlags,
}

impl<'a> RegistryItem<'a> {
    pub fn new(pkg_id: impl Into<String>, plugin: &'a dyn Plugin, flags: ItemFlags) -> Self {
        Self {
            pkg_id: pkg_id.into(),
            plugin,
            flags,
        }
    }

    /// Display projection, resolved through the owning plugin
    pub fn info(&self) -> ItemInfo {
        self.plugin.info(&self.pkg_id)
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        self.plugin.dependencies(&self.pkg_id)
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.plugin.providers(&self.pkg_id)
    }

    pub fn installed(&self) -> bool {
        self.flags.contains(ItemFlags::INSTALLED)
    }
}

impl std::fmt::Debug for RegistryItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryItem")
            .field("pkg_id", &self.pkg_id)
            .field("plugin", &self.plugin.id())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Capability interface for one package source
///
/// Query methods never fail: a source that cannot answer returns an empty
/// sequence. Only `fetch_item` is fallible, because a malformed catalog
/// entry there is fatal for the caller.
pub trait Plugin {
    /// Stable identifier used for provenance and logging
    fn id(&self) -> &str;

    /// Candidates providing `(kind, matcher)`, filtered by `flags`
    fn query_providers(&self, kind: Kind, matcher: &str, flags: ItemFlags)
        -> Vec<RegistryItem<'_>>;

    /// Point lookup by pkgID
    fn query_id(&self, pkg_id: &str) -> Option<RegistryItem<'_>>;

    fn dependencies(&self, pkg_id: &str) -> Vec<Dependency>;

    fn providers(&self, pkg_id: &str) -> Vec<Provider>;

    fn info(&self, pkg_id: &str) -> ItemInfo;

    /// Everything this source knows, filtered by `flags`
    fn list(&self, flags: ItemFlags) -> Vec<RegistryItem<'_>>;

    /// Enqueue the work needed to make `pkg_id` locally available
    fn fetch_item(&self, ctx: &mut FetchContext, pkg_id: &str) -> Result<()>;

    fn close(&mut self);
}

/// Ordered federation of plugins
#[derive(Default)]
pub struct Registry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; registration order is query order
    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        debug!("registered plugin '{}'", plugin.id());
        self.plugins.push(plugin);
    }

    pub fn plugins(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins.iter().map(|p| p.as_ref())
    }

    /// All candidates named `name`, in plugin registration order.
    /// Duplicate pkgIDs are preserved along with their provenance.
    pub fn by_name(&self, name: &str) -> Vec<RegistryItem<'_>> {
        self.plugins
            .iter()
            .flat_map(|p| p.query_providers(Kind::PackageName, name, ItemFlags::AVAILABLE))
            .collect()
    }

    /// First plugin's answer for a pkgID; evaluation short-circuits
    pub fn by_id(&self, pkg_id: &str) -> Option<RegistryItem<'_>> {
        self.plugins.iter().find_map(|p| p.query_id(pkg_id))
    }

    /// All candidates providing `(kind, matcher)`, in registration order
    pub fn by_provider(&self, kind: Kind, matcher: &str) -> Vec<RegistryItem<'_>> {
        self.plugins
            .iter()
            .flat_map(|p| p.query_providers(kind, matcher, ItemFlags::AVAILABLE))
            .collect()
    }

    /// Everything all plugins know, filtered by `flags`
    pub fn list(&self, flags: ItemFlags) -> Vec<RegistryItem<'_>> {
        self.plugins.iter().flat_map(|p| p.list(flags)).collect()
    }

    /// Close each plugin in registration order
    pub fn close(&mut self) {
        for plugin in &mut self.plugins {
            plugin.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_matching() {
        let installed = ItemFlags::INSTALLED | ItemFlags::AVAILABLE;
        assert!(installed.matches(ItemFlags::AVAILABLE));
        assert!(installed.matches(ItemFlags::INSTALLED));
        assert!(installed.matches(ItemFlags::NONE));
        assert!(!ItemFlags::AVAILABLE.matches(ItemFlags::INSTALLED));
    }

    #[test]
    fn test_contains() {
        let both = ItemFlags::INSTALLED | ItemFlags::AVAILABLE;
        assert!(both.contains(ItemFlags::INSTALLED));
        assert!(!ItemFlags::AVAILABLE.contains(both));
    }
}
