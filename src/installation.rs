// src/installation.rs

//! Root-anchored path derivation for moss directories
//!
//! An `Installation` pins every on-disk location to a single runtime root
//! (defaults to `/`). It is passed by reference through constructors instead
//! of living in process-wide state.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Derived paths for one installation root
#[derive(Debug, Clone)]
pub struct Installation {
    root: PathBuf,
}

impl Installation {
    /// Create an installation anchored at the given root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The installation root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Database directory shared by the installed catalog and state history
    pub fn db_dir(&self) -> PathBuf {
        self.root.join("var/lib/moss/db")
    }

    /// Catalog of currently-installed packages
    pub fn meta_db_path(&self) -> PathBuf {
        self.db_dir().join("meta.db")
    }

    /// Append-only state history
    pub fn state_db_path(&self) -> PathBuf {
        self.db_dir().join("state.db")
    }

    /// Parent directory for all per-remote storage
    pub fn remotes_dir(&self) -> PathBuf {
        self.root.join("var/lib/moss/remotes")
    }

    /// Per-remote metadata catalog
    pub fn remote_db_path(&self, remote: &str) -> PathBuf {
        self.remotes_dir().join(remote).join("db")
    }

    /// Last-fetched index file for a remote
    pub fn remote_index_path(&self, remote: &str) -> PathBuf {
        self.remotes_dir().join(remote).join("cache/stone.index")
    }

    /// Content-addressed download cache
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("var/cache/moss/downloads")
    }

    /// Persisted remote list
    pub fn repos_config_path(&self) -> PathBuf {
        self.root.join("etc/moss/repos.json")
    }

    /// Create the directory skeleton for this installation
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.db_dir(),
            self.remotes_dir(),
            self.cache_dir(),
            self.root.join("etc/moss"),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl Default for Installation {
    fn default() -> Self {
        Self::new("/")
    }
}
