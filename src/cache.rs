// src/cache.rs

//! Content-addressed download cache
//!
//! Blobs land in a staging area keyed by hash, then move to their final
//! fan-out location with one atomic rename once verified.

use crate::error::{Error, Result};
use crate::installation::Installation;
use std::fs;
use std::path::PathBuf;

/// Staging/final path derivation for downloaded blobs
#[derive(Debug, Clone)]
pub struct CachePool {
    root: PathBuf,
}

impl CachePool {
    pub fn new(installation: &Installation) -> Self {
        Self {
            root: installation.cache_dir(),
        }
    }

    /// Where a blob is downloaded before verification
    pub fn staging_path(&self, hash: &str) -> PathBuf {
        self.root.join("staging").join(hash)
    }

    /// Final fan-out location for a verified blob
    pub fn final_path(&self, hash: &str) -> PathBuf {
        if hash.len() < 5 {
            return self.root.join(hash);
        }
        self.root.join(&hash[0..2]).join(&hash[2..4]).join(hash)
    }

    /// Whether a verified blob is already present
    pub fn contains(&self, hash: &str) -> bool {
        self.final_path(hash).exists()
    }

    /// Atomically move a staged blob to its final location
    pub fn promote(&self, hash: &str) -> Result<PathBuf> {
        let staging = self.staging_path(hash);
        if !staging.exists() {
            return Err(Error::NotFound(format!(
                "no staged blob for hash {hash}"
            )));
        }
        let target = self.final_path(hash);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::IoError(format!("create {}: {e}", parent.display())))?;
        }
        fs::rename(&staging, &target).map_err(|e| {
            Error::IoError(format!(
                "promote {} to {}: {e}",
                staging.display(),
                target.display()
            ))
        })?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> (tempfile::TempDir, CachePool) {
        let temp = tempfile::tempdir().unwrap();
        let inst = Installation::new(temp.path());
        (temp, CachePool::new(&inst))
    }

    #[test]
    fn test_path_fanout() {
        let (_temp, pool) = pool();
        let final_path = pool.final_path("abcdef123456");
        assert!(final_path.ends_with("ab/cd/abcdef123456"));
    }

    #[test]
    fn test_short_hash_stays_flat() {
        let (_temp, pool) = pool();
        assert!(pool.final_path("abc").ends_with("abc"));
    }

    #[test]
    fn test_promote() {
        let (_temp, pool) = pool();
        let staging = pool.staging_path("cafebabe");
        fs::create_dir_all(staging.parent().unwrap()).unwrap();
        fs::write(&staging, b"blob").unwrap();

        let target = pool.promote("cafebabe").unwrap();
        assert!(pool.contains("cafebabe"));
        assert!(!staging.exists());
        assert_eq!(fs::read(target).unwrap(), b"blob");
    }

    #[test]
    fn test_promote_missing_blob() {
        let (_temp, pool) = pool();
        assert!(matches!(
            pool.promote("feedface").unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
