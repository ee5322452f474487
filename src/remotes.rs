// src/remotes.rs

//! Persisted remote list
//!
//! Remotes are seeded via the CLI and stored as a small JSON file under the
//! installation root. Higher priority remotes register (and therefore
//! answer queries) first.

use crate::error::{Error, Result};
use crate::installation::Installation;
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::info;

/// One configured remote repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    /// Location of the remote's `stone.index`
    pub uri: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: u32,
}

fn default_enabled() -> bool {
    true
}

/// Load the remote list; an absent config file means no remotes
pub fn load(installation: &Installation) -> Result<Vec<Remote>> {
    let path = installation.repos_config_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read(&path)
        .map_err(|e| Error::IoError(format!("read {}: {e}", path.display())))?;
    let mut remotes: Vec<Remote> = serde_json::from_slice(&data)?;
    remotes.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));
    Ok(remotes)
}

fn save(installation: &Installation, remotes: &[Remote]) -> Result<()> {
    let path = installation.repos_config_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::IoError(format!("create {}: {e}", parent.display())))?;
    }
    let data = serde_json::to_vec_pretty(remotes)?;
    fs::write(&path, data)
        .map_err(|e| Error::IoError(format!("write {}: {e}", path.display())))?;
    Ok(())
}

/// Add a remote; names are unique
pub fn add(installation: &Installation, name: &str, uri: &str, priority: u32) -> Result<Remote> {
    let mut remotes = load(installation)?;
    if remotes.iter().any(|r| r.name == name) {
        return Err(Error::AlreadyExists(format!("remote '{name}'")));
    }
    let remote = Remote {
        name: name.to_string(),
        uri: uri.to_string(),
        enabled: true,
        priority,
    };
    remotes.push(remote.clone());
    save(installation, &remotes)?;
    info!("added remote '{name}' -> {uri}");
    Ok(remote)
}

/// Remove a remote by name
pub fn remove(installation: &Installation, name: &str) -> Result<()> {
    let mut remotes = load(installation)?;
    let before = remotes.len();
    remotes.retain(|r| r.name != name);
    if remotes.len() == before {
        return Err(Error::NotFound(format!("remote '{name}'")));
    }
    save(installation, &remotes)?;
    info!("removed remote '{name}'");
    Ok(())
}
