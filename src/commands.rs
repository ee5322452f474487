// src/commands.rs
//! Command handlers for the moss CLI

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use moss::registry::{CobblePlugin, InstalledPlugin, ItemFlags, Registry, RegistryItem, RemotePlugin};
use moss::stone::{PayloadType, StoneReader};
use moss::{remotes, Error, FetchContext, Installation, Mutability, Provider, StateDb};
use std::path::Path;
use tracing::info;

/// Assemble the registry: installed set first, then remotes by priority
fn build_registry(installation: &Installation) -> Result<Registry> {
    installation.ensure_directories()?;

    let mut registry = Registry::new();
    registry.add_plugin(Box::new(InstalledPlugin::new(installation)?));

    for remote in remotes::load(installation)? {
        if !remote.enabled {
            continue;
        }
        registry.add_plugin(Box::new(RemotePlugin::new(
            &remote.name,
            &remote.uri,
            installation,
        )?));
    }

    Ok(registry)
}

/// Add a remote repository
pub fn cmd_repo_add(root: &str, name: &str, uri: &str, priority: u32) -> Result<()> {
    let installation = Installation::new(root);
    installation.ensure_directories()?;
    remotes::add(&installation, name, uri, priority)?;
    println!("Added remote '{name}' ({uri})");
    Ok(())
}

/// List configured remotes
pub fn cmd_repo_list(root: &str) -> Result<()> {
    let installation = Installation::new(root);
    let remotes = remotes::load(&installation)?;
    if remotes.is_empty() {
        println!("No remotes configured");
        return Ok(());
    }
    for remote in remotes {
        let state = if remote.enabled { "enabled" } else { "disabled" };
        println!(
            "{:<20} {:<10} prio {:<4} {}",
            remote.name, state, remote.priority, remote.uri
        );
    }
    Ok(())
}

/// Remove a remote repository
pub fn cmd_repo_remove(root: &str, name: &str) -> Result<()> {
    let installation = Installation::new(root);
    remotes::remove(&installation, name)?;
    println!("Removed remote '{name}'");
    Ok(())
}

/// Refresh one or all remotes
///
/// Each remote reports success or failure on its own line; the command
/// exits non-zero only when every remote failed.
pub fn cmd_refresh(root: &str, name: Option<&str>) -> Result<()> {
    let installation = Installation::new(root);
    installation.ensure_directories()?;

    let mut selected = remotes::load(&installation)?;
    selected.retain(|r| r.enabled && name.map_or(true, |n| r.name == n));
    if selected.is_empty() {
        match name {
            Some(n) => bail!("no enabled remote named '{n}'"),
            None => {
                println!("No remotes configured");
                return Ok(());
            }
        }
    }

    let plugins = selected
        .iter()
        .map(|r| RemotePlugin::new(&r.name, &r.uri, &installation))
        .collect::<moss::Result<Vec<_>>>()?;

    let mut ctx = FetchContext::new();
    for plugin in &plugins {
        plugin.refresh(&mut ctx);
    }
    let results = ctx.run();

    let mut failures = 0;
    for (remote, result) in selected.iter().zip(&results) {
        match &result.outcome {
            Ok(()) => println!("Updated remote '{}'", remote.name),
            Err(e) => {
                failures += 1;
                eprintln!("Failed to update remote '{}': {e}", remote.name);
            }
        }
    }

    if failures == results.len() {
        bail!("all {failures} remote(s) failed to refresh");
    }
    Ok(())
}

/// List packages known to the registry
pub fn cmd_list(root: &str, installed: bool) -> Result<()> {
    let installation = Installation::new(root);
    let registry = build_registry(&installation)?;

    let flags = if installed {
        ItemFlags::INSTALLED
    } else {
        ItemFlags::AVAILABLE
    };

    let mut rows: Vec<(String, String, String)> = registry
        .list(flags)
        .iter()
        .map(|item| {
            let info = item.info();
            (
                info.name,
                format!("{}-{}", info.version, info.source_release),
                info.summary,
            )
        })
        .collect();
    rows.sort();
    rows.dedup();

    if rows.is_empty() {
        println!("No packages found");
        return Ok(());
    }
    for (name, version, summary) in rows {
        println!("{name:<30} {version:<16} {summary}");
    }
    Ok(())
}

fn print_item(item: &RegistryItem) {
    let info = item.info();
    println!("Name         : {}", info.name);
    println!(
        "Version      : {} (release {})",
        info.version, info.source_release
    );
    println!("Summary      : {}", info.summary);
    println!("Homepage     : {}", info.homepage);
    println!("Licenses     : {}", info.licenses.join(", "));
    println!("Source       : {}", item.plugin.id());
    let deps = item.dependencies();
    if !deps.is_empty() {
        let rendered: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
        println!("Dependencies : {}", rendered.join(", "));
    }
}

/// Show details for a package by name, or for a local `.stone` file
pub fn cmd_info(root: &str, target: &str) -> Result<()> {
    let installation = Installation::new(root);

    // Side-loaded stones resolve through the cobble plugin
    if target.ends_with(".stone") && Path::new(target).exists() {
        let mut cobble = CobblePlugin::new(&installation);
        let pkg_id = cobble.load(target)?;
        let mut registry = Registry::new();
        registry.add_plugin(Box::new(cobble));
        let item = registry
            .by_id(&pkg_id)
            .context("side-loaded package not queryable")?;
        print_item(&item);
        return Ok(());
    }

    let registry = build_registry(&installation)?;
    let items = registry.by_name(target);
    if items.is_empty() {
        bail!("no package named '{target}'");
    }
    for item in items {
        print_item(&item);
        println!();
    }
    Ok(())
}

/// Find packages providing a capability, e.g. `pkgconfig(zlib)`
pub fn cmd_provides(root: &str, spec: &str) -> Result<()> {
    let provider: Provider = spec.parse()?;
    let installation = Installation::new(root);
    let registry = build_registry(&installation)?;

    let items = registry.by_provider(provider.kind, &provider.identifier);
    if items.is_empty() {
        println!("Nothing provides {provider}");
        return Ok(());
    }
    for item in items {
        let info = item.info();
        println!(
            "{:<30} {}-{} [{}]",
            info.name,
            info.version,
            info.source_release,
            item.plugin.id()
        );
    }
    Ok(())
}

/// Print the payload table of a local stone archive
pub fn cmd_inspect(path: &str) -> Result<()> {
    let mut reader = StoneReader::open(Path::new(path))?;
    println!(
        "{path}: {} archive, format v{}, {} payload(s)",
        reader.header.file_type, reader.header.version, reader.header.num_payloads
    );

    let mut index = 0;
    while let Some(payload) = reader.next_payload()? {
        index += 1;
        let header = payload.header;
        println!(
            "  payload {index}: {} ({} records, {} -> {} bytes, {})",
            header.payload_type,
            header.num_records,
            header.stored_size,
            header.plain_size,
            header.compression
        );
        if header.payload_type == PayloadType::Meta {
            let meta = payload.meta()?;
            let entry = moss::MetaEntry::from_payload(&meta)?;
            println!(
                "    {} {}-{} ({})",
                entry.name, entry.version_identifier, entry.source_release, entry.architecture
            );
        }
    }
    Ok(())
}

/// Show the state history, newest first
pub fn cmd_history(root: &str) -> Result<()> {
    let installation = Installation::new(root);
    let db = match StateDb::connect(installation.state_db_path(), Mutability::ReadOnly) {
        Ok(db) => db,
        Err(Error::NotFound(_)) => {
            println!("No state history");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let active = db.active_state()?;
    let mut states = db.states()?;
    states.reverse();
    if states.is_empty() {
        println!("No state history");
        return Ok(());
    }

    for state in states {
        let marker = if Some(state.id) == active { "*" } else { " " };
        let when = DateTime::from_timestamp(state.timestamp as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let selections = db.entries(state.id)?.len();
        println!(
            "{marker} {:>6}  {when}  {:<12} {:<30} ({selections} selections)",
            state.id,
            state.state_type.to_string(),
            state.name
        );
    }

    info!("listed state history from {}", db.path().display());
    Ok(())
}
