// src/db/mod.rs

//! Embedded ordered key-value store
//!
//! Both catalogs sit on SQLite via rusqlite, used purely as an ordered
//! keyspace: every logical table is `(key BLOB PRIMARY KEY, value BLOB)`,
//! scans run in key (memcmp) order, and all mutation goes through
//! [`transaction`]. Entities serialize themselves with `encode`/`decode`.

pub mod meta;
pub mod state;

pub use meta::{ItemInfo, MetaDb, MetaEntry};
pub use state::{SelectionFlags, SelectionType, StateDb, StateEntry, StateRecord, StateType};

use crate::error::{Error, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Whether a store is opened for writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    ReadOnly,
    ReadWrite,
}

/// Open the store at `path`
///
/// Read-write opens create the file (and parent directories) on demand;
/// read-only opens of an absent path fail with `NotFound`.
pub fn open(path: &Path, mutability: Mutability) -> Result<Connection> {
    let conn = match mutability {
        Mutability::ReadOnly => {
            if !path.exists() {
                return Err(Error::NotFound(format!(
                    "database {} does not exist",
                    path.display()
                )));
            }
            Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .map_err(|e| Error::DatabaseError(format!("open {}: {e}", path.display())))?
        }
        Mutability::ReadWrite => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::IoError(format!("create {}: {e}", parent.display()))
                })?;
            }
            Connection::open(path)
                .map_err(|e| Error::DatabaseError(format!("open {}: {e}", path.display())))?
        }
    };

    conn.busy_timeout(Duration::from_secs(30))
        .map_err(|e| Error::DatabaseError(format!("busy_timeout: {e}")))?;
    // Single writer, many readers
    let _: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .unwrap_or_else(|_| "memory".to_string());

    debug!("opened database {} ({mutability:?})", path.display());
    Ok(conn)
}

/// Run `f` inside one write transaction; commit on `Ok`, roll back on `Err`
pub fn transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let tx = conn
        .transaction()
        .map_err(|e| Error::TransactionAborted(format!("begin: {e}")))?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()
                .map_err(|e| Error::TransactionAborted(format!("commit: {e}")))?;
            Ok(value)
        }
        Err(e) => Err(e),
    }
}

/// Create a keyspace table if absent
pub fn ensure_keyspace(conn: &Connection, table: &str) -> Result<()> {
    conn.execute(
        &format!("CREATE TABLE IF NOT EXISTS \"{table}\" (key BLOB PRIMARY KEY, value BLOB NOT NULL)"),
        [],
    )
    .map_err(|e| Error::DatabaseError(format!("create keyspace {table}: {e}")))?;
    Ok(())
}

/// Insert or replace one row
pub fn put(conn: &Connection, table: &str, key: &[u8], value: &[u8]) -> Result<()> {
    conn.execute(
        &format!("INSERT OR REPLACE INTO \"{table}\" (key, value) VALUES (?1, ?2)"),
        rusqlite::params![key, value],
    )
    .map_err(|e| Error::DatabaseError(format!("put {table}: {e}")))?;
    Ok(())
}

/// Point lookup
pub fn get(conn: &Connection, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        &format!("SELECT value FROM \"{table}\" WHERE key = ?1"),
        [key],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| Error::DatabaseError(format!("get {table}: {e}")))
}

/// Delete one row; deleting an absent key is a no-op
pub fn delete(conn: &Connection, table: &str, key: &[u8]) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM \"{table}\" WHERE key = ?1"),
        [key],
    )
    .map_err(|e| Error::DatabaseError(format!("delete {table}: {e}")))?;
    Ok(())
}

/// Full scan in ascending key order
pub fn scan(conn: &Connection, table: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut stmt = conn
        .prepare(&format!("SELECT key, value FROM \"{table}\" ORDER BY key"))
        .map_err(|e| Error::DatabaseError(format!("scan {table}: {e}")))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| Error::DatabaseError(format!("scan {table}: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::DatabaseError(format!("scan {table}: {e}")))?;
    Ok(rows)
}

/// Scan `[lo, hi)` in ascending key order; an absent `hi` means "to the end"
pub fn scan_range(
    conn: &Connection,
    table: &str,
    lo: &[u8],
    hi: Option<&[u8]>,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let map_err = |e: rusqlite::Error| Error::DatabaseError(format!("scan {table}: {e}"));
    let rows = match hi {
        Some(hi) => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT key, value FROM \"{table}\" WHERE key >= ?1 AND key < ?2 ORDER BY key"
                ))
                .map_err(map_err)?;
            let rows = stmt
                .query_map(rusqlite::params![lo, hi], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(map_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_err)?;
            rows
        }
        None => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT key, value FROM \"{table}\" WHERE key >= ?1 ORDER BY key"
                ))
                .map_err(map_err)?;
            let rows = stmt
                .query_map([lo], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(map_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_err)?;
            rows
        }
    };
    Ok(rows)
}

/// Largest key in a keyspace, or `None` when empty
pub fn max_key(conn: &Connection, table: &str) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        &format!("SELECT key FROM \"{table}\" ORDER BY key DESC LIMIT 1"),
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| Error::DatabaseError(format!("max_key {table}: {e}")))
}

/// Remove every row from a keyspace
pub fn clear(conn: &Connection, table: &str) -> Result<()> {
    conn.execute(&format!("DELETE FROM \"{table}\""), [])
        .map_err(|e| Error::DatabaseError(format!("clear {table}: {e}")))?;
    Ok(())
}

/// Row count for a keyspace
pub fn count(conn: &Connection, table: &str) -> Result<u64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n as u64)
    .map_err(|e| Error::DatabaseError(format!("count {table}: {e}")))
}
