// src/db/state.rs

//! Installation state history
//!
//! States are append-only transactional snapshots of what is selected on a
//! system. The `states` keyspace maps a big-endian u64 state ID to its
//! record; `selections` maps the composite key `stateID ++ identifier` to a
//! fixed-layout binary entry. State IDs are never reused: rollback creates a
//! new state mirroring an old one rather than reopening it.

use crate::db::{self, Mutability};
use crate::error::{Error, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const STATES_TABLE: &str = "states";
const SELECTIONS_TABLE: &str = "selections";

/// Why a state came into being
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    /// Ordinary install/remove transaction
    Transaction,
    /// Explicit user snapshot
    Snapshot,
    /// Created by automation
    Automatic,
}

impl std::fmt::Display for StateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StateType::Transaction => "transaction",
            StateType::Snapshot => "snapshot",
            StateType::Automatic => "automatic",
        };
        write!(f, "{name}")
    }
}

/// One record in the state history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub state_type: StateType,
    /// Seconds since epoch
    pub timestamp: u64,
}

impl StateRecord {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn table_name() -> &'static str {
        STATES_TABLE
    }
}

/// Whether a selection tracks a source or binary package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionType {
    Source,
    Binary,
}

impl SelectionType {
    pub fn to_wire(self) -> u8 {
        match self {
            SelectionType::Source => 0,
            SelectionType::Binary => 1,
        }
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(SelectionType::Source),
            1 => Ok(SelectionType::Binary),
            other => Err(Error::Corrupt(format!("unknown selection type {other}"))),
        }
    }
}

/// Policy bitmask attached to a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionFlags(u32);

impl SelectionFlags {
    pub const DEFAULT_POLICY: SelectionFlags = SelectionFlags(1 << 0);
    pub const USER_INSTALLED: SelectionFlags = SelectionFlags(1 << 1);
    pub const DEP_INSTALLED: SelectionFlags = SelectionFlags(1 << 2);
    pub const HOLD: SelectionFlags = SelectionFlags(1 << 3);
    pub const PREFER_SOURCE: SelectionFlags = SelectionFlags(1 << 4);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(self, other: SelectionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Exactly one of user-installed / dep-installed must be set
    pub fn validate(self) -> Result<()> {
        let user = self.contains(Self::USER_INSTALLED);
        let dep = self.contains(Self::DEP_INSTALLED);
        if user == dep {
            return Err(Error::MalformedEntry(
                "selection flags need exactly one of user-installed or dep-installed".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::ops::BitOr for SelectionFlags {
    type Output = SelectionFlags;

    fn bitor(self, rhs: SelectionFlags) -> SelectionFlags {
        SelectionFlags(self.0 | rhs.0)
    }
}

/// Fixed header length of the selection wire format
const ENTRY_HEADER_SIZE: usize = 16;

/// One selection within a state
///
/// Wire format: 16-byte header (stateID u64, idLen u16 including the
/// trailing NUL, flags u32, type u8, reserved u8, all big-endian) followed
/// by the NUL-terminated identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub state_id: u64,
    pub identifier: String,
    pub selection: SelectionType,
    pub flags: SelectionFlags,
}

impl StateEntry {
    pub fn encode(&self) -> Vec<u8> {
        let id_bytes = self.identifier.as_bytes();
        let mut out = Vec::with_capacity(ENTRY_HEADER_SIZE + id_bytes.len() + 1);
        out.extend_from_slice(&self.state_id.to_be_bytes());
        out.extend_from_slice(&((id_bytes.len() + 1) as u16).to_be_bytes());
        out.extend_from_slice(&self.flags.bits().to_be_bytes());
        out.push(self.selection.to_wire());
        out.push(0);
        out.extend_from_slice(id_bytes);
        out.push(0);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTRY_HEADER_SIZE + 1 {
            return Err(Error::Corrupt(format!(
                "state entry too short ({} bytes)",
                bytes.len()
            )));
        }

        let state_id = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let id_len = u16::from_be_bytes([bytes[8], bytes[9]]) as usize;
        let flags = SelectionFlags::from_bits(u32::from_be_bytes(bytes[10..14].try_into().unwrap()));
        let selection = SelectionType::from_wire(bytes[14])?;
        if bytes[15] != 0 {
            return Err(Error::Corrupt(format!(
                "state entry reserved byte is {}",
                bytes[15]
            )));
        }

        if bytes.len() != ENTRY_HEADER_SIZE + id_len {
            return Err(Error::Corrupt(format!(
                "state entry identifier length {id_len} does not match {} trailing bytes",
                bytes.len() - ENTRY_HEADER_SIZE
            )));
        }
        let trailing = &bytes[ENTRY_HEADER_SIZE..];
        if trailing.last() != Some(&0) {
            return Err(Error::Corrupt(
                "state entry identifier is not NUL-terminated".to_string(),
            ));
        }
        let identifier = std::str::from_utf8(&trailing[..trailing.len() - 1])
            .map_err(|_| Error::Corrupt("state entry identifier is not UTF-8".to_string()))?
            .to_string();

        Ok(Self {
            state_id,
            identifier,
            selection,
            flags,
        })
    }
}

fn selection_key(state_id: u64, identifier: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + identifier.len());
    key.extend_from_slice(&state_id.to_be_bytes());
    key.extend_from_slice(identifier.as_bytes());
    key
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Append-only history of installation states
pub struct StateDb {
    path: PathBuf,
    conn: Option<Connection>,
}

impl StateDb {
    pub fn connect(path: impl Into<PathBuf>, mutability: Mutability) -> Result<Self> {
        let path = path.into();
        let conn = db::open(&path, mutability)?;
        if mutability == Mutability::ReadWrite {
            db::ensure_keyspace(&conn, STATES_TABLE)?;
            db::ensure_keyspace(&conn, SELECTIONS_TABLE)?;
        }
        Ok(Self {
            path,
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

    /// Allocate the next state ID and persist its record
    pub fn new_state(
        &mut self,
        name: &str,
        description: &str,
        state_type: StateType,
    ) -> Result<u64> {
        self.new_state_with(name, description, state_type, &[])
    }

    /// Allocate a state together with its initial selections in one
    /// transaction; the entries become visible iff the record does
    pub fn new_state_with(
        &mut self,
        name: &str,
        description: &str,
        state_type: StateType,
        selections: &[(String, SelectionType, SelectionFlags)],
    ) -> Result<u64> {
        for (_, _, flags) in selections {
            flags.validate()?;
        }

        let record_name = name.to_string();
        let record_description = description.to_string();
        let conn = self.conn_mut()?;
        let id = db::transaction(conn, |tx| {
            let id = match db::max_key(tx, STATES_TABLE)? {
                Some(key) => {
                    let bytes: [u8; 8] = key.as_slice().try_into().map_err(|_| {
                        Error::Corrupt(format!("state key is {} bytes, expected 8", key.len()))
                    })?;
                    u64::from_be_bytes(bytes) + 1
                }
                None => 1,
            };

            let record = StateRecord {
                id,
                name: record_name.clone(),
                description: record_description.clone(),
                state_type,
                timestamp: unix_now(),
            };
            db::put(tx, STATES_TABLE, &id.to_be_bytes(), &record.encode()?)?;

            for (identifier, selection, flags) in selections {
                let entry = StateEntry {
                    state_id: id,
                    identifier: identifier.clone(),
                    selection: *selection,
                    flags: *flags,
                };
                db::put(
                    tx,
                    SELECTIONS_TABLE,
                    &selection_key(id, identifier),
                    &entry.encode(),
                )?;
            }

            Ok(id)
        })?;

        debug!("created state {id} ('{name}', {state_type})");
        Ok(id)
    }

    /// Upsert a selection; a second write for the same `(state, identifier)`
    /// replaces the first
    pub fn mark_selection(
        &mut self,
        state_id: u64,
        identifier: &str,
        selection: SelectionType,
        flags: SelectionFlags,
    ) -> Result<()> {
        flags.validate()?;
        if self.state(state_id)?.is_none() {
            return Err(Error::NotFound(format!("state {state_id} does not exist")));
        }

        let entry = StateEntry {
            state_id,
            identifier: identifier.to_string(),
            selection,
            flags,
        };
        let conn = self.conn_mut()?;
        db::transaction(conn, |tx| {
            db::put(
                tx,
                SELECTIONS_TABLE,
                &selection_key(state_id, identifier),
                &entry.encode(),
            )
        })
    }

    /// Delete a selection by composite key
    pub fn unmark_selection(&mut self, state_id: u64, identifier: &str) -> Result<()> {
        let conn = self.conn_mut()?;
        db::transaction(conn, |tx| {
            db::delete(tx, SELECTIONS_TABLE, &selection_key(state_id, identifier))
        })
    }

    /// All selections belonging to a state, in identifier order
    pub fn entries(&self, state_id: u64) -> Result<Vec<StateEntry>> {
        let lo = state_id.to_be_bytes();
        let hi = state_id.checked_add(1).map(u64::to_be_bytes);
        db::scan_range(self.conn()?, SELECTIONS_TABLE, &lo, hi.as_ref().map(|h| &h[..]))?
            .into_iter()
            .map(|(_, value)| StateEntry::decode(&value))
            .collect()
    }

    /// Fetch one state record
    pub fn state(&self, state_id: u64) -> Result<Option<StateRecord>> {
        match db::get(self.conn()?, STATES_TABLE, &state_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(StateRecord::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All state records, oldest first
    pub fn states(&self) -> Result<Vec<StateRecord>> {
        db::scan(self.conn()?, STATES_TABLE)?
            .into_iter()
            .map(|(_, value)| StateRecord::decode(&value))
            .collect()
    }

    /// The greatest state ID, or `None` when the history is empty.
    /// "What is installed" resolves through this state's entries.
    pub fn active_state(&self) -> Result<Option<u64>> {
        match db::max_key(self.conn()?, STATES_TABLE)? {
            Some(key) => {
                let bytes: [u8; 8] = key.as_slice().try_into().map_err(|_| {
                    Error::Corrupt(format!("state key is {} bytes, expected 8", key.len()))
                })?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
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
