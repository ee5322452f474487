// src/lib.rs

//! moss - source-based package manager client
//!
//! Core subsystems:
//!
//! - Stone archives: binary container parsing for packages and repository
//!   indexes
//! - MetaDB: transactional package catalog with a capability (provider)
//!   reverse index
//! - StateDB: append-only history of installation states with per-state
//!   selections
//! - Registry: federated query surface over the installed set, remote
//!   repositories, and side-loaded stones

pub mod cache;
pub mod db;
pub mod dependency;
mod error;
pub mod fetch;
pub mod installation;
pub mod registry;
pub mod remotes;
pub mod stone;

pub use cache::CachePool;
pub use db::{
    ItemInfo, MetaDb, MetaEntry, Mutability, SelectionFlags, SelectionType, StateDb, StateEntry,
    StateRecord, StateType,
};
pub use dependency::{Dependency, Kind, Provider};
pub use error::{Error, Result};
pub use fetch::{FetchContext, Fetchable};
pub use installation::Installation;
pub use registry::{
    CobblePlugin, InstalledPlugin, ItemFlags, Plugin, Registry, RegistryItem, RemotePlugin,
};
pub use stone::StoneReader;
