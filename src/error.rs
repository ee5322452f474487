// src/error.rs

//! Crate-wide error and result types

use thiserror::Error;

/// Errors produced by the metadata and state subsystem
#[derive(Error, Debug)]
pub enum Error {
    /// Key or path absent. Normal for point queries, fatal for read-only opens.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unparseable archive or database row, with a byte offset where one is known
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Filesystem failure wrapped with operation context
    #[error("io error: {0}")]
    IoError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying key-value store failure wrapped with the operation name
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Semantic invariant violated (missing hash, zero size, bad flags)
    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    /// A write transaction could not commit
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("download error: {0}")]
    DownloadError(String),

    /// Entity serialization failure
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, Error>;
