//! Error types for the Pushgrid metric store.

use thiserror::Error;

use pushgrid_core::ValidationError;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for snapshot file operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors returned to store callers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The push was rejected; the table is unchanged.
    #[error("invalid push: {0}")]
    Invalid(#[from] ValidationError),

    /// The store did not answer within the request timeout.
    #[error("metric store did not respond in time")]
    Timeout,

    /// The store has accepted a shutdown and takes no more requests.
    #[error("metric store is shut down")]
    ShutDown,

    #[error("persistence: {0}")]
    Persistence(#[from] PersistError),
}

/// Errors from the snapshot file.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to open snapshot file: {0}")]
    Open(String),

    #[error("snapshot file is locked by another store")]
    Locked,

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("unsupported snapshot format version {0}")]
    Version(u64),
}
