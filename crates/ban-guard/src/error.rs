//! Ban guard error types.
//!
//! [`BanError`] covers blocker and coordinator failures, [`StoreError`] covers the
//! store actor. Both convert into [`WardenError`] so the daemon can propagate them with `?`.

use warden_core::error::{EnforcementError, StorageError, WardenError};

/// Ban coordinator domain error
#[derive(Debug, thiserror::Error)]
pub enum BanError {
    /// The external blocker failed or exited non-zero
    #[error("blocker {action} failed for '{address}': {reason}")]
    Blocker {
        /// `init`, `block` or `unblock`
        action: &'static str,
        /// Target address (empty for `init`)
        address: String,
        /// Failure reason
        reason: String,
    },

    /// Address does not parse as an IP address
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Store failure while recording the outcome
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Store actor error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite reported an error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Request did not complete within the configured bound
    #[error("store request timed out after {0}s")]
    Timeout(u64),

    /// The store thread is no longer running
    #[error("store actor is not running")]
    ActorGone,

    /// A row did not have the expected shape
    #[error("row decode error: {0}")]
    Decode(String),

    /// A value could not be serialized for storage
    #[error("encode error: {0}")]
    Encode(String),

    /// Filesystem failure while opening the store
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for WardenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(secs) => WardenError::Storage(StorageError::Timeout(secs)),
            StoreError::ActorGone | StoreError::Io(_) => {
                WardenError::Storage(StorageError::Connection(err.to_string()))
            }
            StoreError::Sqlite(_) | StoreError::Decode(_) | StoreError::Encode(_) => {
                WardenError::Storage(StorageError::Query(err.to_string()))
            }
        }
    }
}

impl From<BanError> for WardenError {
    fn from(err: BanError) -> Self {
        match err {
            BanError::Store(inner) => inner.into(),
            BanError::InvalidAddress(addr) => {
                WardenError::Enforcement(EnforcementError::InvalidAddress(addr))
            }
            BanError::Blocker { .. } => {
                WardenError::Enforcement(EnforcementError::Blocker(err.to_string()))
            }
        }
    }
}
