//! Ledger error type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Failures reaching or writing the backing store.
///
/// A failed `append` means the trial was NOT recorded; callers must not
/// assume otherwise.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open ledger at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("ledger write failed: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("ledger read failed: {0}")]
    Read(#[source] rusqlite::Error),

    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid seed catalog: {0}")]
    Catalog(String),
}
