//! Storage error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors from the local stores. All of them mean the last successful save
/// is still what is on disk.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Write queue entry not found: {0}")]
    UnknownEntry(Uuid),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
