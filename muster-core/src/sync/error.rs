//! Sync error types.

use thiserror::Error;

use crate::error::ServiceError;
use crate::storage::StoreError;

/// Why a pipeline step failed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SyncResult<T> = Result<T, SyncError>;
