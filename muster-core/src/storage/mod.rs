//! Local persistence: the snapshot cache and the write queue.
//!
//! # Storage layout
//!
//! Files are stored in the data directory:
//! - `users.json`, `operations.json`, `check_ins.json`, `meal_logs.json`,
//!   `system_settings.json`: snapshot collections
//! - `write_queue.json`: writes waiting to be replayed
//!
//! Each file is replaced atomically on every save.

mod error;
mod file;
mod kind;
mod queue;
mod snapshot;

pub use error::StoreError;
pub use kind::SnapshotKind;
pub use queue::{QueuedWrite, RetryPolicy, WriteQueue, WriteStatus, DEFAULT_MAX_RETRIES};
pub use snapshot::SnapshotStore;

pub(crate) use snapshot::upsert_into;

/// Filename of the write queue inside the data directory.
pub const WRITE_QUEUE_FILENAME: &str = "write_queue.json";
