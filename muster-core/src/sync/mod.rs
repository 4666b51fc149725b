//! Offline sync engine.
//!
//! - [`runner`]: ordered, single-flight, cancellable step execution
//! - [`coordinator`]: the replay-then-pull pipeline and periodic trigger
//! - [`gateway`]: live-first writes and reads with offline fallback
//! - [`realtime`]: server push trigger

pub mod coordinator;
mod error;
mod event;
pub mod gateway;
mod pull;
pub mod realtime;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{replay_queue, ReplaySummary, SyncCoordinator, SyncDeps, PIPELINE};
pub use error::{SyncError, SyncResult};
pub use event::{SyncEvent, SyncEventKind};
pub use gateway::{Fetched, OfflineGateway, WriteOutcome};
pub use realtime::{parse_change, ChangeNotice, RealtimeListener};
pub use runner::{SyncOutcome, SyncRunner, SyncRunnerBuilder, SyncStatus};
