//! Muster Core Library
//!
//! Offline-tolerant client engine for Muster: durable snapshots of server
//! data, a write queue with retry and backoff, and a sync pipeline that
//! replays queued writes before refreshing snapshots.

pub mod backend;
pub mod clock;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod sync;

pub use backend::{HttpBackend, Identity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ServiceError, ServiceResult};
pub use models::{
    CheckIn, MealLog, MealType, Operation, Role, Snapshot, SnapshotEntity, SystemSettings, User,
};
pub use services::{
    CheckInRequest, CheckInService, CheckOutRequest, MealLogRequest, MealService, RemoteReader,
    WriteIntent,
};
pub use storage::{
    QueuedWrite, RetryPolicy, SnapshotKind, SnapshotStore, StoreError, WriteQueue, WriteStatus,
};
pub use sync::{
    Fetched, OfflineGateway, RealtimeListener, SyncCoordinator, SyncDeps, SyncError, SyncEvent,
    SyncEventKind, SyncOutcome, SyncResult, SyncStatus, WriteOutcome,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
