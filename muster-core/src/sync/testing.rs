//! Shared fixture for engine tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use super::SyncDeps;
use crate::clock::ManualClock;
use crate::services::fake::FakeBackend;
use crate::storage::{RetryPolicy, SnapshotStore, WriteQueue, WRITE_QUEUE_FILENAME};

pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub fake: Arc<FakeBackend>,
    pub deps: SyncDeps,
    _temp: TempDir,
}

pub(crate) async fn harness() -> Harness {
    harness_with(RetryPolicy::default()).await
}

pub(crate) async fn harness_with(policy: RetryPolicy) -> Harness {
    let temp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
    ));
    let fake = FakeBackend::new();
    let queue = WriteQueue::open(
        temp.path().join(WRITE_QUEUE_FILENAME),
        policy,
        clock.clone(),
    )
    .await;

    let deps = SyncDeps {
        check_ins: fake.clone(),
        meals: fake.clone(),
        remote: fake.clone(),
        queue: Arc::new(queue),
        snapshots: Arc::new(SnapshotStore::new(temp.path())),
        clock: clock.clone(),
    };

    Harness {
        clock,
        fake,
        deps,
        _temp: temp,
    }
}
