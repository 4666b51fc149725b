//! The concrete sync pipeline.
//!
//! [`SyncCoordinator`] registers six steps on a [`SyncRunner`]:
//!
//! 1. `replay_write_queue`: send every ready queued write
//! 2. `pull_users`
//! 3. `pull_operations`
//! 4. `pull_check_ins`
//! 5. `pull_meal_logs`
//! 6. `pull_system_settings`
//!
//! Replay runs first so a fresh pull cannot overwrite local writes that have
//! not been sent yet. Inside the replay step a failing entry is recorded and
//! skipped; it never stops the entries behind it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::SyncResult;
use super::event::SyncEvent;
use super::pull::{no_overlay, overlay_check_ins, overlay_meal_logs, refresh, Missing};
use super::runner::{SyncOutcome, SyncRunner, SyncStatus};
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::models::{CheckIn, MealLog, Operation, Snapshot, SystemSettings, User};
use crate::services::{CheckInService, MealService, RemoteReader, WriteIntent};
use crate::storage::{QueuedWrite, SnapshotStore, WriteQueue};

pub const STEP_REPLAY: &str = "replay_write_queue";
pub const STEP_PULL_USERS: &str = "pull_users";
pub const STEP_PULL_OPERATIONS: &str = "pull_operations";
pub const STEP_PULL_CHECK_INS: &str = "pull_check_ins";
pub const STEP_PULL_MEAL_LOGS: &str = "pull_meal_logs";
pub const STEP_PULL_SYSTEM_SETTINGS: &str = "pull_system_settings";

/// Step names in execution order.
pub const PIPELINE: [&str; 6] = [
    STEP_REPLAY,
    STEP_PULL_USERS,
    STEP_PULL_OPERATIONS,
    STEP_PULL_CHECK_INS,
    STEP_PULL_MEAL_LOGS,
    STEP_PULL_SYSTEM_SETTINGS,
];

/// Handles to everything the engine wires together.
#[derive(Clone)]
pub struct SyncDeps {
    pub check_ins: Arc<dyn CheckInService>,
    pub meals: Arc<dyn MealService>,
    pub remote: Arc<dyn RemoteReader>,
    pub queue: Arc<WriteQueue>,
    pub snapshots: Arc<SnapshotStore>,
    pub clock: Arc<dyn Clock>,
}

/// Result of one replay step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub sent: usize,
    pub retrying: usize,
    pub parked: usize,
    /// Check-outs held back because their check-in is still queued.
    pub waiting: usize,
}

pub struct SyncCoordinator {
    runner: SyncRunner,
}

impl SyncCoordinator {
    pub fn new(deps: SyncDeps) -> Self {
        let runner = SyncRunner::builder()
            .clock(deps.clock.clone())
            .step(STEP_REPLAY, bind(&deps, |d| async move {
                replay_queue(&d).await.map(|_| ())
            }))
            .step(STEP_PULL_USERS, bind(&deps, pull_users))
            .step(STEP_PULL_OPERATIONS, bind(&deps, pull_operations))
            .step(STEP_PULL_CHECK_INS, bind(&deps, pull_check_ins))
            .step(STEP_PULL_MEAL_LOGS, bind(&deps, pull_meal_logs))
            .step(STEP_PULL_SYSTEM_SETTINGS, bind(&deps, pull_system_settings))
            .build();

        Self { runner }
    }

    /// Runs the pipeline now. A no-op while another run is active.
    pub async fn sync_now(&self, reason: &str) -> SyncOutcome {
        self.runner.sync_now(reason).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.runner.subscribe()
    }

    pub fn cancel(&self) -> bool {
        self.runner.cancel()
    }

    pub fn status(&self) -> SyncStatus {
        self.runner.status()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.runner.step_names()
    }

    /// Syncs on a fixed interval until `token` is cancelled. The first run
    /// starts immediately.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Periodic sync stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        coordinator.sync_now("periodic").await;
                    }
                }
            }
        })
    }
}

/// Turns `f(deps)` into a repeatable step closure.
fn bind<F, Fut>(deps: &SyncDeps, f: F) -> impl Fn() -> Fut + Send + Sync + 'static
where
    F: Fn(SyncDeps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<()>> + Send + 'static,
{
    let deps = deps.clone();
    move || f(deps.clone())
}

/// Sends every ready queued write, oldest first, one at a time.
///
/// Only store failures abort the step. A write the server refuses is
/// recorded on its entry and the next entry is tried.
pub async fn replay_queue(deps: &SyncDeps) -> SyncResult<ReplaySummary> {
    deps.queue.prune_failed().await?;

    let ready = deps.queue.ready_writes().await;
    let mut summary = ReplaySummary::default();
    if ready.is_empty() {
        debug!("Write queue has nothing ready");
        return Ok(summary);
    }

    for id in ready.into_iter().map(|e| e.id) {
        // Re-read: an earlier replay in this loop may have remapped it.
        let Some(entry) = deps.queue.get(id).await else {
            continue;
        };
        if let WriteIntent::CheckOut(req) = &entry.intent {
            if deps.queue.holds_check_in(req.check_in_id).await {
                debug!(entry_id = %id, check_in_id = %req.check_in_id, "Check-out waiting on its check-in");
                summary.waiting += 1;
                continue;
            }
        }
        deps.queue.mark_in_flight(id).await?;

        match send(deps, &entry).await {
            Ok(()) => {
                deps.queue.remove(id).await?;
                summary.sent += 1;
            }
            Err(e) if e.is_retryable() => {
                deps.queue.mark_failed(id, &e.to_string()).await?;
                summary.retrying += 1;
            }
            Err(e) => {
                deps.queue.park(id, &e.to_string()).await?;
                summary.parked += 1;
            }
        }
    }

    info!(
        sent = summary.sent,
        retrying = summary.retrying,
        parked = summary.parked,
        waiting = summary.waiting,
        "Replayed write queue"
    );
    Ok(summary)
}

/// Performs one queued write and records the confirmed result locally.
async fn send(deps: &SyncDeps, entry: &QueuedWrite) -> Result<(), ServiceError> {
    let now = deps.clock.now();
    match &entry.intent {
        WriteIntent::CheckIn(req) => {
            let confirmed = deps.check_ins.check_in(req).await?;
            let server_id = confirmed.id;
            confirm_locally(
                deps.snapshots
                    .replace_item(entry.id, Snapshot::confirmed(confirmed, now)),
                entry.id,
            )
            .await;
            if let Err(e) = deps.queue.remap_check_in(entry.id, server_id).await {
                warn!(entry_id = %entry.id, error = %e, "Failed to remap queued check-outs");
            }
        }
        WriteIntent::CheckOut(req) => {
            let confirmed = deps
                .check_ins
                .check_out(req.check_in_id, req.checkout_note.as_deref())
                .await?;
            confirm_locally(
                deps.snapshots.upsert(Snapshot::confirmed(confirmed, now)),
                entry.id,
            )
            .await;
        }
        WriteIntent::MealLog(req) => {
            let confirmed = deps.meals.create_meal_log(req).await?;
            confirm_locally(
                deps.snapshots
                    .replace_item(entry.id, Snapshot::confirmed(confirmed, now)),
                entry.id,
            )
            .await;
        }
    }
    debug!(entry_id = %entry.id, kind = entry.intent.kind(), "Replayed write");
    Ok(())
}

/// The server already has the write; a cache update failure only delays
/// when it shows up locally, so it is logged rather than returned.
async fn confirm_locally(
    update: impl Future<Output = Result<(), crate::storage::StoreError>>,
    entry_id: Uuid,
) {
    if let Err(e) = update.await {
        warn!(%entry_id, error = %e, "Failed to record replayed write in snapshot");
    }
}

async fn pull_users(deps: SyncDeps) -> SyncResult<()> {
    let result = deps.remote.fetch_users().await;
    refresh::<User>(&deps, result, Missing::Fail, no_overlay).await?;
    Ok(())
}

async fn pull_operations(deps: SyncDeps) -> SyncResult<()> {
    let result = deps.remote.fetch_operations().await;
    refresh::<Operation>(&deps, result, Missing::Fail, no_overlay).await?;
    Ok(())
}

async fn pull_check_ins(deps: SyncDeps) -> SyncResult<()> {
    let result = deps.remote.fetch_check_ins().await;
    refresh::<CheckIn>(&deps, result, Missing::Fail, overlay_check_ins).await?;
    Ok(())
}

async fn pull_meal_logs(deps: SyncDeps) -> SyncResult<()> {
    let result = deps.remote.fetch_meal_logs().await;
    refresh::<MealLog>(&deps, result, Missing::Fail, overlay_meal_logs).await?;
    Ok(())
}

async fn pull_system_settings(deps: SyncDeps) -> SyncResult<()> {
    let result = deps.remote.fetch_system_settings().await.map(|s| vec![s]);
    refresh::<SystemSettings>(&deps, result, Missing::Empty, no_overlay).await?;
    Ok(())
}
