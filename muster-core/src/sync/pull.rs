//! Refreshing snapshot collections from the server.

use tracing::{debug, info};

use super::error::SyncResult;
use super::SyncDeps;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{CheckIn, MealLog, Snapshot, SnapshotEntity};
use crate::services::WriteIntent;
use crate::storage::{upsert_into, QueuedWrite};

/// Re-applies a local write that has not reached the server yet.
pub(crate) type Overlay<T> = fn(&mut Vec<Snapshot<T>>, &[QueuedWrite]);

/// How a missing resource is treated when pulling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Missing {
    /// `NotFound` is an error.
    Fail,
    /// `NotFound` means "nothing there yet" and clears the snapshot.
    Empty,
}

/// Writes a pull result into the snapshot store.
///
/// Server items replace the collection wholesale, stamped with the current
/// time, then `overlay` re-adds still-queued local writes so a pull never
/// hides them. A permission failure is a stable condition for restricted
/// roles and clears the collection instead of failing. Returns what was
/// stored.
pub(crate) async fn refresh<T: SnapshotEntity>(
    deps: &SyncDeps,
    result: ServiceResult<Vec<T>>,
    missing: Missing,
    overlay: Overlay<T>,
) -> SyncResult<Vec<Snapshot<T>>> {
    let kind = T::KIND;
    match result {
        Ok(items) => {
            let now = deps.clock.now();
            // The queue is read under the snapshot lock, so a write queued
            // meanwhile either shows up in the overlay or is upserted after
            // this save.
            let snapshots = deps
                .snapshots
                .save_with(deps.queue.outstanding(), |outstanding| {
                    let mut snapshots: Vec<_> = items
                        .into_iter()
                        .map(|item| Snapshot::confirmed(item, now))
                        .collect();
                    overlay(&mut snapshots, &outstanding);
                    snapshots
                })
                .await?;
            debug!(%kind, count = snapshots.len(), "Pulled snapshot");
            Ok(snapshots)
        }
        Err(ServiceError::Permission(reason)) => {
            info!(%kind, %reason, "No read permission, clearing snapshot");
            deps.snapshots.clear::<T>().await?;
            Ok(Vec::new())
        }
        Err(ServiceError::NotFound(reason)) if missing == Missing::Empty => {
            info!(%kind, %reason, "Nothing on server yet, clearing snapshot");
            deps.snapshots.clear::<T>().await?;
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn no_overlay<T>(_: &mut Vec<Snapshot<T>>, _: &[QueuedWrite]) {}

/// Shows queued check-ins and check-outs on top of pulled check-ins.
pub(crate) fn overlay_check_ins(items: &mut Vec<Snapshot<CheckIn>>, outstanding: &[QueuedWrite]) {
    for entry in outstanding {
        match &entry.intent {
            WriteIntent::CheckIn(req) => {
                if !items.iter().any(|s| s.item.id == entry.id) {
                    items.push(Snapshot::optimistic(req.to_local(entry.id, entry.created_at)));
                }
            }
            WriteIntent::CheckOut(req) => {
                if let Some(existing) = items.iter_mut().find(|s| s.item.id == req.check_in_id) {
                    if existing.item.is_open() {
                        existing
                            .item
                            .close(entry.created_at, req.checkout_note.clone());
                        existing.synced_at = None;
                    }
                }
            }
            WriteIntent::MealLog(_) => {}
        }
    }
}

/// Shows queued meal logs on top of pulled meal logs.
pub(crate) fn overlay_meal_logs(items: &mut Vec<Snapshot<MealLog>>, outstanding: &[QueuedWrite]) {
    for entry in outstanding {
        if let WriteIntent::MealLog(req) = &entry.intent {
            upsert_into(items, Snapshot::optimistic(req.to_local(entry.id)));
        }
    }
}
