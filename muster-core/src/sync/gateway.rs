//! Live-first writes and reads with offline fallback.
//!
//! Writes try the server first. When the server cannot be reached the write
//! is queued for replay and shown in the snapshot right away, unconfirmed.
//! Reads refresh the snapshot when the server answers and fall back to it,
//! flagged as possibly stale, when it does not.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::coordinator::SyncDeps;
use super::error::{SyncError, SyncResult};
use super::pull::{no_overlay, overlay_check_ins, overlay_meal_logs, refresh, Missing, Overlay};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{CheckIn, MealLog, Operation, Snapshot, SnapshotEntity, SystemSettings, User};
use crate::services::{CheckInRequest, CheckOutRequest, MealLogRequest, WriteIntent};

/// How a write request was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The server accepted the write.
    Sent(T),
    /// The server was unreachable. The write succeeded locally and will be
    /// sent on a later sync.
    Queued { entry_id: Uuid, local: T },
}

impl<T> WriteOutcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, WriteOutcome::Queued { .. })
    }

    pub fn record(&self) -> &T {
        match self {
            WriteOutcome::Sent(record) => record,
            WriteOutcome::Queued { local, .. } => local,
        }
    }
}

/// A read result and whether it came from the local cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub items: Vec<Snapshot<T>>,
    /// True when the server could not be read and `items` is the last
    /// cached snapshot.
    pub stale: bool,
}

pub struct OfflineGateway {
    deps: SyncDeps,
}

impl OfflineGateway {
    pub fn new(deps: SyncDeps) -> Self {
        Self { deps }
    }

    pub async fn check_in(&self, request: CheckInRequest) -> SyncResult<WriteOutcome<CheckIn>> {
        match self.deps.check_ins.check_in(&request).await {
            Ok(confirmed) => {
                self.remember(Snapshot::confirmed(confirmed.clone(), self.deps.clock.now()))
                    .await;
                Ok(WriteOutcome::Sent(confirmed))
            }
            Err(e) if e.is_connectivity() => {
                let entry = self
                    .deps
                    .queue
                    .enqueue(WriteIntent::CheckIn(request.clone()))
                    .await?;
                let local = request.to_local(entry.id, entry.created_at);
                self.remember(Snapshot::optimistic(local.clone())).await;
                info!(entry_id = %entry.id, error = %e, "Check-in queued for later sync");
                Ok(WriteOutcome::Queued {
                    entry_id: entry.id,
                    local,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn check_out(
        &self,
        check_in_id: Uuid,
        note: Option<String>,
    ) -> SyncResult<WriteOutcome<CheckIn>> {
        // A check-in that only exists in the queue is unknown to the server;
        // its check-out has to wait behind it.
        let check_in_queued = self.deps.queue.holds_check_in(check_in_id).await;

        if !check_in_queued {
            match self.deps.check_ins.check_out(check_in_id, note.as_deref()).await {
                Ok(confirmed) => {
                    self.remember(Snapshot::confirmed(confirmed.clone(), self.deps.clock.now()))
                        .await;
                    return Ok(WriteOutcome::Sent(confirmed));
                }
                Err(e) if e.is_connectivity() => {
                    debug!(%check_in_id, error = %e, "Check-out could not reach the server");
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            debug!(%check_in_id, "Check-in not yet sent, queueing check-out behind it");
        }

        // Nothing is queued for a check-in this terminal has never seen.
        let Some(mut local) = self.known_check_in(check_in_id).await else {
            return Err(SyncError::Service(ServiceError::NotFound(format!(
                "check-in {} is not in the local cache",
                check_in_id
            ))));
        };

        let entry = self
            .deps
            .queue
            .enqueue(WriteIntent::CheckOut(CheckOutRequest {
                check_in_id,
                checkout_note: note.clone(),
            }))
            .await?;
        local.close(entry.created_at, note);
        self.remember(Snapshot::optimistic(local.clone())).await;
        info!(entry_id = %entry.id, %check_in_id, "Check-out queued for later sync");

        Ok(WriteOutcome::Queued {
            entry_id: entry.id,
            local,
        })
    }

    /// The check-in as this terminal last saw it: the cached record, or the
    /// queued request when the cache lost it.
    async fn known_check_in(&self, check_in_id: Uuid) -> Option<CheckIn> {
        let cached = self
            .deps
            .snapshots
            .load::<CheckIn>()
            .await
            .into_iter()
            .find(|s| s.item.id == check_in_id);
        if let Some(snapshot) = cached {
            return Some(snapshot.item);
        }
        self.deps
            .queue
            .get(check_in_id)
            .await
            .and_then(|entry| match entry.intent {
                WriteIntent::CheckIn(req) => Some(req.to_local(entry.id, entry.created_at)),
                _ => None,
            })
    }

    pub async fn log_meal(&self, request: MealLogRequest) -> SyncResult<WriteOutcome<MealLog>> {
        match self.deps.meals.create_meal_log(&request).await {
            Ok(confirmed) => {
                self.remember(Snapshot::confirmed(confirmed.clone(), self.deps.clock.now()))
                    .await;
                Ok(WriteOutcome::Sent(confirmed))
            }
            Err(e) if e.is_connectivity() => {
                let entry = self
                    .deps
                    .queue
                    .enqueue(WriteIntent::MealLog(request.clone()))
                    .await?;
                let local = request.to_local(entry.id);
                self.remember(Snapshot::optimistic(local.clone())).await;
                info!(entry_id = %entry.id, error = %e, "Meal log queued for later sync");
                Ok(WriteOutcome::Queued {
                    entry_id: entry.id,
                    local,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn users(&self) -> Fetched<User> {
        let result = self.deps.remote.fetch_users().await;
        self.read_through(result, Missing::Fail, no_overlay).await
    }

    pub async fn operations(&self) -> Fetched<Operation> {
        let result = self.deps.remote.fetch_operations().await;
        self.read_through(result, Missing::Fail, no_overlay).await
    }

    pub async fn check_ins(&self) -> Fetched<CheckIn> {
        let result = self.deps.remote.fetch_check_ins().await;
        self.read_through(result, Missing::Fail, overlay_check_ins).await
    }

    pub async fn meal_logs(&self) -> Fetched<MealLog> {
        let result = self.deps.remote.fetch_meal_logs().await;
        self.read_through(result, Missing::Fail, overlay_meal_logs).await
    }

    pub async fn system_settings(&self) -> Fetched<SystemSettings> {
        let result = self.deps.remote.fetch_system_settings().await.map(|s| vec![s]);
        self.read_through(result, Missing::Empty, no_overlay).await
    }

    /// The cached collection without contacting the server.
    pub async fn cached<T: SnapshotEntity>(&self) -> Vec<Snapshot<T>> {
        self.deps.snapshots.load().await
    }

    async fn read_through<T: SnapshotEntity>(
        &self,
        result: ServiceResult<Vec<T>>,
        missing: Missing,
        overlay: Overlay<T>,
    ) -> Fetched<T> {
        match refresh(&self.deps, result, missing, overlay).await {
            Ok(items) => Fetched {
                items,
                stale: false,
            },
            Err(e) => {
                let kind = T::KIND;
                warn!(%kind, error = %e, "Read failed, serving cached snapshot");
                Fetched {
                    items: self.deps.snapshots.load().await,
                    stale: true,
                }
            }
        }
    }

    async fn remember<T: SnapshotEntity>(&self, snapshot: Snapshot<T>) {
        let kind = T::KIND;
        if let Err(e) = self.deps.snapshots.upsert(snapshot).await {
            warn!(%kind, error = %e, "Failed to update snapshot after write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::models::{MealType, Role};
    use crate::storage::WriteStatus;
    use crate::sync::testing::harness;
    use chrono::Utc;

    fn network() -> ServiceError {
        ServiceError::Network("timed out".into())
    }

    #[tokio::test]
    async fn test_online_check_in_is_confirmed() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());

        let request = CheckInRequest::new(Uuid::new_v4(), Uuid::new_v4()).with_role(Role::Member);
        let outcome = gateway.check_in(request).await.unwrap();

        assert!(matches!(outcome, WriteOutcome::Sent(_)));
        assert!(h.deps.queue.is_empty().await);
        let cached: Vec<Snapshot<CheckIn>> = h.deps.snapshots.load().await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].synced_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_offline_meal_log_is_queued_and_cached() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());
        h.fake.fail_next_writes([network()]);

        let request = MealLogRequest::new(MealType::Breakfast, 12, Utc::now());
        let outcome = gateway.log_meal(request).await.unwrap();

        let WriteOutcome::Queued { entry_id, local } = outcome else {
            panic!("expected queued outcome");
        };
        assert_eq!(local.id, entry_id);
        assert_eq!(local.quantity, 12);
        let entry = h.deps.queue.get(entry_id).await.unwrap();
        assert_eq!(entry.status, WriteStatus::Pending);
        let cached: Vec<Snapshot<MealLog>> = h.deps.snapshots.load().await;
        assert_eq!(cached.len(), 1);
        assert!(!cached[0].is_confirmed());
    }

    #[tokio::test]
    async fn test_rejected_write_is_not_queued() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());
        h.fake
            .fail_next_writes([ServiceError::Conflict("already checked in".into())]);

        let err = gateway
            .check_in(CheckInRequest::new(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Service(ServiceError::Conflict(_))));
        assert!(h.deps.queue.is_empty().await);
        let cached: Vec<Snapshot<CheckIn>> = h.deps.snapshots.load().await;
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn test_offline_check_out_of_cached_check_in() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());
        let confirmed = gateway
            .check_in(CheckInRequest::new(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        let id = confirmed.record().id;

        h.fake.fail_next_writes([network()]);
        let outcome = gateway.check_out(id, None).await.unwrap();

        assert!(outcome.is_queued());
        assert_eq!(outcome.record().checked_out_at, Some(h.clock.now()));
        let cached: Vec<Snapshot<CheckIn>> = h.deps.snapshots.load().await;
        assert!(!cached[0].item.is_open());
        assert!(!cached[0].is_confirmed());
    }

    #[tokio::test]
    async fn test_check_out_of_queued_check_in_skips_live_call() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());
        h.fake.fail_next_writes([network()]);
        let local_id = gateway
            .check_in(CheckInRequest::new(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap()
            .record()
            .id;

        gateway.check_out(local_id, None).await.unwrap();

        assert_eq!(h.fake.calls(), vec!["check_in"]);
        assert_eq!(h.deps.queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_offline_check_out_of_unknown_check_in_queues_nothing() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());
        h.fake.fail_next_writes([network()]);

        let err = gateway
            .check_out(Uuid::new_v4(), Some("late".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Service(ServiceError::NotFound(_))));
        assert!(h.deps.queue.is_empty().await);
        let cached: Vec<Snapshot<CheckIn>> = h.deps.snapshots.load().await;
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn test_check_out_of_queued_check_in_missing_from_cache() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());
        let entry = h
            .deps
            .queue
            .enqueue(WriteIntent::CheckIn(CheckInRequest::new(Uuid::new_v4(), Uuid::new_v4())))
            .await
            .unwrap();

        let outcome = gateway.check_out(entry.id, None).await.unwrap();

        assert!(outcome.is_queued());
        assert_eq!(outcome.record().id, entry.id);
        assert!(!outcome.record().is_open());
        let cached: Vec<Snapshot<CheckIn>> = h.deps.snapshots.load().await;
        assert_eq!(cached.len(), 1);
        assert!(!cached[0].is_confirmed());
    }

    #[tokio::test]
    async fn test_unreachable_read_serves_cache_as_stale() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());
        let user = User::new("Dana", Role::Supervisor);
        h.fake.with_state(|s| s.users.push(user.clone()));

        let fresh = gateway.users().await;
        assert!(!fresh.stale);
        assert_eq!(fresh.items[0].item, user);

        h.fake.fail_reads("fetch_users", network());
        let cached = gateway.users().await;
        assert!(cached.stale);
        assert_eq!(cached.items, fresh.items);
    }

    #[tokio::test]
    async fn test_read_keeps_queued_writes_visible() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());
        h.fake.fail_next_writes([network()]);
        gateway
            .log_meal(MealLogRequest::new(MealType::Lunch, 4, Utc::now()))
            .await
            .unwrap();

        let fetched = gateway.meal_logs().await;

        assert!(!fetched.stale);
        assert_eq!(fetched.items.len(), 1);
        assert!(!fetched.items[0].is_confirmed());
    }

    #[tokio::test]
    async fn test_missing_settings_read_is_empty_not_stale() {
        let h = harness().await;
        let gateway = OfflineGateway::new(h.deps.clone());

        let fetched = gateway.system_settings().await;

        assert!(!fetched.stale);
        assert!(fetched.items.is_empty());
    }
}
