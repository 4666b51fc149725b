//! Durable write queue.
//!
//! Writes that could not be sent live are kept here until a replay succeeds.
//! The whole queue is one JSON array in a single file, rewritten atomically
//! after every mutation.
//!
//! ## Entry lifecycle
//!
//! ```text
//! enqueue ──▶ pending ──mark_in_flight──▶ in_flight ──remove──▶ (gone)
//!                ▲                            │
//!                └──── mark_failed (< max) ───┤
//!                                             └── mark_failed (>= max) / park ──▶ failed
//! ```
//!
//! A pending entry is ready once `2^retry_count` backoff units have passed
//! since its last attempt. Failed entries are never replayed automatically;
//! they stay until cleared, retried by an operator, or pruned by the
//! retention policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::file::{read_optional, write_atomic};
use super::StoreError;
use crate::clock::Clock;
use crate::services::WriteIntent;

/// Default number of failed attempts before an entry is parked.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Pending,
    InFlight,
    Failed,
}

/// A write waiting to be replayed against the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedWrite {
    pub id: Uuid,
    pub intent: WriteIntent,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    pub status: WriteStatus,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedWrite {
    fn new(intent: WriteIntent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent,
            created_at,
            retry_count: 0,
            status: WriteStatus::Pending,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// True if the entry is pending and its backoff window has elapsed.
    pub fn is_ready(&self, now: DateTime<Utc>, policy: &RetryPolicy) -> bool {
        if self.status != WriteStatus::Pending {
            return false;
        }
        let Some(last_attempt) = self.last_attempt_at else {
            return true;
        };
        now - last_attempt >= policy.backoff(self.retry_count)
    }

    /// When the entry next becomes ready, if it ever will automatically.
    pub fn next_attempt_at(&self, policy: &RetryPolicy) -> Option<DateTime<Utc>> {
        match (self.status, self.last_attempt_at) {
            (WriteStatus::Pending, Some(last)) => {
                last.checked_add_signed(policy.backoff(self.retry_count))
            }
            (WriteStatus::Pending, None) => Some(self.created_at),
            _ => None,
        }
    }

    /// True while the write still needs to reach the server.
    pub fn is_outstanding(&self) -> bool {
        matches!(self.status, WriteStatus::Pending | WriteStatus::InFlight)
    }
}

/// Retry limits and backoff for queued writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which an entry is parked as `failed`.
    pub max_retries: u32,
    /// Length of one backoff unit. Delay is `unit * 2^retry_count`.
    pub backoff_unit: Duration,
    /// How long parked entries are kept before pruning. `None` keeps them
    /// until explicitly cleared.
    pub failed_retention: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_secs(1),
            failed_retention: None,
        }
    }
}

impl RetryPolicy {
    /// Delay required after an attempt before the entry is ready again.
    ///
    /// | retry_count | delay (unit = 1s) |
    /// |-------------|-------------------|
    /// | 0           | 1s                |
    /// | 1           | 2s                |
    /// | 2           | 4s                |
    /// | 3           | 8s                |
    pub fn backoff(&self, retry_count: u32) -> chrono::Duration {
        let unit_ms = u64::try_from(self.backoff_unit.as_millis()).unwrap_or(u64::MAX);
        let multiplier = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        let delay_ms = unit_ms.saturating_mul(multiplier).min(i64::MAX as u64 / 1_000);
        chrono::Duration::milliseconds(delay_ms as i64)
    }
}

/// File-backed FIFO of writes awaiting replay.
pub struct WriteQueue {
    path: PathBuf,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<QueuedWrite>>,
}

impl WriteQueue {
    /// Opens the queue stored at `path`.
    ///
    /// A missing file is an empty queue. Malformed content is discarded with
    /// a warning instead of failing. Entries left `in_flight` by an
    /// interrupted replay are returned to `pending`.
    pub async fn open(path: impl Into<PathBuf>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let (entries, recovered) = load_entries(&path).await;

        let queue = Self {
            path,
            policy,
            clock,
            entries: Mutex::new(entries),
        };

        if recovered > 0 {
            info!(count = recovered, "Recovered in-flight writes to pending");
            let entries = queue.entries.lock().await;
            if let Err(e) = queue.persist(&entries).await {
                warn!(error = %e, "Failed to persist recovered write queue");
            }
        }

        queue
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Appends a write and persists the queue.
    pub async fn enqueue(&self, intent: WriteIntent) -> Result<QueuedWrite, StoreError> {
        let entry = QueuedWrite::new(intent, self.clock.now());
        let queued = entry.clone();
        self.mutate(|entries| {
            entries.push(entry);
            Ok(())
        })
        .await?;
        debug!(entry_id = %queued.id, kind = queued.intent.kind(), "Enqueued write");
        Ok(queued)
    }

    /// Pending entries whose backoff has elapsed, oldest first.
    pub async fn ready_writes(&self) -> Vec<QueuedWrite> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|e| e.is_ready(now, &self.policy))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<QueuedWrite> {
        let entries = self.entries.lock().await;
        entries.iter().find(|e| e.id == id).cloned()
    }

    /// Every entry in insertion order.
    pub async fn entries(&self) -> Vec<QueuedWrite> {
        self.entries.lock().await.clone()
    }

    /// Entries that still need to reach the server (pending or in flight).
    pub async fn outstanding(&self) -> Vec<QueuedWrite> {
        let entries = self.entries.lock().await;
        entries.iter().filter(|e| e.is_outstanding()).cloned().collect()
    }

    /// True while a check-in with this entry id is still in the queue, in
    /// any status. The server does not know that id yet.
    pub async fn holds_check_in(&self, entry_id: Uuid) -> bool {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .any(|e| e.id == entry_id && matches!(e.intent, WriteIntent::CheckIn(_)))
    }

    /// Entries parked after exhausting their retries or being rejected.
    pub async fn failed_writes(&self) -> Vec<QueuedWrite> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|e| e.status == WriteStatus::Failed)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Marks the start of a replay attempt.
    pub async fn mark_in_flight(&self, id: Uuid) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.mutate(|entries| {
            let entry = find_mut(entries, id)?;
            entry.status = WriteStatus::InFlight;
            entry.last_attempt_at = Some(now);
            Ok(())
        })
        .await
    }

    /// Records a failed attempt and applies the retry policy.
    ///
    /// Returns the entry's new status: `pending` while retries remain,
    /// `failed` once `retry_count` reaches the maximum.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<WriteStatus, StoreError> {
        let now = self.clock.now();
        let max_retries = self.policy.max_retries;
        let (status, retry_count) = self
            .mutate(|entries| {
                let entry = find_mut(entries, id)?;
                entry.retry_count = entry.retry_count.saturating_add(1);
                entry.status = if entry.retry_count >= max_retries {
                    WriteStatus::Failed
                } else {
                    WriteStatus::Pending
                };
                entry.last_attempt_at = Some(now);
                entry.last_error = Some(error.to_string());
                Ok((entry.status, entry.retry_count))
            })
            .await?;

        if status == WriteStatus::Failed {
            warn!(entry_id = %id, retry_count, error, "Write exhausted retries, parked as failed");
        } else {
            debug!(
                entry_id = %id,
                retry_count,
                backoff_ms = self.policy.backoff(retry_count).num_milliseconds(),
                "Write attempt failed, will retry"
            );
        }
        Ok(status)
    }

    /// Parks an entry as failed without further retries.
    ///
    /// Used for rejections that cannot succeed on a later attempt.
    pub async fn park(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.mutate(|entries| {
            let entry = find_mut(entries, id)?;
            entry.retry_count = entry.retry_count.saturating_add(1);
            entry.status = WriteStatus::Failed;
            entry.last_attempt_at = Some(now);
            entry.last_error = Some(error.to_string());
            Ok(())
        })
        .await?;
        warn!(entry_id = %id, error, "Write rejected, parked as failed");
        Ok(())
    }

    /// Deletes an entry after a successful replay.
    pub async fn remove(&self, id: Uuid) -> Result<QueuedWrite, StoreError> {
        self.mutate(|entries| {
            let index = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or(StoreError::UnknownEntry(id))?;
            Ok(entries.remove(index))
        })
        .await
    }

    /// Drops every parked entry. Returns how many were removed.
    pub async fn clear_failed(&self) -> Result<usize, StoreError> {
        let removed = self
            .mutate(|entries| {
                let before = entries.len();
                entries.retain(|e| e.status != WriteStatus::Failed);
                Ok(before - entries.len())
            })
            .await?;
        if removed > 0 {
            info!(removed, "Cleared failed writes");
        }
        Ok(removed)
    }

    /// Returns a parked entry to `pending` with a fresh retry budget.
    pub async fn retry_failed(&self, id: Uuid) -> Result<(), StoreError> {
        self.mutate(|entries| {
            let entry = find_mut(entries, id)?;
            if entry.status == WriteStatus::Failed {
                entry.status = WriteStatus::Pending;
                entry.retry_count = 0;
                entry.last_attempt_at = None;
            }
            Ok(())
        })
        .await
    }

    /// Removes parked entries older than the retention period, if one is set.
    pub async fn prune_failed(&self) -> Result<usize, StoreError> {
        let Some(retention) = self.policy.failed_retention else {
            return Ok(0);
        };
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 1000));
        let now = self.clock.now();

        {
            let entries = self.entries.lock().await;
            let expired = entries.iter().any(|e| is_expired(e, now, retention));
            if !expired {
                return Ok(0);
            }
        }

        let pruned = self
            .mutate(|entries| {
                let before = entries.len();
                entries.retain(|e| !is_expired(e, now, retention));
                Ok(before - entries.len())
            })
            .await?;
        info!(pruned, "Pruned expired failed writes");
        Ok(pruned)
    }

    /// Points queued check-outs at the server id of a check-in that was
    /// created offline under `local_id`.
    pub async fn remap_check_in(&self, local_id: Uuid, server_id: Uuid) -> Result<usize, StoreError> {
        {
            let entries = self.entries.lock().await;
            if !entries.iter().any(|e| refers_to(e, local_id)) {
                return Ok(0);
            }
        }

        let remapped = self
            .mutate(|entries| {
                let mut count = 0;
                for entry in entries.iter_mut() {
                    if let WriteIntent::CheckOut(req) = &mut entry.intent {
                        if req.check_in_id == local_id {
                            req.check_in_id = server_id;
                            count += 1;
                        }
                    }
                }
                Ok(count)
            })
            .await?;
        debug!(%local_id, %server_id, remapped, "Remapped queued check-outs");
        Ok(remapped)
    }

    /// Applies `f` to a copy of the entries, persists the result, and only
    /// then makes it visible. A failed save leaves memory and disk unchanged.
    async fn mutate<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<QueuedWrite>) -> Result<R, StoreError>,
    {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        let result = f(&mut next)?;
        self.persist(&next).await?;
        *entries = next;
        Ok(result)
    }

    async fn persist(&self, entries: &[QueuedWrite]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(entries).map_err(|source| StoreError::Encode {
            what: "write queue",
            source,
        })?;
        write_atomic(&self.path, &bytes).await
    }
}

fn find_mut(entries: &mut [QueuedWrite], id: Uuid) -> Result<&mut QueuedWrite, StoreError> {
    entries
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or(StoreError::UnknownEntry(id))
}

fn is_expired(entry: &QueuedWrite, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
    if entry.status != WriteStatus::Failed {
        return false;
    }
    let since = entry.last_attempt_at.unwrap_or(entry.created_at);
    now - since >= retention
}

fn refers_to(entry: &QueuedWrite, check_in_id: Uuid) -> bool {
    matches!(&entry.intent, WriteIntent::CheckOut(req) if req.check_in_id == check_in_id)
}

/// Loads queue entries one by one so a single bad record does not take the
/// rest of the queue with it. Returns the entries and how many were reset
/// from `in_flight`.
async fn load_entries(path: &Path) -> (Vec<QueuedWrite>, usize) {
    let bytes = match read_optional(path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return (Vec::new(), 0),
        Err(e) => {
            warn!(error = %e, "Failed to read write queue, starting empty");
            return (Vec::new(), 0);
        }
    };

    let raw: Vec<serde_json::Value> = match serde_json::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed write queue, starting empty");
            return (Vec::new(), 0);
        }
    };

    let mut recovered = 0;
    let mut entries = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<QueuedWrite>(value) {
            Ok(mut entry) => {
                if entry.status == WriteStatus::InFlight {
                    entry.status = WriteStatus::Pending;
                    recovered += 1;
                }
                entries.push(entry);
            }
            Err(e) => warn!(error = %e, "Dropping malformed write queue entry"),
        }
    }
    (entries, recovered)
}
