//! Locally cached copies of server entities.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CheckIn, MealLog, Operation, SystemSettings, User};
use crate::storage::SnapshotKind;

/// An entity type that can be cached in the snapshot store.
pub trait SnapshotEntity:
    Serialize + DeserializeOwned + Clone + Send + Sync + std::fmt::Debug + 'static
{
    /// The snapshot file this entity type lives in.
    const KIND: SnapshotKind;

    fn id(&self) -> Uuid;
}

/// A cached entity plus the time the server last confirmed it.
///
/// `synced_at == None` marks an optimistic local write that the next
/// authoritative pull may replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    #[serde(flatten)]
    pub item: T,
    pub synced_at: Option<DateTime<Utc>>,
}

impl<T> Snapshot<T> {
    pub fn confirmed(item: T, at: DateTime<Utc>) -> Self {
        Self {
            item,
            synced_at: Some(at),
        }
    }

    pub fn optimistic(item: T) -> Self {
        Self {
            item,
            synced_at: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.synced_at.is_some()
    }
}

impl SnapshotEntity for User {
    const KIND: SnapshotKind = SnapshotKind::Users;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl SnapshotEntity for Operation {
    const KIND: SnapshotKind = SnapshotKind::Operations;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl SnapshotEntity for CheckIn {
    const KIND: SnapshotKind = SnapshotKind::CheckIns;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl SnapshotEntity for MealLog {
    const KIND: SnapshotKind = SnapshotKind::MealLogs;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl SnapshotEntity for SystemSettings {
    const KIND: SnapshotKind = SnapshotKind::SystemSettings;

    fn id(&self) -> Uuid {
        self.id
    }
}
