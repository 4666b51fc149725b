//! Durable snapshot store for offline reads.
//!
//! Each entity collection lives in its own JSON file under the data
//! directory (see [`SnapshotKind::filename`]). A file holds one JSON array of
//! [`Snapshot`] records. Writes replace the file atomically; reads never fail,
//! an absent or unreadable file is an empty collection.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::file::{read_optional, remove_if_exists, write_atomic};
use super::{SnapshotKind, StoreError};
use crate::models::{Snapshot, SnapshotEntity};

/// File-backed cache of server entities.
///
/// All reads and writes pass through one lock so read-modify-write updates
/// from different callers never interleave.
#[derive(Debug)]
pub struct SnapshotStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the full path for a collection.
    pub fn path(&self, kind: SnapshotKind) -> PathBuf {
        self.data_dir.join(kind.filename())
    }

    /// Replaces the whole collection for `T`.
    pub async fn save<T: SnapshotEntity>(&self, items: &[Snapshot<T>]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_unlocked(items).await
    }

    /// Loads the collection for `T`. Missing or corrupt files load as empty.
    pub async fn load<T: SnapshotEntity>(&self) -> Vec<Snapshot<T>> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Awaits `input` and saves what `build` makes of it, all under the store
    /// lock. Writers that update this store after producing `input` wait for
    /// the save instead of being overwritten by it.
    pub async fn save_with<T, I, Fut, F>(
        &self,
        input: Fut,
        build: F,
    ) -> Result<Vec<Snapshot<T>>, StoreError>
    where
        T: SnapshotEntity,
        Fut: Future<Output = I>,
        F: FnOnce(I) -> Vec<Snapshot<T>>,
    {
        let _guard = self.lock.lock().await;
        let items = build(input.await);
        self.write_unlocked(&items).await?;
        Ok(items)
    }

    /// Read-modify-write of one collection under the store lock.
    pub async fn update<T, F>(&self, f: F) -> Result<(), StoreError>
    where
        T: SnapshotEntity,
        F: FnOnce(&mut Vec<Snapshot<T>>),
    {
        let _guard = self.lock.lock().await;
        let mut items = self.read_unlocked::<T>().await;
        f(&mut items);
        self.write_unlocked(&items).await
    }

    /// Inserts `snapshot`, replacing any element with the same id in place.
    pub async fn upsert<T: SnapshotEntity>(&self, snapshot: Snapshot<T>) -> Result<(), StoreError> {
        self.update::<T, _>(|items| upsert_into(items, snapshot))
            .await
    }

    /// Swaps the element `old_id` for `snapshot`, appending if `old_id` is absent.
    pub async fn replace_item<T: SnapshotEntity>(
        &self,
        old_id: Uuid,
        snapshot: Snapshot<T>,
    ) -> Result<(), StoreError> {
        let new_id = snapshot.item.id();
        self.update::<T, _>(|items| {
            items.retain(|s| s.item.id() != old_id && s.item.id() != new_id);
            items.push(snapshot);
        })
        .await
    }

    /// Empties the collection for `T`.
    pub async fn clear<T: SnapshotEntity>(&self) -> Result<(), StoreError> {
        self.save::<T>(&[]).await
    }

    /// Removes every snapshot file. Returns the number of files removed.
    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut removed = 0;
        for kind in SnapshotKind::ALL {
            if remove_if_exists(&self.path(kind)).await? {
                removed += 1;
            }
        }
        debug!(removed, "Cleared snapshot cache");
        Ok(removed)
    }

    async fn read_unlocked<T: SnapshotEntity>(&self) -> Vec<Snapshot<T>> {
        let kind = T::KIND;
        let path = self.path(kind);
        let bytes = match read_optional(&path).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(kind = %kind, "No snapshot on disk");
                return Vec::new();
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Failed to read snapshot, using empty");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    kind = %kind,
                    path = %path.display(),
                    error = %e,
                    "Corrupt snapshot file, using empty"
                );
                Vec::new()
            }
        }
    }

    async fn write_unlocked<T: SnapshotEntity>(
        &self,
        items: &[Snapshot<T>],
    ) -> Result<(), StoreError> {
        let kind = T::KIND;
        let bytes = serde_json::to_vec(items).map_err(|source| StoreError::Encode {
            what: kind.name(),
            source,
        })?;
        write_atomic(&self.path(kind), &bytes).await?;
        debug!(kind = %kind, count = items.len(), "Saved snapshot");
        Ok(())
    }
}

pub(crate) fn upsert_into<T: SnapshotEntity>(items: &mut Vec<Snapshot<T>>, snapshot: Snapshot<T>) {
    match items
        .iter_mut()
        .find(|s| s.item.id() == snapshot.item.id())
    {
        Some(existing) => *existing = snapshot,
        None => items.push(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::{MealLog, MealType, Role, SystemSettings, User};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    fn test_store() -> (SnapshotStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    async fn save_confirmed<T: SnapshotEntity>(store: &SnapshotStore, items: Vec<T>) {
        let now = Utc::now();
        let snapshots: Vec<_> = items
            .into_iter()
            .map(|item| Snapshot::confirmed(item, now))
            .collect();
        store.save(&snapshots).await.unwrap();
    }

    fn meal(quantity: u32) -> MealLog {
        MealLog {
            id: Uuid::new_v4(),
            meal_type: MealType::Lunch,
            quantity,
            served_at: Utc::now(),
            terminal_id: Some("kitchen".to_string()),
            notes: None,
            operation_id: None,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let (store, _temp) = test_store();
        let now = Utc::now();
        let users = vec![
            Snapshot::confirmed(User::new("Ana", Role::Member), now),
            Snapshot::optimistic(User::new("Ben", Role::Kiosk).with_unit("Station 4")),
        ];

        store.save(&users).await.unwrap();

        assert_eq!(store.load::<User>().await, users);
    }

    #[tokio::test]
    async fn test_load_missing_returns_empty() {
        let (store, _temp) = test_store();
        assert!(store.load::<User>().await.is_empty());
        assert!(store.load::<SystemSettings>().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_returns_empty() {
        let (store, _temp) = test_store();
        std::fs::write(store.path(SnapshotKind::MealLogs), b"{not json").unwrap();

        assert!(store.load::<MealLog>().await.is_empty());
    }

    #[tokio::test]
    async fn test_collections_are_independent() {
        let (store, _temp) = test_store();
        save_confirmed(&store, vec![User::new("Ana", Role::Admin)]).await;
        save_confirmed(&store, vec![meal(3), meal(4)]).await;

        store.clear::<MealLog>().await.unwrap();

        assert!(store.load::<MealLog>().await.is_empty());
        assert_eq!(store.load::<User>().await.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_appends_then_patches() {
        let (store, _temp) = test_store();
        let mut log = meal(2);

        store.upsert(Snapshot::optimistic(log.clone())).await.unwrap();
        log.quantity = 5;
        store
            .upsert(Snapshot::confirmed(log.clone(), Utc::now()))
            .await
            .unwrap();

        let loaded = store.load::<MealLog>().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].item.quantity, 5);
        assert!(loaded[0].is_confirmed());
    }

    #[tokio::test]
    async fn test_replace_item_swaps_local_for_server_record() {
        let (store, _temp) = test_store();
        let local = meal(1);
        let other = meal(9);
        store
            .save(&[
                Snapshot::optimistic(local.clone()),
                Snapshot::confirmed(other.clone(), Utc::now()),
            ])
            .await
            .unwrap();

        let server = MealLog {
            id: Uuid::new_v4(),
            ..local.clone()
        };
        store
            .replace_item(local.id, Snapshot::confirmed(server.clone(), Utc::now()))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .load::<MealLog>()
            .await
            .into_iter()
            .map(|s| s.item.id)
            .collect();
        assert_eq!(ids, vec![other.id, server.id]);
    }

    #[tokio::test]
    async fn test_clear_all_removes_every_file() {
        let (store, _temp) = test_store();
        save_confirmed(&store, vec![User::new("Ana", Role::Member)]).await;
        save_confirmed(&store, vec![meal(1)]).await;

        let removed = store.clear_all().await.unwrap();

        assert_eq!(removed, 2);
        for kind in SnapshotKind::ALL {
            assert!(!store.path(kind).exists());
        }
        assert!(store.load::<User>().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_with_holds_lock_while_input_resolves() {
        let (store, _temp) = test_store();
        let store = Arc::new(store);
        let pulled = meal(1);
        let local = meal(2);
        let (tx, rx) = oneshot::channel::<()>();

        let saving = {
            let store = store.clone();
            let pulled = pulled.clone();
            tokio::spawn(async move {
                store
                    .save_with(rx, |_| vec![Snapshot::confirmed(pulled, Utc::now())])
                    .await
            })
        };
        tokio::task::yield_now().await;
        let upserting = {
            let store = store.clone();
            let local = local.clone();
            tokio::spawn(async move { store.upsert(Snapshot::optimistic(local)).await })
        };
        tokio::task::yield_now().await;
        tx.send(()).unwrap();

        saving.await.unwrap().unwrap();
        upserting.await.unwrap().unwrap();

        let ids: Vec<_> = store
            .load::<MealLog>()
            .await
            .into_iter()
            .map(|s| s.item.id)
            .collect();
        assert_eq!(ids, vec![pulled.id, local.id]);
    }
}
