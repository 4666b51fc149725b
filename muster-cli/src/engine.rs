//! Wires configuration into the core engine.

use std::sync::Arc;

use muster_core::backend::Unconfigured;
use muster_core::storage::WRITE_QUEUE_FILENAME;
use muster_core::{
    Clock, HttpBackend, OfflineGateway, SnapshotStore, SyncCoordinator, SyncDeps, SystemClock,
    WriteQueue,
};

use crate::config::Config;

/// Everything a command needs to read, write and sync.
pub struct Engine {
    /// `None` when no server is configured; writes then always queue.
    pub backend: Option<Arc<HttpBackend>>,
    pub deps: SyncDeps,
    pub coordinator: Arc<SyncCoordinator>,
    pub gateway: OfflineGateway,
}

impl Engine {
    pub async fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let data_dir = config.data_dir.value.clone();
        tokio::fs::create_dir_all(&data_dir).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let queue = WriteQueue::open(
            data_dir.join(WRITE_QUEUE_FILENAME),
            config.sync.retry_policy(),
            clock.clone(),
        )
        .await;
        let snapshots = SnapshotStore::new(data_dir);

        let backend = match (&config.sync.server_url, &config.sync.api_key) {
            (Some(url), Some(key)) => Some(Arc::new(HttpBackend::new(
                url.clone(),
                key.clone(),
                config.sync.request_timeout(),
            )?)),
            _ => None,
        };

        let deps = match &backend {
            Some(backend) => SyncDeps {
                check_ins: backend.clone(),
                meals: backend.clone(),
                remote: backend.clone(),
                queue: Arc::new(queue),
                snapshots: Arc::new(snapshots),
                clock,
            },
            None => {
                let offline = Arc::new(Unconfigured);
                SyncDeps {
                    check_ins: offline.clone(),
                    meals: offline.clone(),
                    remote: offline,
                    queue: Arc::new(queue),
                    snapshots: Arc::new(snapshots),
                    clock,
                }
            }
        };

        let coordinator = Arc::new(SyncCoordinator::new(deps.clone()));
        let gateway = OfflineGateway::new(deps.clone());

        Ok(Self {
            backend,
            deps,
            coordinator,
            gateway,
        })
    }
}
