//! Auto-sync functionality for CLI commands.
//!
//! Syncs before read commands and after successful write commands when
//! `auto_sync` is enabled in the configuration.

use muster_core::SyncOutcome;
use tracing::debug;

use crate::config::Config;
use crate::engine::Engine;

/// Runs one sync if auto-sync is enabled and the server is reachable.
///
/// Failures are reported on stderr and otherwise ignored: the terminal keeps
/// working offline and queued writes wait for the next sync.
pub async fn try_auto_sync(engine: &Engine, config: &Config) {
    if !config.sync.auto_sync {
        return;
    }
    let Some(backend) = &engine.backend else {
        return;
    };

    // Check server reachability first (fast fail)
    if !backend.ping().await {
        eprintln!("Auto-sync: server unreachable, skipping");
        return;
    }

    match engine.coordinator.sync_now("auto").await {
        SyncOutcome::Completed => debug!("Auto-sync finished"),
        SyncOutcome::Failed { step, error } => {
            eprintln!("Auto-sync: {} failed: {}", step, error);
        }
        SyncOutcome::Cancelled | SyncOutcome::AlreadyRunning => {}
    }
}
