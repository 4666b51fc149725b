//! Sync CLI commands for synchronizing with the server.

use chrono::{DateTime, Local, Utc};
use clap::{Args, Subcommand};
use muster_core::{
    CheckIn, MealLog, Operation, RealtimeListener, SnapshotEntity, SnapshotStore, SyncEvent,
    SyncEventKind, SyncOutcome, SystemSettings, User,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::Engine;

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, server status and queue state
    Status,

    /// Keep syncing periodically and on server changes until Ctrl-C
    Watch,
}

impl SyncCommand {
    pub async fn run(&self, engine: &Engine, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(engine, config).await,
            Some(SyncSubcommand::Status) => self.status(engine, config).await,
            Some(SyncSubcommand::Watch) => self.watch(engine, config).await,
        }
    }

    async fn sync(&self, engine: &Engine, config: &Config) -> Result<(), SyncCommandError> {
        if !config.sync.is_configured() {
            return Err(SyncCommandError::NotConfigured);
        }

        println!("Syncing with server...");
        println!();

        let printer = tokio::spawn(print_events(engine.coordinator.subscribe(), true));
        let outcome = engine.coordinator.sync_now("manual").await;
        if outcome == SyncOutcome::AlreadyRunning {
            printer.abort();
        } else {
            let _ = printer.await;
        }

        println!();
        match outcome {
            SyncOutcome::Completed => {
                let failed = engine.deps.queue.failed_writes().await.len();
                if failed > 0 {
                    println!("Sync complete. {} write(s) need attention, see 'muster queue list'.", failed);
                } else {
                    println!("Sync complete.");
                }
                Ok(())
            }
            SyncOutcome::Failed { step, error } => Err(SyncCommandError::StepFailed { step, error }),
            SyncOutcome::Cancelled => {
                println!("Sync cancelled.");
                Ok(())
            }
            SyncOutcome::AlreadyRunning => {
                println!("A sync is already running.");
                Ok(())
            }
        }
    }

    async fn status(&self, engine: &Engine, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        match (&config.sync.server_url, &engine.backend) {
            (Some(server_url), Some(backend)) => {
                println!("Server:    {}", server_url);
                println!(
                    "Auto-sync: {}",
                    if config.sync.auto_sync {
                        "enabled"
                    } else {
                        "disabled"
                    }
                );
                println!();

                print!("Server status: ");
                if backend.ping().await {
                    println!("✓ connected");
                    match backend.identity().await {
                        Ok(identity) => println!(
                            "Signed in as:  {} ({})",
                            identity.display_name.as_deref().unwrap_or("unnamed"),
                            identity.role
                        ),
                        Err(e) => println!("Signed in as:  ✗ {}", e),
                    }
                } else {
                    println!("✗ unreachable");
                }
            }
            _ => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"http://localhost:8080\"");
                println!("    api_key: \"<key>\"");
                println!();
                println!("Or set environment variables:");
                println!("  MUSTER_SYNC_URL, MUSTER_SYNC_API_KEY");
            }
        }

        println!();
        println!("Write queue");
        let queue = &engine.deps.queue;
        let outstanding = queue.outstanding().await.len();
        let failed = queue.failed_writes().await.len();
        println!("  pending: {}", outstanding);
        println!("  failed:  {}", failed);

        println!();
        println!("Cached data");
        let store = &engine.deps.snapshots;
        print_cache_line::<User>(store).await;
        print_cache_line::<Operation>(store).await;
        print_cache_line::<CheckIn>(store).await;
        print_cache_line::<MealLog>(store).await;
        print_cache_line::<SystemSettings>(store).await;

        Ok(())
    }

    async fn watch(&self, engine: &Engine, config: &Config) -> Result<(), SyncCommandError> {
        let (Some(server_url), Some(api_key)) = (&config.sync.server_url, &config.sync.api_key)
        else {
            return Err(SyncCommandError::NotConfigured);
        };

        let token = CancellationToken::new();
        let printer = tokio::spawn(print_events(engine.coordinator.subscribe(), false));
        let periodic = engine
            .coordinator
            .spawn_periodic(config.sync.interval(), token.clone());
        let realtime = RealtimeListener::new(server_url, api_key, engine.coordinator.clone())
            .spawn(token.clone());

        println!(
            "Watching for changes (every {}s and on server push). Press Ctrl-C to stop.",
            config.sync.interval().as_secs()
        );

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| SyncCommandError::RuntimeError(e.to_string()))?;

        token.cancel();
        engine.coordinator.cancel();
        let _ = periodic.await;
        let _ = realtime.await;
        printer.abort();
        println!("Stopped.");
        Ok(())
    }
}

/// Prints events as they arrive. With `single_run`, returns after the first
/// run ends.
async fn print_events(mut rx: broadcast::Receiver<SyncEvent>, single_run: bool) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        };
        let ended = matches!(
            event.kind,
            SyncEventKind::Finished { .. } | SyncEventKind::Cancelled
        );
        print_event(&event, single_run);
        if ended && single_run {
            return;
        }
    }
}

fn print_event(event: &SyncEvent, single_run: bool) {
    let step = event.step.as_deref().unwrap_or("");
    match event.kind {
        SyncEventKind::Started if !single_run => println!(
            "[{}] sync started ({})",
            local_time(event.at),
            event.message.as_deref().unwrap_or("")
        ),
        SyncEventKind::StepSucceeded => println!("  ✓ {}", step),
        SyncEventKind::StepFailed => println!(
            "  ✗ {} - {}",
            step,
            event.message.as_deref().unwrap_or("failed")
        ),
        SyncEventKind::Cancelled => println!("  - cancelled before {}", step),
        SyncEventKind::Finished { failed } if !single_run => println!(
            "[{}] sync {}",
            local_time(event.at),
            if failed { "failed" } else { "finished" }
        ),
        _ => {}
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

async fn print_cache_line<T: SnapshotEntity>(store: &SnapshotStore) {
    let items = store.load::<T>().await;
    let unsynced = items.iter().filter(|s| !s.is_confirmed()).count();
    let last = items.iter().filter_map(|s| s.synced_at).max();
    let kind = T::KIND;
    println!(
        "  {:<11} {:>4} item(s), {} unsynced, last synced {}",
        kind.name(),
        items.len(),
        unsynced,
        last.map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    StepFailed { step: String, error: String },
    RuntimeError(String),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => write!(
                f,
                "Sync is not configured. Set sync.server_url and sync.api_key, see 'muster sync status'."
            ),
            SyncCommandError::StepFailed { step, error } => {
                write!(f, "Sync failed at {}: {}", step, error)
            }
            SyncCommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SyncCommandError::StepFailed {
            step: "pull_users".to_string(),
            error: "Network error: timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Sync failed at pull_users: Network error: timed out"
        );
        assert!(SyncCommandError::NotConfigured
            .to_string()
            .contains("not configured"));
    }
}
