//! Inspecting and repairing the offline write queue.

use chrono::Local;
use clap::{Args, Subcommand};
use muster_core::{QueuedWrite, WriteIntent, WriteStatus};
use uuid::Uuid;

use super::{short_id, OutputFormat};
use crate::engine::Engine;

#[derive(Args)]
pub struct QueueCommand {
    #[command(subcommand)]
    pub command: QueueSubcommand,
}

#[derive(Subcommand)]
pub enum QueueSubcommand {
    /// List queued writes
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Discard writes that exhausted their retries or were rejected
    ClearFailed,

    /// Give a failed write a fresh set of retries
    Retry {
        /// Queue entry ID (UUID)
        id: Uuid,
    },
}

impl QueueCommand {
    pub async fn run(&self, engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
        let queue = &engine.deps.queue;
        match &self.command {
            QueueSubcommand::List { format } => {
                let entries = queue.entries().await;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&entries)?);
                    }
                    OutputFormat::Text => {
                        if entries.is_empty() {
                            println!("Write queue is empty.");
                            return Ok(());
                        }
                        for entry in &entries {
                            print_entry(entry, queue.policy());
                        }
                    }
                }
                Ok(())
            }

            QueueSubcommand::ClearFailed => {
                let removed = queue.clear_failed().await?;
                println!("Removed {} failed write(s).", removed);
                Ok(())
            }

            QueueSubcommand::Retry { id } => {
                let Some(entry) = queue.get(*id).await else {
                    return Err(format!("No queued write with ID {}", id).into());
                };
                if entry.status != WriteStatus::Failed {
                    println!("Write {} is not failed; nothing to do.", short_id(id));
                    return Ok(());
                }
                queue.retry_failed(*id).await?;
                println!("Write {} will be retried on the next sync.", short_id(id));
                Ok(())
            }
        }
    }
}

fn describe(intent: &WriteIntent) -> String {
    match intent {
        WriteIntent::CheckIn(req) => format!("check in user {}", short_id(&req.user_id)),
        WriteIntent::CheckOut(req) => format!("check out {}", short_id(&req.check_in_id)),
        WriteIntent::MealLog(req) => format!("log {} x{}", req.meal_type, req.quantity),
    }
}

fn print_entry(entry: &QueuedWrite, policy: &muster_core::RetryPolicy) {
    let status = match entry.status {
        WriteStatus::Pending => "pending",
        WriteStatus::InFlight => "in flight",
        WriteStatus::Failed => "FAILED",
    };
    println!(
        "  {} {} {:<9} {} (attempts: {})",
        entry.id,
        entry.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        status,
        describe(&entry.intent),
        entry.retry_count
    );
    if let Some(error) = &entry.last_error {
        println!("      last error: {}", error);
    }
    if entry.retry_count > 0 {
        if let Some(next) = entry.next_attempt_at(policy) {
            println!(
                "      next attempt after {}",
                next.with_timezone(&Local).format("%H:%M:%S")
            );
        }
    }
}
