use chrono::{Local, Utc};
use clap::{Args, Subcommand};
use muster_core::{MealLog, MealLogRequest, MealType, Snapshot, WriteOutcome};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{short_id, sync_marker, OutputFormat};
use crate::config::Config;
use crate::engine::Engine;

#[derive(Args)]
pub struct MealCommand {
    #[command(subcommand)]
    pub command: MealSubcommand,
}

#[derive(Subcommand)]
pub enum MealSubcommand {
    /// Log meals served
    Log {
        /// Meal type (breakfast, lunch, dinner, snack)
        #[arg(long = "type", short = 't', value_name = "TYPE")]
        meal_type: MealType,

        /// Number of meals served
        #[arg(long, short, default_value_t = 1)]
        quantity: u32,

        /// Person the meals were served to (UUID)
        #[arg(long)]
        user: Option<Uuid>,

        /// Operation the meals belong to (UUID)
        #[arg(long)]
        operation: Option<Uuid>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List cached meal logs
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl MealCommand {
    pub async fn run(
        &self,
        engine: &Engine,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MealSubcommand::Log {
                meal_type,
                quantity,
                user,
                operation,
                notes,
            } => {
                if *quantity == 0 {
                    return Err("Quantity must be at least 1".into());
                }
                let mut request = MealLogRequest::new(*meal_type, *quantity, Utc::now());
                request.terminal_id = config.terminal_id.value.clone();
                request.user_id = *user;
                request.operation_id = *operation;
                request.notes = notes.clone();

                match engine.gateway.log_meal(request).await? {
                    WriteOutcome::Sent(log) => {
                        println!("Logged {}: {}", log, log.id);
                    }
                    WriteOutcome::Queued { entry_id, local } => {
                        println!("Logged {} offline: {}", local, local.id);
                        println!("  Queued as {} for the next sync.", short_id(&entry_id));
                    }
                }
                Ok(())
            }

            MealSubcommand::List { format } => {
                let fetched = engine.gateway.meal_logs().await;
                let mut items = fetched.items;
                items.sort_by(|a, b| b.item.served_at.cmp(&a.item.served_at));

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&items)?);
                    }
                    OutputFormat::Text => {
                        if fetched.stale {
                            println!("(offline: showing cached data)\n");
                        }
                        if items.is_empty() {
                            println!("No meal logs found.");
                            return Ok(());
                        }
                        print_by_day(&items);
                    }
                }
                Ok(())
            }
        }
    }
}

fn print_by_day(items: &[Snapshot<MealLog>]) {
    let mut by_day: BTreeMap<_, Vec<&Snapshot<MealLog>>> = BTreeMap::new();
    for snapshot in items {
        let day = snapshot.item.served_at.with_timezone(&Local).date_naive();
        by_day.entry(day).or_default().push(snapshot);
    }

    for (day, logs) in by_day.iter().rev() {
        let total: u32 = logs.iter().map(|s| s.item.quantity).sum();
        println!("{} ({} served)", day.format("%Y-%m-%d"), total);
        for snapshot in logs {
            let log = &snapshot.item;
            println!(
                "  {} {} {} x{}{}",
                short_id(&log.id),
                log.served_at.with_timezone(&Local).format("%H:%M"),
                log.meal_type,
                log.quantity,
                sync_marker(snapshot.is_confirmed())
            );
        }
        println!();
    }
}
