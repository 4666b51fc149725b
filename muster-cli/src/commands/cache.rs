use clap::{Args, Subcommand};
use muster_core::{
    CheckIn, MealLog, Operation, Snapshot, SnapshotEntity, SnapshotKind, SystemSettings, User,
};

use super::{short_id, sync_marker, OutputFormat};
use crate::engine::Engine;

#[derive(Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand)]
pub enum CacheSubcommand {
    /// Show a cached collection without contacting the server
    Show {
        /// Collection (users, operations, check-ins, meal-logs, settings)
        kind: SnapshotKind,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl CacheCommand {
    pub async fn run(&self, engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            CacheSubcommand::Show { kind, format } => {
                let gateway = &engine.gateway;
                match kind {
                    SnapshotKind::Users => {
                        show(&gateway.cached::<User>().await, *format, |u| {
                            format!("{} ({})", u.display_name, u.role)
                        })
                    }
                    SnapshotKind::Operations => {
                        show(&gateway.cached::<Operation>().await, *format, |o| {
                            let state = if o.is_active() { "active" } else { "ended" };
                            format!("{} [{}]", o.name, state)
                        })
                    }
                    SnapshotKind::CheckIns => {
                        show(&gateway.cached::<CheckIn>().await, *format, |c| {
                            let state = if c.is_open() { "in" } else { "out" };
                            format!("user {} [{}]", short_id(&c.user_id), state)
                        })
                    }
                    SnapshotKind::MealLogs => {
                        show(&gateway.cached::<MealLog>().await, *format, |m| m.to_string())
                    }
                    SnapshotKind::SystemSettings => {
                        show(&gateway.cached::<SystemSettings>().await, *format, |s| {
                            format!(
                                "{} (meals: {}, overnight: {})",
                                s.organization_name.as_deref().unwrap_or("unnamed"),
                                s.meal_tracking_enabled,
                                s.overnight_enabled
                            )
                        })
                    }
                }
            }
        }
    }
}

fn show<T: SnapshotEntity>(
    items: &[Snapshot<T>],
    format: OutputFormat,
    describe: impl Fn(&T) -> String,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No cached {}.", T::KIND.name());
                return Ok(());
            }
            for snapshot in items {
                println!(
                    "  {} {}{}",
                    short_id(&snapshot.item.id()),
                    describe(&snapshot.item),
                    sync_marker(snapshot.is_confirmed())
                );
            }
        }
    }
    Ok(())
}
