use chrono::Local;
use clap::{Args, Subcommand};
use muster_core::{CheckIn, CheckInRequest, Role, Snapshot, WriteOutcome};
use uuid::Uuid;

use super::{short_id, sync_marker, OutputFormat};
use crate::config::Config;
use crate::engine::Engine;

#[derive(Args)]
pub struct CheckinCommand {
    #[command(subcommand)]
    pub command: CheckinSubcommand,
}

#[derive(Subcommand)]
pub enum CheckinSubcommand {
    /// Check a person in to an operation
    In {
        /// User ID (UUID)
        #[arg(long)]
        user: Uuid,

        /// Operation ID (UUID)
        #[arg(long)]
        operation: Uuid,

        /// Role held for this check-in (admin, supervisor, member, kiosk)
        #[arg(long)]
        role: Option<Role>,

        #[arg(long)]
        notes: Option<String>,

        /// Staying overnight
        #[arg(long)]
        overnight: bool,
    },

    /// Check a person out
    Out {
        /// Check-in ID (UUID)
        id: Uuid,

        /// Note recorded with the check-out
        #[arg(long)]
        note: Option<String>,
    },

    /// List cached check-ins
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only show people still checked in
        #[arg(long)]
        open: bool,
    },
}

impl CheckinCommand {
    pub async fn run(
        &self,
        engine: &Engine,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            CheckinSubcommand::In {
                user,
                operation,
                role,
                notes,
                overnight,
            } => {
                let mut request = CheckInRequest::new(*user, *operation).overnight(*overnight);
                if let Some(terminal) = &config.terminal_id.value {
                    request = request.with_terminal(terminal.clone());
                }
                if let Some(role) = role {
                    request = request.with_role(*role);
                }
                if let Some(notes) = notes {
                    request = request.with_notes(notes.clone());
                }

                let outcome = engine.gateway.check_in(request).await?;
                report("Checked in", &outcome);
                Ok(())
            }

            CheckinSubcommand::Out { id, note } => {
                let outcome = engine.gateway.check_out(*id, note.clone()).await?;
                report("Checked out", &outcome);
                Ok(())
            }

            CheckinSubcommand::List { format, open } => {
                let fetched = engine.gateway.check_ins().await;
                let mut items: Vec<Snapshot<CheckIn>> = fetched
                    .items
                    .into_iter()
                    .filter(|s| !*open || s.item.is_open())
                    .collect();
                items.sort_by(|a, b| b.item.checked_in_at.cmp(&a.item.checked_in_at));

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&items)?);
                    }
                    OutputFormat::Text => {
                        if fetched.stale {
                            println!("(offline: showing cached data)\n");
                        }
                        if items.is_empty() {
                            println!("No check-ins found.");
                            return Ok(());
                        }
                        for snapshot in &items {
                            print_check_in(snapshot);
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn report(action: &str, outcome: &WriteOutcome<CheckIn>) {
    match outcome {
        WriteOutcome::Sent(check_in) => {
            println!("{}: {}", action, check_in.id);
        }
        WriteOutcome::Queued { entry_id, local } => {
            println!("{} offline: {}", action, local.id);
            println!("  Queued as {} for the next sync.", short_id(entry_id));
        }
    }
}

fn print_check_in(snapshot: &Snapshot<CheckIn>) {
    let c = &snapshot.item;
    let checked_in = c.checked_in_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    let status = match c.checked_out_at {
        Some(at) => format!("out {}", at.with_timezone(&Local).format("%H:%M")),
        None => "in".to_string(),
    };
    println!(
        "  {} {} user {} [{}]{}{}",
        short_id(&c.id),
        checked_in,
        short_id(&c.user_id),
        status,
        if c.overnight { " overnight" } else { "" },
        sync_marker(snapshot.is_confirmed())
    );
    if let Some(notes) = &c.notes {
        println!("      {}", notes);
    }
}
