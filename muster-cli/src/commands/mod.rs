use clap::ValueEnum;

mod cache;
mod checkin;
mod config_cmd;
mod logout;
mod meal;
mod queue;
mod sync_cmd;

pub use cache::CacheCommand;
pub use checkin::{CheckinCommand, CheckinSubcommand};
pub use config_cmd::ConfigCommand;
pub use logout::LogoutCommand;
pub use meal::{MealCommand, MealSubcommand};
pub use queue::QueueCommand;
pub use sync_cmd::SyncCommand;

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Marker shown next to records the server has not confirmed yet.
pub(crate) fn sync_marker(synced: bool) -> &'static str {
    if synced {
        ""
    } else {
        " (unsynced)"
    }
}

pub(crate) fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}
