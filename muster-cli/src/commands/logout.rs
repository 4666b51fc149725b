use clap::Args;

use crate::engine::Engine;

/// Clear cached server data from this terminal
#[derive(Args)]
pub struct LogoutCommand {}

impl LogoutCommand {
    pub async fn run(&self, engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
        let removed = engine.deps.snapshots.clear_all().await?;
        println!("Cleared {} cached collection(s).", removed);

        let outstanding = engine.deps.queue.outstanding().await.len();
        if outstanding > 0 {
            println!(
                "{} write(s) are still queued and will be sent on the next sync.",
                outstanding
            );
        }
        Ok(())
    }
}
