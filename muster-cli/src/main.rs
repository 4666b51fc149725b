use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod engine;
mod sync;

use commands::{
    CacheCommand, CheckinCommand, CheckinSubcommand, ConfigCommand, LogoutCommand, MealCommand,
    MealSubcommand, QueueCommand, SyncCommand,
};
use config::Config;
use engine::Engine;
use sync::try_auto_sync;

#[derive(Parser)]
#[command(name = "muster")]
#[command(version)]
#[command(about = "Check-in and meal logging terminal with offline sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check people in and out
    Checkin(CheckinCommand),

    /// Log and list meals served
    Meal(MealCommand),

    /// Sync with remote server
    Sync(SyncCommand),

    /// Inspect and repair queued offline writes
    Queue(QueueCommand),

    /// Show locally cached data
    Cache(CacheCommand),

    /// Clear cached data from this terminal
    Logout(LogoutCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so command output stays clean. `MUSTER_LOG` takes
/// precedence over `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("MUSTER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "muster=warn,muster_core=warn".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;

    // Config commands must work even when the data directory is unusable.
    if let Some(Commands::Config(cmd)) = &cli.command {
        return cmd.run(&config, cli_config_path);
    }
    let Some(command) = &cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let engine = Engine::open(&config).await?;

        // Auto-sync BEFORE read commands
        if is_read_command(command) {
            try_auto_sync(&engine, &config).await;
        }

        let result = execute_command(command, &engine, &config).await;

        // Auto-sync AFTER write commands (only if command succeeded)
        if result.is_ok() && is_write_command(command) {
            try_auto_sync(&engine, &config).await;
        }

        result
    })
}

async fn execute_command(
    command: &Commands,
    engine: &Engine,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Checkin(cmd) => cmd.run(engine, config).await,
        Commands::Meal(cmd) => cmd.run(engine, config).await,
        Commands::Sync(cmd) => Ok(cmd.run(engine, config).await?),
        Commands::Queue(cmd) => cmd.run(engine).await,
        Commands::Cache(cmd) => cmd.run(engine).await,
        Commands::Logout(cmd) => cmd.run(engine).await,
        Commands::Config(_) => Ok(()),
    }
}

/// Returns true if the command is a read operation that should sync before execution.
fn is_read_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Checkin(c) if matches!(c.command, CheckinSubcommand::List { .. })
    ) || matches!(
        cmd,
        Commands::Meal(m) if matches!(m.command, MealSubcommand::List { .. })
    )
}

/// Returns true if the command is a write operation that should sync after execution.
fn is_write_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Checkin(c) if matches!(c.command,
            CheckinSubcommand::In { .. } | CheckinSubcommand::Out { .. })
    ) || matches!(
        cmd,
        Commands::Meal(m) if matches!(m.command, MealSubcommand::Log { .. })
    )
}
