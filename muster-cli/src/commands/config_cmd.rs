use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# muster configuration

# Directory for cached data and the offline write queue
# (default: platform data directory + /muster)
# data_dir: ~/.local/share/muster

# Identifier stamped on check-ins and meal logs from this terminal
# terminal_id: front-desk

sync:
  # server_url: "https://muster.example.org"
  # api_key: "<key>"
  auto_sync: false
  # Failed replays before a queued write is parked
  max_retries: 3
  # Retry delay doubles from this base: 1s, 2s, 4s, ...
  backoff_unit_secs: 1
  # Drop parked writes after this many hours (unset keeps them)
  # failed_retention_hours: 72
  interval_secs: 300
  request_timeout_secs: 15
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_config(config),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'muster config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

fn print_config(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    if let Some(path) = &config.config_file {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        );
    }
    println!();

    println!("data_dir: {}", config.data_dir.value.display());
    println!("  source: {}", config.data_dir.source);
    println!();

    println!(
        "terminal_id: {}",
        config.terminal_id.value.as_deref().unwrap_or("(none)")
    );
    println!("  source: {}", config.terminal_id.source);
    println!();

    let sync = &config.sync;
    println!("sync:");
    println!(
        "  server_url: {}",
        sync.server_url.as_deref().unwrap_or("(none)")
    );
    println!(
        "  api_key: {}",
        if sync.api_key.is_some() { "(set)" } else { "(none)" }
    );
    println!("  auto_sync: {}", sync.auto_sync);
    println!("  max_retries: {}", sync.max_retries);
    println!("  backoff_unit_secs: {}", sync.backoff_unit_secs);
    match sync.failed_retention_hours {
        Some(hours) => println!("  failed_retention_hours: {}", hours),
        None => println!("  failed_retention_hours: (keep until cleared)"),
    }
    println!("  interval_secs: {}", sync.interval_secs);
    println!("  request_timeout_secs: {}", sync.request_timeout_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_template_parses() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, DEFAULT_CONFIG).unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert!(!config.sync.auto_sync);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.interval_secs, 300);
    }

    #[test]
    fn test_init_writes_to_given_path() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.yaml");
        let config = Config::load(Some(config_path.clone())).unwrap();

        let cmd = ConfigCommand {
            command: ConfigSubcommand::Init,
        };
        cmd.run(&config, Some(config_path.clone())).unwrap();

        assert_eq!(fs::read_to_string(&config_path).unwrap(), DEFAULT_CONFIG);
    }
}
