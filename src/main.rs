use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tract_mask::MaskSettings;

#[derive(Parser)]
#[command(name = "tract-mask", about = "Inspect tractography mask configurations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a mask settings file and print it back as normalised JSON
    Check {
        /// JSON file with brain_mask / seed_mask / stop_mask entries
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { config } => {
            let settings = MaskSettings::from_path(&config)
                .with_context(|| format!("failed to read mask settings from {}", config.display()))?;
            let masks = settings.build().context("invalid mask settings")?;
            for (role, mask) in masks.roles() {
                info!(role, mask = %mask.name(), "mask configured");
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}
