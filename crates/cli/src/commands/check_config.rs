//! Print the effective configuration.

use anyhow::{Context, Result};
use clap::Args;

use stopguard_core::config_loader::DEFAULT_CONFIG_PATH;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

/// Loads, validates and prints the merged config (file + environment) as JSON.
pub fn run(args: &CheckConfigArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let json =
        serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("{json}");
    Ok(())
}
