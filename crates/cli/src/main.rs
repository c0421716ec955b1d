use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{CheckConfigArgs, FlattenArgs, RunArgs};

#[derive(Parser)]
#[command(name = "stopguard")]
#[command(about = "Stop-loss monitor and panic flatten for option positions", long_about = None)]
struct Cli {
    /// Also write logs to a timestamped file in this directory
    #[arg(long, global = true, env = "STOPGUARD_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor open option positions and exit on stop-loss breach
    Run(RunArgs),
    /// Close every option position at market
    Flatten(FlattenArgs),
    /// Load and validate the configuration, then print it as JSON
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = logging::init(cli.log_dir.as_deref())?;
    if let Some(path) = &log_file {
        tracing::info!(path = %path.display(), "Logging to file");
    }

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Flatten(args) => commands::flatten::run(args).await,
        Commands::CheckConfig(args) => commands::check_config::run(&args),
    }
}
