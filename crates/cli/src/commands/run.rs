//! Long-running stop-loss monitor.

use anyhow::Result;
use clap::Args;
use tokio::sync::watch;
use tracing::{error, info, warn};

use stopguard_core::config_loader::DEFAULT_CONFIG_PATH;
use stopguard_manager::{ExitTracker, Monitor};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

/// Runs the monitor until Ctrl+C, then disconnects.
pub async fn run(args: RunArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let gateway = super::connect(&config);

    info!(
        account = ?config.account.account_id,
        stop_loss_pct = %config.stop_loss.stop_loss_pct,
        entry_price = ?config.stop_loss.entry_price,
        target = ?config.stop_loss.target,
        "Starting stop-loss monitor"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl+C received, finishing current tick");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let tracker = ExitTracker::new(config.exit.prune_policy);
    let tracker = Monitor::from_config(&config)
        .run(&gateway, tracker, shutdown_rx)
        .await?;

    info!(latched = tracker.len(), "Stop-loss monitor stopped");
    Ok(())
}
