//! CLI commands for the stop-loss monitor.

pub mod check_config;
pub mod flatten;
pub mod run;

pub use check_config::CheckConfigArgs;
pub use flatten::FlattenArgs;
pub use run::RunArgs;

use anyhow::Result;
use tracing::info;

use stopguard_broker::PaperGateway;
use stopguard_core::{AppConfig, ConfigLoader};

/// Load and validate the config at `path`.
pub(crate) fn load_config(path: &str) -> Result<AppConfig> {
    let config = ConfigLoader::load_from(path)?;
    info!(path, "Configuration loaded");
    Ok(config)
}

/// Open the broker session described by `config`.
pub(crate) fn connect(config: &AppConfig) -> PaperGateway {
    let gateway = PaperGateway::from_config(&config.paper, config.stop_loss.multiplier);
    info!(
        account = %config.paper.account_id,
        positions = config.paper.positions.len(),
        "Paper session opened"
    );
    gateway
}
