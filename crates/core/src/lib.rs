//! Shared contract types and configuration for the stop-loss monitor.

pub mod config;
pub mod config_loader;
pub mod contract;

pub use config::{
    AccountConfig, AppConfig, ExitConfig, ExitPolicy, MonitorConfig, PaperConfig, PaperPosition,
    PrunePolicy, QuantitySource, QuoteConfig, StopLossConfig,
};
pub use config_loader::ConfigLoader;
pub use contract::{Contract, ContractId, ContractKind, OptionRight, TargetContract};
