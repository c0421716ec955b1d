use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contract::{OptionRight, TargetContract};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub account: AccountConfig,
    pub stop_loss: StopLossConfig,
    pub monitor: MonitorConfig,
    pub quote: QuoteConfig,
    pub exit: ExitConfig,
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Only positions held in this account are managed. `None` = all accounts.
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopLossConfig {
    /// Exit once the loss reaches this percentage (10 = exit at -10% or worse).
    pub stop_loss_pct: Decimal,
    /// Contract multiplier used to turn broker average cost into a per-unit price.
    pub multiplier: Decimal,
    /// Restrict monitoring to one option series.
    pub target: Option<TargetContract>,
    /// Cost basis override for the target series (price paid per contract).
    pub entry_price: Option<Decimal>,
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: Decimal::from(10),
            multiplier: Decimal::from(100),
            target: None,
            entry_price: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between ticks.
    pub tick_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
        }
    }
}

impl MonitorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// Bid polls per sample.
    pub retries: u32,
    /// Pause between bid polls.
    pub pause_ms: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            pause_ms: 400,
        }
    }
}

impl QuoteConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Limit at the bid, market for whatever is left after the fill wait.
    #[default]
    LimitThenMarket,
    /// One market order for the live quantity.
    MarketOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantitySource {
    /// Re-read the position quantity right before sending.
    #[default]
    Live,
    /// Use the quantity captured at the start of the tick.
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunePolicy {
    /// Drop a latch once the position is gone or no sell order is working.
    #[default]
    EitherGone,
    /// Drop a latch only once the position is gone and no sell order is working.
    BothGone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub policy: ExitPolicy,
    pub quantity_source: QuantitySource,
    pub prune_policy: PrunePolicy,
    /// How long a limit exit may rest before falling back to market.
    pub fill_timeout_ms: u64,
    pub fill_poll_ms: u64,
    /// Pause after cancelling the limit before sending the market order.
    pub cancel_settle_ms: u64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            policy: ExitPolicy::default(),
            quantity_source: QuantitySource::default(),
            prune_policy: PrunePolicy::default(),
            fill_timeout_ms: 1_500,
            fill_poll_ms: 150,
            cancel_settle_ms: 100,
        }
    }
}

impl ExitConfig {
    pub fn fill_timeout(&self) -> Duration {
        Duration::from_millis(self.fill_timeout_ms)
    }

    pub fn fill_poll(&self) -> Duration {
        Duration::from_millis(self.fill_poll_ms)
    }

    pub fn cancel_settle(&self) -> Duration {
        Duration::from_millis(self.cancel_settle_ms)
    }
}

/// Simulated broker seed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub account_id: String,
    /// Added to every bid read (negative values walk prices down).
    pub bid_step: Decimal,
    pub positions: Vec<PaperPosition>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            account_id: "DU0000000".to_string(),
            bid_step: Decimal::ZERO,
            positions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperPosition {
    pub contract_id: i64,
    pub symbol: String,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub right: OptionRight,
    /// Signed contracts (negative = short).
    pub quantity: i64,
    /// Price paid per contract (premium, before the multiplier).
    pub entry_price: Decimal,
    pub bid: Decimal,
}

impl AppConfig {
    /// Reject values that would make the monitor misbehave.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.stop_loss.stop_loss_pct <= Decimal::ZERO {
            bail!("stop_loss.stop_loss_pct must be positive");
        }
        if self.stop_loss.stop_loss_pct >= Decimal::from(100) {
            bail!("stop_loss.stop_loss_pct must be below 100");
        }
        if self.stop_loss.multiplier <= Decimal::ZERO {
            bail!("stop_loss.multiplier must be positive");
        }
        if let Some(entry) = self.stop_loss.entry_price {
            if entry <= Decimal::ZERO {
                bail!("stop_loss.entry_price must be positive");
            }
            if self.stop_loss.target.is_none() {
                bail!("stop_loss.entry_price requires stop_loss.target");
            }
        }
        if self.monitor.tick_interval_ms == 0 {
            bail!("monitor.tick_interval_ms must be positive");
        }
        if self.quote.retries == 0 {
            bail!("quote.retries must be at least 1");
        }
        if self.exit.fill_poll_ms == 0 {
            bail!("exit.fill_poll_ms must be positive");
        }
        if self.exit.fill_poll_ms > self.exit.fill_timeout_ms {
            bail!("exit.fill_poll_ms must not exceed exit.fill_timeout_ms");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_reference_timings() {
        let config = AppConfig::default();
        assert_eq!(config.stop_loss.stop_loss_pct, dec!(10));
        assert_eq!(config.stop_loss.multiplier, dec!(100));
        assert_eq!(config.quote.retries, 3);
        assert_eq!(config.quote.pause(), Duration::from_millis(400));
        assert_eq!(config.exit.fill_timeout(), Duration::from_millis(1500));
        assert_eq!(config.exit.fill_poll(), Duration::from_millis(150));
        assert_eq!(config.exit.cancel_settle(), Duration::from_millis(100));
        assert_eq!(config.exit.policy, ExitPolicy::LimitThenMarket);
        assert_eq!(config.exit.quantity_source, QuantitySource::Live);
        assert_eq!(config.monitor.tick_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_stop() {
        let mut config = AppConfig::default();
        config.stop_loss.stop_loss_pct = dec!(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_retries() {
        let mut config = AppConfig::default();
        config.quote.retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn entry_price_needs_target() {
        let mut config = AppConfig::default();
        config.stop_loss.entry_price = Some(dec!(11.40));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("target"));

        config.stop_loss.target = Some(TargetContract {
            symbol: "TSLA".to_string(),
            expiry: NaiveDate::from_ymd_opt(2025, 7, 25).unwrap(),
            strike: dec!(330),
            right: OptionRight::Put,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn poll_longer_than_timeout_is_rejected() {
        let mut config = AppConfig::default();
        config.exit.fill_poll_ms = 2_000;
        assert!(config.validate().is_err());
    }
}
