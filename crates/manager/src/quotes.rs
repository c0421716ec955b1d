//! Bounded bid sampling.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use stopguard_broker::error::Result;
use stopguard_broker::BrokerGateway;
use stopguard_core::{Contract, QuoteConfig};

/// Samples one valid bid per call and always releases its subscription.
#[derive(Debug, Clone, Copy)]
pub struct QuoteSampler {
    retries: u32,
    pause: Duration,
}

impl QuoteSampler {
    pub fn new(retries: u32, pause: Duration) -> Self {
        Self {
            retries: retries.max(1),
            pause,
        }
    }

    pub fn from_config(config: &QuoteConfig) -> Self {
        Self::new(config.retries, config.pause())
    }

    /// Fetch a valid bid for `contract`.
    ///
    /// Reads up to `retries` times, pausing between attempts. `Ok(None)`
    /// means no valid bid was seen. The subscription is cancelled exactly
    /// once whatever the outcome.
    pub async fn sample(
        &self,
        gateway: &dyn BrokerGateway,
        contract: &Contract,
    ) -> Result<Option<Decimal>> {
        let handle = gateway.subscribe_quote(contract).await?;
        let outcome = self.poll(gateway, handle).await;

        if let Err(e) = gateway.unsubscribe_quote(handle).await {
            tracing::warn!(
                symbol = %contract.symbol,
                %handle,
                error = %e,
                "Failed to cancel quote subscription"
            );
        }

        let bid = outcome?;
        if bid.is_none() {
            tracing::warn!(
                symbol = %contract.symbol,
                attempts = self.retries,
                "No valid bid"
            );
        }
        Ok(bid)
    }

    async fn poll(
        &self,
        gateway: &dyn BrokerGateway,
        handle: stopguard_broker::QuoteHandle,
    ) -> Result<Option<Decimal>> {
        for attempt in 1..=self.retries {
            let raw = gateway.read_bid(handle).await?;
            if let Some(bid) = valid_price(raw) {
                return Ok(Some(bid));
            }
            tracing::debug!(attempt, ?raw, "Invalid bid, retrying");
            if attempt < self.retries {
                gateway.sleep(self.pause).await;
            }
        }
        Ok(None)
    }
}

/// Convert a raw broker price into a usable one.
///
/// Rejects absent, non-finite and non-positive values. Parsing goes through
/// the shortest decimal representation so `1.8` stays `1.8`.
pub fn valid_price(raw: Option<f64>) -> Option<Decimal> {
    let raw = raw?;
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    Decimal::from_str(&raw.to_string())
        .ok()
        .filter(|price| *price > Decimal::ZERO)
}
