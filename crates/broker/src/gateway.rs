//! The capability surface the stop-loss monitor needs from a broker.

use std::time::Duration;

use async_trait::async_trait;

use stopguard_core::Contract;

use crate::error::Result;
use crate::types::{OpenOrder, OrderId, OrderRequest, OrderState, Position, QuoteHandle};

/// Narrow broker interface consumed by the monitor.
///
/// Every call that can observe fresher state must fetch it from the broker;
/// implementations must not rely on the caller to pump an event loop.
///
/// # Resource pairing
///
/// Each successful [`subscribe_quote`](Self::subscribe_quote) must be matched
/// by exactly one [`unsubscribe_quote`](Self::unsubscribe_quote), including on
/// error paths. Market-data lines are rate limited by the broker.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Re-establish a dropped session.
    async fn reconnect(&self) -> Result<()>;

    /// All positions in the session's accounts, including zero-quantity rows.
    async fn list_open_positions(&self) -> Result<Vec<Position>>;

    async fn list_open_orders(&self) -> Result<Vec<OpenOrder>>;

    /// Resolve a contract to its broker identity. Idempotent.
    async fn qualify_contract(&self, contract: &Contract) -> Result<Contract>;

    async fn subscribe_quote(&self, contract: &Contract) -> Result<QuoteHandle>;

    /// Latest best bid, raw. May be `None`, `NaN` or non-positive.
    async fn read_bid(&self, handle: QuoteHandle) -> Result<Option<f64>>;

    async fn unsubscribe_quote(&self, handle: QuoteHandle) -> Result<()>;

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId>;

    async fn cancel_order(&self, order_id: OrderId) -> Result<()>;

    async fn order_status(&self, order_id: OrderId) -> Result<OrderState>;

    /// Yield for `duration` while the gateway keeps processing updates.
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn disconnect(&self) -> Result<()>;
}
