//! Error types for broker gateway calls.

use thiserror::Error;

use crate::types::{OrderId, QuoteHandle};

/// Errors a broker gateway can report.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway session is down.
    #[error("not connected to broker gateway")]
    NotConnected,

    /// Connecting or reconnecting failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker could not resolve the contract.
    #[error("qualification failed for {contract}: {reason}")]
    Qualification {
        /// Contract description.
        contract: String,
        /// Broker message.
        reason: String,
    },

    /// Market data request failed.
    #[error("market data error: {0}")]
    MarketData(String),

    /// No live subscription for the handle.
    #[error("unknown quote subscription: {handle}")]
    UnknownSubscription {
        /// The handle that was not found.
        handle: QuoteHandle,
    },

    /// Order rejected by the broker.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Order not found.
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// The order ID that was not found.
        order_id: OrderId,
    },

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),
}

impl GatewayError {
    /// Creates a qualification error.
    pub fn qualification(contract: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Qualification {
            contract: contract.into(),
            reason: reason.into(),
        }
    }

    /// Creates an order not found error.
    pub fn order_not_found(order_id: OrderId) -> Self {
        Self::OrderNotFound { order_id }
    }

    /// Returns true if the error means the session itself is unusable.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Connection(_) | Self::Timeout(_)
        )
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
