//! Broker gateway abstraction for options stop-loss management.
//!
//! Defines the narrow capability interface the monitor consumes
//! ([`BrokerGateway`]), the position/order/quote types that cross it, and a
//! paper trading implementation for running without a live session.

pub mod error;
pub mod gateway;
pub mod paper;
pub mod types;

pub use error::GatewayError;
pub use gateway::BrokerGateway;
pub use paper::PaperGateway;
pub use types::{
    OpenOrder, OrderId, OrderRequest, OrderSide, OrderState, OrderStatus, OrderType, Position,
    QuoteHandle,
};
