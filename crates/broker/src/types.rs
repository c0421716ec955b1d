//! Position, order and quote types exchanged with the broker gateway.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stopguard_core::{Contract, ContractId};

/// Broker-assigned order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for a live market-data subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteHandle(pub u64);

impl std::fmt::Display for QuoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A position as reported by the broker.
///
/// `quantity` and `average_cost` are passed through untouched: IB reports
/// fractional quantities and an average cost that already includes the
/// contract multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub account: String,
    pub contract: Contract,
    pub quantity: f64,
    pub average_cost: f64,
}

impl Position {
    pub fn contract_id(&self) -> Option<ContractId> {
        self.contract.id
    }

    pub fn is_open(&self) -> bool {
        self.quantity.is_finite() && self.quantity != 0.0
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { price: Decimal },
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MKT"),
            Self::Limit { price } => write!(f, "LMT {price}"),
        }
    }
}

/// An order to place via the gateway. Quantities are whole contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub contract: Contract,
    pub side: OrderSide,
    pub quantity: u32,
    pub order_type: OrderType,
    pub account: Option<String>,
}

impl OrderRequest {
    pub fn market(contract: Contract, side: OrderSide, quantity: u32) -> Self {
        Self {
            contract,
            side,
            quantity,
            order_type: OrderType::Market,
            account: None,
        }
    }

    pub fn market_sell(contract: Contract, quantity: u32) -> Self {
        Self::market(contract, OrderSide::Sell, quantity)
    }

    pub fn limit_sell(contract: Contract, quantity: u32, price: Decimal) -> Self {
        Self {
            contract,
            side: OrderSide::Sell,
            quantity,
            order_type: OrderType::Limit { price },
            account: None,
        }
    }

    #[must_use]
    pub fn with_account(mut self, account: Option<String>) -> Self {
        self.account = account;
        self
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Sent, not yet acknowledged.
    PendingSubmit,
    /// Working at the exchange.
    Submitted,
    PartiallyFilled,
    Filled,
    /// Cancel requested, not yet confirmed.
    PendingCancel,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Returns true if no further changes are expected.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true if the order is still live at the broker.
    #[must_use]
    pub fn is_working(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingSubmit => write!(f, "PendingSubmit"),
            Self::Submitted => write!(f, "Submitted"),
            Self::PartiallyFilled => write!(f, "PartiallyFilled"),
            Self::Filled => write!(f, "Filled"),
            Self::PendingCancel => write!(f, "PendingCancel"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Fill state of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled: u32,
    pub remaining: u32,
    pub avg_fill_price: Option<Decimal>,
}

impl OrderState {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled || (self.remaining == 0 && self.filled > 0)
    }
}

/// An order the broker still lists as open for this session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    /// Account the order was placed for, when the broker reports it.
    pub account: Option<String>,
    pub contract_id: Option<ContractId>,
    pub symbol: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub remaining: u32,
}

impl OpenOrder {
    #[must_use]
    pub fn is_working_sell(&self) -> bool {
        self.side == OrderSide::Sell && self.status.is_working()
    }

    /// True when the order may belong to `account`.
    ///
    /// No account filter matches everything; an order without an account
    /// matches any filter so it is never mistaken for someone else's.
    #[must_use]
    pub fn in_account(&self, account: Option<&str>) -> bool {
        match (account, self.account.as_deref()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }
}
