//! Types for stop-loss position management.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stopguard_broker::OrderId;
use stopguard_core::{Contract, ContractId};

/// An open option position as seen by one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredPosition {
    pub contract_id: ContractId,
    /// Qualified contract, exchange resolved.
    pub contract: Contract,
    pub account: String,
    /// Signed quantity as reported by the broker.
    pub quantity: f64,
    /// Per-unit price paid. `None` when the broker value is unusable.
    pub cost_basis: Option<Decimal>,
}

impl MonitoredPosition {
    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn symbol(&self) -> &str {
        &self.contract.symbol
    }
}

/// Value stored in the exit latch for a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitLatch {
    /// An exit order was sent and may still be working.
    Pending(OrderId),
    /// The exit is considered done (already closed, or handled elsewhere).
    Sent,
}

/// Result of comparing a bid with the cost basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopDecision {
    /// Loss reached the threshold.
    Breach { loss_pct: Decimal },
    Hold { loss_pct: Decimal },
    /// Inputs were missing or invalid; decide next tick.
    Unknown,
}

impl StopDecision {
    pub fn is_breach(&self) -> bool {
        matches!(self, Self::Breach { .. })
    }
}

/// What the exit orchestrator did for one breached position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitOutcome {
    /// A latch already existed; nothing sent.
    AlreadyLatched,
    /// Another sell order is already working on the contract.
    DuplicateWorking { order_id: OrderId },
    /// The live position is already flat.
    AlreadyClosed,
    /// Quantity rounded to zero or the position flipped short.
    NothingToSell,
    /// The limit exit filled in full.
    LimitFilled { order_id: OrderId, quantity: u32 },
    /// The limit was cancelled and the rest sent at market.
    MarketFallback {
        limit_order: OrderId,
        limit_filled: u32,
        market_order: OrderId,
        market_quantity: u32,
    },
    /// Market-only exit sent.
    MarketSubmitted { order_id: OrderId, quantity: u32 },
    /// The limit could not be cancelled; it stays latched as pending.
    CancelFailed { order_id: OrderId, reason: String },
    /// Nothing (further) was sent; the next tick may retry.
    Aborted { reason: String },
}

impl ExitOutcome {
    /// True when at least one order was sent for this exit.
    pub fn submitted(&self) -> bool {
        matches!(
            self,
            Self::LimitFilled { .. }
                | Self::MarketFallback { .. }
                | Self::MarketSubmitted { .. }
                | Self::CancelFailed { .. }
        )
    }
}

/// Per-position result of one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionVerdict {
    Latched,
    /// Short positions are not stop-managed.
    Short,
    QuoteUnavailable,
    Unknown,
    Hold { loss_pct: Decimal },
    Exit { loss_pct: Decimal, outcome: ExitOutcome },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub contract_id: ContractId,
    pub symbol: String,
    pub verdict: PositionVerdict,
}

/// Summary of one monitor tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    /// False when the tick was skipped for connectivity.
    pub connected: bool,
    pub positions: Vec<PositionReport>,
    /// Latches removed during this tick.
    pub pruned: Vec<ContractId>,
}

impl TickReport {
    pub fn verdict(&self, id: ContractId) -> Option<&PositionVerdict> {
        self.positions
            .iter()
            .find(|p| p.contract_id == id)
            .map(|p| &p.verdict)
    }

    pub fn exits(&self) -> impl Iterator<Item = (&ContractId, &ExitOutcome)> {
        self.positions.iter().filter_map(|p| match &p.verdict {
            PositionVerdict::Exit { outcome, .. } => Some((&p.contract_id, outcome)),
            _ => None,
        })
    }
}

/// Where the monitor is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorPhase {
    Idle,
    Snapshotting,
    Evaluating(ContractId),
    Exiting(ContractId),
    Waiting(OrderId),
    Done,
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Snapshotting => write!(f, "snapshotting"),
            Self::Evaluating(id) => write!(f, "evaluating({id})"),
            Self::Exiting(id) => write!(f, "exiting({id})"),
            Self::Waiting(id) => write!(f, "waiting({id})"),
            Self::Done => write!(f, "done"),
        }
    }
}
