//! Options stop-loss management.
//!
//! Runs as a long-lived loop that, once per tick:
//! - lists open option positions and qualifies their contracts
//! - samples a fresh bid for each unlatched long position
//! - compares it with the cost basis and exits on a stop-loss breach
//! - prunes exit latches once positions close
//!
//! Also provides a one-shot panic flatten for every option position.

pub mod exit;
pub mod flatten;
pub mod latch;
pub mod quotes;
pub mod service;
pub mod snapshot;
pub mod stops;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use exit::ExitOrchestrator;
pub use flatten::{flatten_all_options, FlattenReport};
pub use latch::ExitTracker;
pub use quotes::QuoteSampler;
pub use service::Monitor;
pub use snapshot::{PositionSnapshotProvider, Snapshot};
pub use types::{
    ExitLatch, ExitOutcome, MonitorPhase, MonitoredPosition, PositionReport, PositionVerdict,
    StopDecision, TickReport,
};
