//! Monitor loop: snapshot, sample, evaluate and exit, once per tick.

use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use stopguard_broker::BrokerGateway;
use stopguard_core::{AppConfig, ContractId};

use crate::exit::ExitOrchestrator;
use crate::latch::{working_sell_contracts, ExitTracker};
use crate::quotes::QuoteSampler;
use crate::snapshot::PositionSnapshotProvider;
use crate::stops;
use crate::types::{
    MonitorPhase, MonitoredPosition, PositionReport, PositionVerdict, StopDecision, TickReport,
};

/// Stop-loss monitor. Owns everything except the latch map.
#[derive(Debug)]
pub struct Monitor {
    snapshots: PositionSnapshotProvider,
    sampler: QuoteSampler,
    exits: ExitOrchestrator,
    stop_loss_pct: Decimal,
    tick_interval: Duration,
    phase: MonitorPhase,
}

impl Monitor {
    pub fn from_config(config: &AppConfig) -> Self {
        let account = config.account.account_id.clone();
        Self {
            snapshots: PositionSnapshotProvider::new(account.clone(), &config.stop_loss),
            sampler: QuoteSampler::from_config(&config.quote),
            exits: ExitOrchestrator::new(config.exit.clone(), account),
            stop_loss_pct: config.stop_loss.stop_loss_pct,
            tick_interval: config.monitor.tick_interval(),
            phase: MonitorPhase::Idle,
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    fn enter(&mut self, phase: MonitorPhase) {
        debug!(from = %self.phase, to = %phase, "Monitor phase");
        self.phase = phase;
    }

    /// Run one tick against `tracker`.
    ///
    /// Per-position problems (no quote, failed qualification, rejected order)
    /// are reported in the [`TickReport`]; only failures that make the whole
    /// tick meaningless are returned as errors.
    pub async fn tick(
        &mut self,
        gateway: &dyn BrokerGateway,
        tracker: &mut ExitTracker,
    ) -> Result<TickReport> {
        self.enter(MonitorPhase::Idle);
        let mut report = TickReport::default();

        if !gateway.is_connected().await {
            warn!("Gateway disconnected, skipping tick");
            match gateway.reconnect().await {
                Ok(()) => info!("Gateway reconnected"),
                Err(e) => error!(error = %e, "Reconnect failed"),
            }
            return Ok(report);
        }
        report.connected = true;

        self.enter(MonitorPhase::Snapshotting);
        let snapshot = self
            .snapshots
            .snapshot(gateway)
            .await
            .context("Failed to list positions")?;
        let orders = gateway
            .list_open_orders()
            .await
            .context("Failed to list open orders")?;
        let working = working_sell_contracts(&orders, self.exits.account());
        report.pruned = tracker.prune(&snapshot.open_ids, &working);

        for position in &snapshot.positions {
            let verdict = self.evaluate(gateway, tracker, position, &mut report).await;
            report.positions.push(PositionReport {
                contract_id: position.contract_id,
                symbol: position.symbol().to_string(),
                verdict,
            });
        }

        self.enter(MonitorPhase::Done);
        Ok(report)
    }

    async fn evaluate(
        &mut self,
        gateway: &dyn BrokerGateway,
        tracker: &mut ExitTracker,
        position: &MonitoredPosition,
        report: &mut TickReport,
    ) -> PositionVerdict {
        let id = position.contract_id;
        if tracker.is_latched(id) {
            debug!(contract_id = %id, latch = ?tracker.get(id), "Exit already sent");
            return PositionVerdict::Latched;
        }
        if !position.is_long() {
            debug!(
                contract_id = %id,
                quantity = position.quantity,
                "Short position, not stop-managed"
            );
            return PositionVerdict::Short;
        }

        self.enter(MonitorPhase::Evaluating(id));
        let bid = match self.sampler.sample(gateway, &position.contract).await {
            Ok(Some(bid)) => bid,
            Ok(None) => {
                warn!(
                    contract_id = %id,
                    symbol = %position.symbol(),
                    "No valid bid, skipping"
                );
                return PositionVerdict::QuoteUnavailable;
            }
            Err(e) => {
                error!(contract_id = %id, error = %e, "Quote request failed, skipping");
                return PositionVerdict::QuoteUnavailable;
            }
        };

        let loss_pct = match stops::evaluate(Some(bid), position.cost_basis, self.stop_loss_pct) {
            StopDecision::Unknown => {
                warn!(
                    contract_id = %id,
                    %bid,
                    cost_basis = ?position.cost_basis,
                    "Cannot evaluate stop, deferring"
                );
                return PositionVerdict::Unknown;
            }
            StopDecision::Hold { loss_pct } => {
                info!(
                    contract_id = %id,
                    symbol = %position.symbol(),
                    %bid,
                    %loss_pct,
                    quantity = position.quantity,
                    "Holding"
                );
                return PositionVerdict::Hold { loss_pct };
            }
            StopDecision::Breach { loss_pct } => loss_pct,
        };

        self.enter(MonitorPhase::Exiting(id));
        info!(
            contract_id = %id,
            symbol = %position.symbol(),
            %bid,
            %loss_pct,
            quantity = position.quantity,
            policy = ?self.exits.policy(),
            "Stop-loss hit, exiting"
        );
        let outcome = self.exits.execute(gateway, tracker, position, bid).await;

        if outcome.submitted() {
            match self.reprune(gateway, tracker).await {
                Ok(pruned) => report.pruned.extend(pruned),
                Err(e) => warn!(error = %e, "Prune after exit failed"),
            }
        }
        PositionVerdict::Exit { loss_pct, outcome }
    }

    async fn reprune(
        &self,
        gateway: &dyn BrokerGateway,
        tracker: &mut ExitTracker,
    ) -> Result<Vec<ContractId>> {
        let open = self.snapshots.open_ids(gateway).await?;
        let orders = gateway.list_open_orders().await?;
        let working = working_sell_contracts(&orders, self.exits.account());
        Ok(tracker.prune(&open, &working))
    }

    /// Tick until `shutdown` flips to true or its sender is dropped.
    ///
    /// Shutdown is only observed between ticks, so an exit in flight always
    /// completes. The gateway is disconnected before returning.
    pub async fn run(
        mut self,
        gateway: &dyn BrokerGateway,
        mut tracker: ExitTracker,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ExitTracker> {
        info!(
            stop_loss_pct = %self.stop_loss_pct,
            tick_ms = self.tick_interval.as_millis() as u64,
            policy = ?self.exits.policy(),
            prune = ?tracker.policy(),
            "Stop-loss monitor started"
        );

        let mut ticks: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.tick(gateway, &mut tracker).await {
                Ok(report) => {
                    ticks += 1;
                    debug!(
                        tick = ticks,
                        connected = report.connected,
                        positions = report.positions.len(),
                        latched = tracker.len(),
                        "Tick complete"
                    );
                }
                Err(e) => error!("Tick failed: {e:#}"),
            }
            self.enter(MonitorPhase::Idle);

            tokio::select! {
                _ = gateway.sleep(self.tick_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(ticks, latched = tracker.len(), "Stop-loss monitor stopping");
        gateway
            .disconnect()
            .await
            .context("Failed to disconnect from gateway")?;
        Ok(tracker)
    }
}
