//! Open option positions for one tick.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use stopguard_broker::error::Result;
use stopguard_broker::{BrokerGateway, Position};
use stopguard_core::{Contract, ContractId, StopLossConfig, TargetContract};

use crate::quotes::valid_price;
use crate::types::MonitoredPosition;

/// Positions visible to one tick.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Qualified, in-scope positions with nonzero quantity.
    pub positions: Vec<MonitoredPosition>,
    /// Every open option contract id, including ones skipped this tick.
    pub open_ids: HashSet<ContractId>,
}

/// Lists positions and qualifies each contract once per process.
#[derive(Debug)]
pub struct PositionSnapshotProvider {
    account: Option<String>,
    target: Option<TargetContract>,
    entry_price: Option<Decimal>,
    multiplier: Decimal,
    qualified: HashMap<ContractId, Contract>,
}

impl PositionSnapshotProvider {
    pub fn new(account: Option<String>, config: &StopLossConfig) -> Self {
        Self {
            account,
            target: config.target.clone(),
            entry_price: config.entry_price,
            multiplier: config.multiplier,
            qualified: HashMap::new(),
        }
    }

    /// Number of contracts qualified so far.
    pub fn cached(&self) -> usize {
        self.qualified.len()
    }

    pub async fn snapshot(&mut self, gateway: &dyn BrokerGateway) -> Result<Snapshot> {
        let mut raw = gateway.list_open_positions().await?;
        raw.retain(|p| self.in_scope(p));
        let mut snapshot = Snapshot::default();

        for pos in raw {
            if let Some(id) = pos.contract_id() {
                snapshot.open_ids.insert(id);
            }

            let contract = match self.qualify(gateway, &pos.contract).await {
                Ok(contract) => contract,
                Err(e) => {
                    tracing::error!(
                        contract = %pos.contract.display_name(),
                        error = %e,
                        "Contract qualification failed, skipping position"
                    );
                    continue;
                }
            };
            let Some(contract_id) = contract.id else {
                tracing::error!(
                    contract = %contract.display_name(),
                    "Qualified contract has no id, skipping position"
                );
                continue;
            };
            snapshot.open_ids.insert(contract_id);

            let cost_basis = self.cost_basis(&pos);
            if cost_basis.is_none() {
                tracing::warn!(
                    %contract_id,
                    average_cost = pos.average_cost,
                    "Unusable average cost"
                );
            }

            snapshot.positions.push(MonitoredPosition {
                contract_id,
                contract,
                account: pos.account,
                quantity: pos.quantity,
                cost_basis,
            });
        }

        tracing::debug!(
            positions = snapshot.positions.len(),
            open = snapshot.open_ids.len(),
            "Position snapshot"
        );
        Ok(snapshot)
    }

    /// Ids of open positions in scope, without qualifying anything.
    ///
    /// Uses the same account and target filter as [`Self::snapshot`], so a
    /// prune between snapshots sees the same set of open positions.
    pub async fn open_ids(&self, gateway: &dyn BrokerGateway) -> Result<HashSet<ContractId>> {
        let positions = gateway.list_open_positions().await?;
        Ok(positions
            .iter()
            .filter(|p| self.in_scope(p))
            .filter_map(Position::contract_id)
            .collect())
    }

    fn in_scope(&self, pos: &Position) -> bool {
        if !pos.is_open() || !pos.contract.is_option() {
            return false;
        }
        if let Some(account) = &self.account {
            if &pos.account != account {
                return false;
            }
        }
        self.target
            .as_ref()
            .map_or(true, |t| pos.contract.matches_target(t))
    }

    /// Per-unit cost basis.
    ///
    /// The configured entry price wins for the target series; otherwise the
    /// broker average cost is divided by the contract multiplier.
    fn cost_basis(&self, pos: &Position) -> Option<Decimal> {
        if self.target.is_some() {
            if let Some(entry) = self.entry_price {
                return Some(entry);
            }
        }
        if self.multiplier <= Decimal::ZERO {
            return None;
        }
        valid_price(Some(pos.average_cost)).map(|cost| cost / self.multiplier)
    }

    async fn qualify(
        &mut self,
        gateway: &dyn BrokerGateway,
        contract: &Contract,
    ) -> Result<Contract> {
        if let Some(id) = contract.id {
            if let Some(cached) = self.qualified.get(&id) {
                return Ok(cached.clone());
            }
        }

        let mut qualified = gateway.qualify_contract(contract).await?;
        qualified.ensure_exchange();
        if let Some(id) = qualified.id {
            tracing::info!(
                contract_id = %id,
                contract = %qualified.display_name(),
                exchange = %qualified.exchange,
                "Contract qualified"
            );
            self.qualified.insert(id, qualified.clone());
        }
        Ok(qualified)
    }
}

/// Live signed quantity for one contract; zero when no position is listed.
///
/// With an account, only that account's holding counts.
pub async fn live_quantity(
    gateway: &dyn BrokerGateway,
    id: ContractId,
    account: Option<&str>,
) -> Result<f64> {
    let positions = gateway.list_open_positions().await?;
    Ok(positions
        .iter()
        .filter(|p| p.contract_id() == Some(id) && p.quantity.is_finite())
        .filter(|p| account.map_or(true, |a| p.account == a))
        .map(|p| p.quantity)
        .sum())
}
