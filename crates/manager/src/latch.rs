//! Per-contract exit latches.
//!
//! A latch records that an exit was sent for the position currently open on
//! a contract. The tracker is owned by the monitor and passed by `&mut` into
//! every tick; pruning drops latches once the position is gone so a later
//! re-entry on the same contract can be stopped out again.

use std::collections::{HashMap, HashSet};

use stopguard_broker::OpenOrder;
use stopguard_core::{ContractId, PrunePolicy};

use crate::types::ExitLatch;

#[derive(Debug, Clone, Default)]
pub struct ExitTracker {
    latches: HashMap<ContractId, ExitLatch>,
    policy: PrunePolicy,
}

impl ExitTracker {
    pub fn new(policy: PrunePolicy) -> Self {
        Self {
            latches: HashMap::new(),
            policy,
        }
    }

    pub fn is_latched(&self, id: ContractId) -> bool {
        self.latches.contains_key(&id)
    }

    pub fn get(&self, id: ContractId) -> Option<ExitLatch> {
        self.latches.get(&id).copied()
    }

    pub fn set_latch(&mut self, id: ContractId, latch: ExitLatch) {
        tracing::debug!(contract_id = %id, ?latch, "Exit latch set");
        self.latches.insert(id, latch);
    }

    pub fn remove(&mut self, id: ContractId) -> Option<ExitLatch> {
        self.latches.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.latches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latches.is_empty()
    }

    pub fn policy(&self) -> PrunePolicy {
        self.policy
    }

    /// Drop latches for contracts whose exit has run its course.
    ///
    /// Returns the removed contract ids, sorted.
    pub fn prune(
        &mut self,
        open: &HashSet<ContractId>,
        working_sells: &HashSet<ContractId>,
    ) -> Vec<ContractId> {
        let policy = self.policy;
        let mut removed: Vec<ContractId> = self
            .latches
            .keys()
            .filter(|id| {
                let closed = !open.contains(id);
                let idle = !working_sells.contains(id);
                match policy {
                    PrunePolicy::EitherGone => closed || idle,
                    PrunePolicy::BothGone => closed && idle,
                }
            })
            .copied()
            .collect();
        removed.sort();

        for id in &removed {
            self.latches.remove(id);
            tracing::info!(contract_id = %id, "Exit latch pruned");
        }
        removed
    }
}

/// Contracts with at least one working sell order in `account`.
pub fn working_sell_contracts(
    orders: &[OpenOrder],
    account: Option<&str>,
) -> HashSet<ContractId> {
    orders
        .iter()
        .filter(|o| o.is_working_sell() && o.in_account(account))
        .filter_map(|o| o.contract_id)
        .collect()
}
