//! Panic flatten: close every option position at market.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use stopguard_broker::{BrokerGateway, OrderId, OrderRequest, OrderSide, OrderStatus};
use stopguard_core::ContractId;

use crate::exit::round_contracts;

/// One market order sent by a flatten.
#[derive(Debug, Clone, Serialize)]
pub struct FlattenOrder {
    pub contract_id: Option<ContractId>,
    pub contract: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub order_id: Option<OrderId>,
    /// Status after the settle pause, if it could be read.
    pub status: Option<OrderStatus>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlattenReport {
    pub cancelled: Vec<OrderId>,
    pub orders: Vec<FlattenOrder>,
}

impl FlattenReport {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.orders.iter().filter(|o| o.error.is_some()).count()
    }
}

/// Cancel working orders on every open option position, then flatten each
/// one with a market order (SELL longs, BUY shorts).
///
/// `account` restricts the flatten to one account. After submitting, waits
/// `settle` and records each order's status.
pub async fn flatten_all_options(
    gateway: &dyn BrokerGateway,
    account: Option<&str>,
    settle: Duration,
) -> Result<FlattenReport> {
    let positions: Vec<_> = gateway
        .list_open_positions()
        .await
        .context("Failed to list positions")?
        .into_iter()
        .filter(|p| p.is_open() && p.contract.is_option())
        .filter(|p| account.map_or(true, |a| p.account == a))
        .collect();

    let mut report = FlattenReport::default();
    if positions.is_empty() {
        info!("No open option positions to flatten");
        return Ok(report);
    }

    warn!(positions = positions.len(), "Panic flatten triggered");
    for p in &positions {
        info!(
            account = %p.account,
            contract = %p.contract.display_name(),
            quantity = p.quantity,
            "Flattening"
        );
    }

    let ids: HashSet<ContractId> = positions.iter().filter_map(|p| p.contract_id()).collect();
    let orders = gateway
        .list_open_orders()
        .await
        .context("Failed to list open orders")?;
    for order in orders
        .iter()
        .filter(|o| o.status.is_working() && o.in_account(account))
    {
        let Some(contract_id) = order.contract_id.filter(|id| ids.contains(id)) else {
            continue;
        };
        match gateway.cancel_order(order.order_id).await {
            Ok(()) => {
                info!(order_id = %order.order_id, %contract_id, "Cancelled working order");
                report.cancelled.push(order.order_id);
            }
            Err(e) => error!(order_id = %order.order_id, error = %e, "Cancel failed"),
        }
    }

    for p in positions {
        let side = if p.quantity > 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let quantity = round_contracts(p.quantity.abs());
        let contract = p.contract.display_name();
        if quantity == 0 {
            warn!(%contract, quantity = p.quantity, "Fractional position, nothing to send");
            continue;
        }

        info!(%contract, %side, quantity, "Submitting market flatten");
        let request = OrderRequest::market(p.contract.clone(), side, quantity)
            .with_account(Some(p.account.clone()));
        let (order_id, error) = match gateway.submit_order(&request).await {
            Ok(id) => (Some(id), None),
            Err(e) => {
                error!(%contract, error = %e, "Flatten order rejected");
                (None, Some(e.to_string()))
            }
        };
        report.orders.push(FlattenOrder {
            contract_id: p.contract_id(),
            contract,
            side,
            quantity,
            order_id,
            status: None,
            error,
        });
    }

    gateway.sleep(settle).await;

    for order in report.orders.iter_mut() {
        let Some(order_id) = order.order_id else {
            continue;
        };
        match gateway.order_status(order_id).await {
            Ok(state) => {
                info!(
                    %order_id,
                    contract = %order.contract,
                    status = %state.status,
                    "Flatten order status"
                );
                order.status = Some(state.status);
            }
            Err(e) => warn!(%order_id, error = %e, "Flatten order status unavailable"),
        }
    }

    Ok(report)
}
