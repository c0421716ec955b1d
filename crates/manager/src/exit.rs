//! Exit order submission for breached positions.
//!
//! Every submission runs through [`ExitOrchestrator::guard`] first, a single
//! ordered idempotency check:
//!
//! 1. a latch already exists for the contract: do nothing;
//! 2. a sell order is already working on the contract: latch it, send nothing;
//! 3. the live position is flat: latch as sent, send nothing;
//! 4. the quantity rounds to zero whole contracts: send nothing.
//!
//! The limit-then-market policy then rests a limit at the sampled bid, waits
//! a bounded time for the fill, and sends whatever is left at market.

use std::time::Duration;

use rust_decimal::Decimal;

use stopguard_broker::{BrokerGateway, OrderId, OrderRequest, OrderState};
use stopguard_core::{ExitConfig, ExitPolicy, QuantitySource};

use crate::latch::ExitTracker;
use crate::snapshot::live_quantity;
use crate::types::{ExitLatch, ExitOutcome, MonitorPhase, MonitoredPosition};

/// Whole contracts to sell for a signed quantity. Shorts and dust give zero.
pub fn round_contracts(quantity: f64) -> u32 {
    if !quantity.is_finite() || quantity <= 0.0 {
        return 0;
    }
    let rounded = quantity.round();
    if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

enum Guard {
    Proceed(u32),
    Skip(ExitOutcome),
}

/// Sends at most one exit sequence per latched contract.
#[derive(Debug, Clone)]
pub struct ExitOrchestrator {
    config: ExitConfig,
    account: Option<String>,
}

impl ExitOrchestrator {
    pub fn new(config: ExitConfig, account: Option<String>) -> Self {
        Self { config, account }
    }

    pub fn policy(&self) -> ExitPolicy {
        self.config.policy
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Exit `position`, using `bid` as the limit price where one is needed.
    ///
    /// Gateway failures are folded into [`ExitOutcome::Aborted`]; a latch is
    /// left only when an order is, or may still be, working.
    pub async fn execute(
        &self,
        gateway: &dyn BrokerGateway,
        tracker: &mut ExitTracker,
        position: &MonitoredPosition,
        bid: Decimal,
    ) -> ExitOutcome {
        let quantity = match self.guard(gateway, tracker, position).await {
            Guard::Proceed(quantity) => quantity,
            Guard::Skip(outcome) => {
                tracing::info!(
                    contract_id = %position.contract_id,
                    symbol = %position.symbol(),
                    ?outcome,
                    "Exit skipped"
                );
                return outcome;
            }
        };

        match self.config.policy {
            ExitPolicy::MarketOnly => self.market_only(gateway, tracker, position, quantity).await,
            ExitPolicy::LimitThenMarket => {
                self.limit_then_market(gateway, tracker, position, quantity, bid)
                    .await
            }
        }
    }

    async fn guard(
        &self,
        gateway: &dyn BrokerGateway,
        tracker: &mut ExitTracker,
        position: &MonitoredPosition,
    ) -> Guard {
        let id = position.contract_id;
        let account = self.account.as_deref();

        if tracker.is_latched(id) {
            return Guard::Skip(ExitOutcome::AlreadyLatched);
        }

        let orders = match gateway.list_open_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                return Guard::Skip(ExitOutcome::Aborted {
                    reason: format!("open orders unavailable: {e}"),
                })
            }
        };
        if let Some(order) = orders
            .iter()
            .find(|o| o.contract_id == Some(id) && o.is_working_sell() && o.in_account(account))
        {
            tracker.set_latch(id, ExitLatch::Pending(order.order_id));
            return Guard::Skip(ExitOutcome::DuplicateWorking {
                order_id: order.order_id,
            });
        }

        let quantity = match self.config.quantity_source {
            QuantitySource::Snapshot => position.quantity,
            QuantitySource::Live => match live_quantity(gateway, id, account).await {
                Ok(quantity) => quantity,
                Err(e) => {
                    return Guard::Skip(ExitOutcome::Aborted {
                        reason: format!("live quantity unavailable: {e}"),
                    })
                }
            },
        };
        if quantity == 0.0 {
            tracker.set_latch(id, ExitLatch::Sent);
            return Guard::Skip(ExitOutcome::AlreadyClosed);
        }

        match round_contracts(quantity) {
            0 => Guard::Skip(ExitOutcome::NothingToSell),
            contracts => Guard::Proceed(contracts),
        }
    }

    async fn market_only(
        &self,
        gateway: &dyn BrokerGateway,
        tracker: &mut ExitTracker,
        position: &MonitoredPosition,
        quantity: u32,
    ) -> ExitOutcome {
        let order = OrderRequest::market_sell(position.contract.clone(), quantity)
            .with_account(self.account.clone());
        match gateway.submit_order(&order).await {
            Ok(order_id) => {
                tracker.set_latch(position.contract_id, ExitLatch::Pending(order_id));
                tracing::info!(
                    contract_id = %position.contract_id,
                    symbol = %position.symbol(),
                    quantity,
                    %order_id,
                    "Market exit submitted"
                );
                ExitOutcome::MarketSubmitted { order_id, quantity }
            }
            Err(e) => {
                tracing::error!(
                    contract_id = %position.contract_id,
                    quantity,
                    error = %e,
                    "Market exit rejected"
                );
                ExitOutcome::Aborted {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn limit_then_market(
        &self,
        gateway: &dyn BrokerGateway,
        tracker: &mut ExitTracker,
        position: &MonitoredPosition,
        quantity: u32,
        bid: Decimal,
    ) -> ExitOutcome {
        let id = position.contract_id;
        let limit = OrderRequest::limit_sell(position.contract.clone(), quantity, bid)
            .with_account(self.account.clone());
        let limit_id = match gateway.submit_order(&limit).await {
            Ok(order_id) => order_id,
            Err(e) => {
                tracing::error!(
                    contract_id = %id,
                    quantity,
                    limit = %bid,
                    error = %e,
                    "Limit exit rejected"
                );
                return ExitOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        };
        tracker.set_latch(id, ExitLatch::Pending(limit_id));
        tracing::info!(
            contract_id = %id,
            symbol = %position.symbol(),
            quantity,
            limit = %bid,
            order_id = %limit_id,
            "Limit exit submitted"
        );

        let last = self.wait_for_fill(gateway, limit_id).await;
        if let Some(state) = last.filter(OrderState::is_filled) {
            tracing::info!(
                contract_id = %id,
                order_id = %limit_id,
                filled = state.filled,
                "Limit exit filled"
            );
            return ExitOutcome::LimitFilled {
                order_id: limit_id,
                quantity,
            };
        }

        let limit_done = last.map_or(false, |s| s.status.is_terminal());
        if !limit_done {
            if let Err(e) = gateway.cancel_order(limit_id).await {
                tracing::error!(
                    contract_id = %id,
                    order_id = %limit_id,
                    error = %e,
                    "Limit cancel failed, leaving order working"
                );
                return ExitOutcome::CancelFailed {
                    order_id: limit_id,
                    reason: e.to_string(),
                };
            }
            gateway.sleep(self.config.cancel_settle()).await;
        }

        let settled = match gateway.order_status(limit_id).await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(order_id = %limit_id, error = %e, "Status after cancel unavailable");
                last
            }
        };
        let filled = settled.map_or(0, |s| s.filled).min(quantity);
        let remaining = quantity - filled;
        if remaining == 0 {
            return ExitOutcome::LimitFilled {
                order_id: limit_id,
                quantity,
            };
        }

        tracing::warn!(
            contract_id = %id,
            order_id = %limit_id,
            filled,
            remaining,
            "Limit not filled in time, falling back to market"
        );
        let market = OrderRequest::market_sell(position.contract.clone(), remaining)
            .with_account(self.account.clone());
        match gateway.submit_order(&market).await {
            Ok(market_id) => {
                tracker.set_latch(id, ExitLatch::Pending(market_id));
                tracing::info!(
                    contract_id = %id,
                    quantity = remaining,
                    order_id = %market_id,
                    "Market fallback submitted"
                );
                ExitOutcome::MarketFallback {
                    limit_order: limit_id,
                    limit_filled: filled,
                    market_order: market_id,
                    market_quantity: remaining,
                }
            }
            Err(e) => {
                tracker.remove(id);
                tracing::error!(
                    contract_id = %id,
                    quantity = remaining,
                    error = %e,
                    "Market fallback rejected, exit will be retried"
                );
                ExitOutcome::Aborted {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Poll until filled, finished, or the fill timeout elapses.
    ///
    /// Returns the last status seen.
    async fn wait_for_fill(
        &self,
        gateway: &dyn BrokerGateway,
        order_id: OrderId,
    ) -> Option<OrderState> {
        let timeout = self.config.fill_timeout();
        let poll = self.config.fill_poll();
        let mut waited = Duration::ZERO;
        let mut last = None;

        tracing::debug!(phase = %MonitorPhase::Waiting(order_id), ?timeout, "Waiting for fill");
        loop {
            match gateway.order_status(order_id).await {
                Ok(state) => {
                    last = Some(state);
                    if state.is_filled() || state.status.is_terminal() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(%order_id, error = %e, "Order status unavailable"),
            }
            if waited >= timeout {
                break;
            }
            gateway.sleep(poll).await;
            waited += poll;
        }
        last
    }
}
