//! Scripted gateway for unit tests.
//!
//! Records every call, never sleeps on the wall clock, and lets each test
//! script bids, qualification failures and per-order fill behaviour.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use stopguard_broker::error::{GatewayError, Result};
use stopguard_broker::{
    BrokerGateway, OpenOrder, OrderId, OrderRequest, OrderSide, OrderState, OrderStatus,
    OrderType, Position, QuoteHandle,
};
use stopguard_core::{Contract, ContractId, OptionRight};

/// How the next submitted order behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPlan {
    /// Fills in full on submission.
    Immediate,
    /// Rests forever.
    Never,
    /// Fills this many contracts on the first status poll, then rests.
    Partial(u32),
    /// Submission is rejected.
    Reject,
}

#[derive(Debug, Clone)]
struct ScriptedOrder {
    request: OrderRequest,
    status: OrderStatus,
    filled: u32,
    plan: FillPlan,
    polled: bool,
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    reconnects: u32,
    positions: Vec<Position>,
    bids: HashMap<ContractId, VecDeque<Option<f64>>>,
    fail_qualify: HashSet<String>,
    qualify_calls: Vec<String>,
    subscriptions: HashMap<QuoteHandle, ContractId>,
    next_handle: u64,
    subscribe_calls: u32,
    unsubscribe_calls: u32,
    read_calls: u32,
    fail_reads: bool,
    fill_plans: VecDeque<FillPlan>,
    orders: Vec<(OrderId, ScriptedOrder)>,
    external_orders: Vec<OpenOrder>,
    cancels: Vec<OrderId>,
    fail_cancel: bool,
    slept: Duration,
    disconnects: u32,
}

pub struct ScriptedGateway {
    inner: Mutex<Inner>,
}

pub fn option_contract(id: i64, symbol: &str) -> Contract {
    Contract::option(
        symbol,
        NaiveDate::from_ymd_opt(2025, 7, 25).unwrap(),
        Decimal::from(330),
        OptionRight::Put,
    )
    .with_id(ContractId(id))
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                connected: true,
                next_handle: 1,
                ..Inner::default()
            }),
        }
    }

    /// Add a position; `average_cost` is in broker units (premium x multiplier).
    pub fn with_position(self, contract: Contract, quantity: f64, average_cost: f64) -> Self {
        self.inner.lock().positions.push(Position {
            account: "DU1".to_string(),
            contract,
            quantity,
            average_cost,
        });
        self
    }

    pub fn with_account_position(self, account: &str, contract: Contract, quantity: f64) -> Self {
        self.inner.lock().positions.push(Position {
            account: account.to_string(),
            contract,
            quantity,
            average_cost: 250.0,
        });
        self
    }

    /// Bids returned by successive reads; the last one repeats.
    pub fn with_bids(self, id: i64, bids: &[Option<f64>]) -> Self {
        self.inner
            .lock()
            .bids
            .insert(ContractId(id), bids.iter().copied().collect());
        self
    }

    pub fn with_fill_plans(self, plans: &[FillPlan]) -> Self {
        self.inner.lock().fill_plans = plans.iter().copied().collect();
        self
    }

    pub fn with_qualify_failure(self, symbol: &str) -> Self {
        self.inner.lock().fail_qualify.insert(symbol.to_string());
        self
    }

    pub fn with_external_order(self, order: OpenOrder) -> Self {
        self.inner.lock().external_orders.push(order);
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }

    pub fn set_fail_cancel(&self, fail: bool) {
        self.inner.lock().fail_cancel = fail;
    }

    pub fn set_quantity(&self, id: i64, quantity: f64) {
        let mut inner = self.inner.lock();
        for pos in inner.positions.iter_mut() {
            if pos.contract.id == Some(ContractId(id)) {
                pos.quantity = quantity;
            }
        }
        inner.positions.retain(|p| p.quantity != 0.0);
    }

    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.inner
            .lock()
            .orders
            .iter()
            .map(|(_, o)| o.request.clone())
            .collect()
    }

    pub fn cancels(&self) -> Vec<OrderId> {
        self.inner.lock().cancels.clone()
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.inner.lock().subscribe_calls
    }

    pub fn unsubscribe_calls(&self) -> u32 {
        self.inner.lock().unsubscribe_calls
    }

    pub fn read_calls(&self) -> u32 {
        self.inner.lock().read_calls
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    pub fn qualify_calls(&self) -> usize {
        self.inner.lock().qualify_calls.len()
    }

    pub fn slept(&self) -> Duration {
        self.inner.lock().slept
    }

    pub fn reconnects(&self) -> u32 {
        self.inner.lock().reconnects
    }

    pub fn disconnects(&self) -> u32 {
        self.inner.lock().disconnects
    }

    pub fn position_quantity(&self, id: i64) -> f64 {
        self.inner
            .lock()
            .positions
            .iter()
            .find(|p| p.contract.id == Some(ContractId(id)))
            .map_or(0.0, |p| p.quantity)
    }

    pub fn account_quantity(&self, account: &str, id: i64) -> f64 {
        self.inner
            .lock()
            .positions
            .iter()
            .find(|p| p.account == account && p.contract.id == Some(ContractId(id)))
            .map_or(0.0, |p| p.quantity)
    }
}

impl Inner {
    /// Apply a fill to the first matching position, scoped to the order's
    /// account when it names one.
    fn book_fill(&mut self, request: &OrderRequest, quantity: u32) {
        let delta = match request.side {
            OrderSide::Buy => f64::from(quantity),
            OrderSide::Sell => -f64::from(quantity),
        };
        let account = request.account.as_deref();
        if let Some(pos) = self.positions.iter_mut().find(|p| {
            p.contract.id == request.contract.id && account.map_or(true, |a| p.account == a)
        }) {
            pos.quantity += delta;
        }
        self.positions.retain(|p| p.quantity != 0.0);
    }

    fn state_of(&self, order_id: OrderId) -> Option<OrderState> {
        self.orders
            .iter()
            .find(|(id, _)| *id == order_id)
            .map(|(id, o)| OrderState {
                order_id: *id,
                status: o.status,
                filled: o.filled,
                remaining: if o.status.is_working() {
                    o.request.quantity.saturating_sub(o.filled)
                } else {
                    0
                },
                avg_fill_price: None,
            })
    }
}

#[async_trait]
impl BrokerGateway for ScriptedGateway {
    async fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    async fn reconnect(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.reconnects += 1;
        Err(GatewayError::Connection("gateway unreachable".to_string()))
    }

    async fn list_open_positions(&self) -> Result<Vec<Position>> {
        let inner = self.inner.lock();
        if !inner.connected {
            return Err(GatewayError::NotConnected);
        }
        Ok(inner.positions.clone())
    }

    async fn list_open_orders(&self) -> Result<Vec<OpenOrder>> {
        let inner = self.inner.lock();
        let mut open: Vec<OpenOrder> = inner
            .orders
            .iter()
            .filter(|(_, o)| o.status.is_working())
            .map(|(id, o)| OpenOrder {
                order_id: *id,
                account: o.request.account.clone(),
                contract_id: o.request.contract.id,
                symbol: o.request.contract.symbol.clone(),
                side: o.request.side,
                status: o.status,
                remaining: o.request.quantity.saturating_sub(o.filled),
            })
            .collect();
        open.extend(inner.external_orders.iter().cloned());
        Ok(open)
    }

    async fn qualify_contract(&self, contract: &Contract) -> Result<Contract> {
        let mut inner = self.inner.lock();
        inner.qualify_calls.push(contract.symbol.clone());
        if inner.fail_qualify.contains(&contract.symbol) {
            return Err(GatewayError::qualification(
                contract.display_name(),
                "No security definition has been found",
            ));
        }
        let mut qualified = contract.clone();
        if qualified.id.is_none() {
            qualified.id = Some(ContractId(9_000 + inner.qualify_calls.len() as i64));
        }
        qualified.ensure_exchange();
        Ok(qualified)
    }

    async fn subscribe_quote(&self, contract: &Contract) -> Result<QuoteHandle> {
        let mut inner = self.inner.lock();
        inner.subscribe_calls += 1;
        let handle = QuoteHandle(inner.next_handle);
        inner.next_handle += 1;
        inner
            .subscriptions
            .insert(handle, contract.id.unwrap_or(ContractId(0)));
        Ok(handle)
    }

    async fn read_bid(&self, handle: QuoteHandle) -> Result<Option<f64>> {
        let mut inner = self.inner.lock();
        inner.read_calls += 1;
        if inner.fail_reads {
            return Err(GatewayError::MarketData("ticker stream closed".to_string()));
        }
        let Some(id) = inner.subscriptions.get(&handle).copied() else {
            return Err(GatewayError::UnknownSubscription { handle });
        };
        let Some(script) = inner.bids.get_mut(&id) else {
            return Ok(None);
        };
        let bid = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().copied().flatten()
        };
        Ok(bid)
    }

    async fn unsubscribe_quote(&self, handle: QuoteHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.unsubscribe_calls += 1;
        if inner.subscriptions.remove(&handle).is_some() {
            Ok(())
        } else {
            Err(GatewayError::UnknownSubscription { handle })
        }
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        let mut inner = self.inner.lock();
        let plan = inner.fill_plans.pop_front().unwrap_or(match order.order_type {
            OrderType::Market => FillPlan::Immediate,
            OrderType::Limit { .. } => FillPlan::Never,
        });
        if plan == FillPlan::Reject {
            return Err(GatewayError::OrderRejected("scripted rejection".to_string()));
        }
        let order_id = OrderId(100 + inner.orders.len() as i64);
        let mut scripted = ScriptedOrder {
            request: order.clone(),
            status: OrderStatus::Submitted,
            filled: 0,
            plan,
            polled: false,
        };
        if plan == FillPlan::Immediate {
            scripted.status = OrderStatus::Filled;
            scripted.filled = order.quantity;
            inner.book_fill(order, order.quantity);
        }
        inner.orders.push((order_id, scripted));
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.cancels.push(order_id);
        if inner.fail_cancel {
            return Err(GatewayError::OrderRejected("cancel rejected".to_string()));
        }
        let order = inner
            .orders
            .iter_mut()
            .find(|(id, _)| *id == order_id)
            .map(|(_, o)| o)
            .ok_or_else(|| GatewayError::order_not_found(order_id))?;
        if order.status.is_working() {
            order.status = OrderStatus::Cancelled;
        }
        Ok(())
    }

    async fn order_status(&self, order_id: OrderId) -> Result<OrderState> {
        let mut inner = self.inner.lock();
        let mut fill = None;
        if let Some((_, order)) = inner.orders.iter_mut().find(|(id, _)| *id == order_id) {
            if let FillPlan::Partial(n) = order.plan {
                if !order.polled && order.status.is_working() {
                    order.polled = true;
                    order.filled = n.min(order.request.quantity);
                    order.status = if order.filled == order.request.quantity {
                        OrderStatus::Filled
                    } else {
                        OrderStatus::PartiallyFilled
                    };
                    fill = Some((order.request.clone(), order.filled));
                }
            }
        }
        if let Some((request, quantity)) = fill {
            inner.book_fill(&request, quantity);
        }
        inner
            .state_of(order_id)
            .ok_or_else(|| GatewayError::order_not_found(order_id))
    }

    async fn sleep(&self, duration: Duration) {
        self.inner.lock().slept += duration;
        tokio::task::yield_now().await;
    }

    async fn disconnect(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.disconnects += 1;
        inner.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partial_fill_reports_remaining() {
        let gw = ScriptedGateway::new()
            .with_position(option_contract(1, "TSLA"), 5.0, 250.0)
            .with_fill_plans(&[FillPlan::Partial(2)]);
        let order_id = gw
            .submit_order(&OrderRequest::limit_sell(
                option_contract(1, "TSLA"),
                5,
                Decimal::from(2),
            ))
            .await
            .unwrap();

        let state = gw.order_status(order_id).await.unwrap();
        assert_eq!((state.filled, state.remaining), (2, 3));
        let open = gw.list_open_orders().await.unwrap();
        assert_eq!(open[0].remaining, 3);
        assert_eq!(gw.position_quantity(1), 3.0);
    }
}
