//! Paper trading gateway.
//!
//! Simulates a broker session in-process: positions seeded from config,
//! quotes that optionally walk by a fixed step on every read, market orders
//! filled at the bid and sell limits filled once the bid reaches the limit.
//! Useful for exercising the full monitor without a TWS session.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use stopguard_core::{Contract, ContractId, PaperConfig};

use crate::error::{GatewayError, Result};
use crate::gateway::BrokerGateway;
use crate::types::{
    OpenOrder, OrderId, OrderRequest, OrderSide, OrderState, OrderStatus, OrderType, Position,
    QuoteHandle,
};

/// First order id handed out, mirroring TWS's nextValidId range.
const FIRST_ORDER_ID: i64 = 1_000;

#[derive(Debug, Clone)]
struct Holding {
    contract: Contract,
    quantity: i64,
    /// Per-contract premium paid.
    entry_price: Decimal,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    contract_id: ContractId,
    status: OrderStatus,
    filled: u32,
    avg_fill_price: Option<Decimal>,
}

impl PaperOrder {
    fn remaining(&self) -> u32 {
        self.request.quantity.saturating_sub(self.filled)
    }

    fn state(&self, order_id: OrderId) -> OrderState {
        OrderState {
            order_id,
            status: self.status,
            filled: self.filled,
            remaining: if self.status.is_working() || self.status == OrderStatus::Filled {
                self.remaining()
            } else {
                0
            },
            avg_fill_price: self.avg_fill_price,
        }
    }
}

#[derive(Debug)]
struct PaperState {
    connected: bool,
    holdings: BTreeMap<ContractId, Holding>,
    /// Contracts the session can qualify, including ones no longer held.
    catalog: BTreeMap<ContractId, Contract>,
    bids: HashMap<ContractId, Decimal>,
    subscriptions: HashMap<QuoteHandle, ContractId>,
    next_subscription: u64,
    orders: BTreeMap<OrderId, PaperOrder>,
    next_order_id: i64,
}

impl PaperState {
    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    fn bid(&self, id: ContractId) -> Option<Decimal> {
        self.bids.get(&id).copied()
    }

    /// Book a fill against the simulated position.
    fn apply_fill(&mut self, contract_id: ContractId, side: OrderSide, quantity: u32) {
        let delta = match side {
            OrderSide::Buy => i64::from(quantity),
            OrderSide::Sell => -i64::from(quantity),
        };
        let bid = self.bid(contract_id).unwrap_or(Decimal::ZERO);
        let holding = self.holdings.entry(contract_id).or_insert_with(|| Holding {
            contract: self
                .catalog
                .get(&contract_id)
                .cloned()
                .unwrap_or_else(|| Contract::stock("UNKNOWN").with_id(contract_id)),
            quantity: 0,
            entry_price: bid,
        });
        holding.quantity += delta;
        if holding.quantity == 0 {
            self.holdings.remove(&contract_id);
        }
    }

    /// Try to fill a working order against the current bid.
    fn try_fill(&mut self, order_id: OrderId) {
        let Some(order) = self.orders.get(&order_id) else {
            return;
        };
        if !order.status.is_working() {
            return;
        }
        let Some(bid) = self.bid(order.contract_id) else {
            return;
        };
        let fill_price = match order.request.order_type {
            OrderType::Market => Some(bid),
            OrderType::Limit { price } => match order.request.side {
                OrderSide::Sell if bid >= price => Some(price),
                OrderSide::Buy if bid <= price => Some(price),
                _ => None,
            },
        };
        let Some(price) = fill_price else {
            return;
        };

        let (contract_id, side, quantity) =
            (order.contract_id, order.request.side, order.remaining());
        self.apply_fill(contract_id, side, quantity);

        if let Some(order) = self.orders.get_mut(&order_id) {
            order.filled += quantity;
            order.status = OrderStatus::Filled;
            order.avg_fill_price = Some(price);
            info!(
                order_id = %order_id,
                contract_id = %contract_id,
                side = %side,
                quantity,
                price = %price,
                "Paper fill simulated"
            );
        }
    }
}

/// In-process simulated broker.
#[derive(Debug)]
pub struct PaperGateway {
    account: String,
    multiplier: Decimal,
    bid_step: Decimal,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    /// Create an empty, connected paper session.
    pub fn new(account: impl Into<String>, multiplier: Decimal) -> Self {
        Self {
            account: account.into(),
            multiplier,
            bid_step: Decimal::ZERO,
            state: Mutex::new(PaperState {
                connected: true,
                holdings: BTreeMap::new(),
                catalog: BTreeMap::new(),
                bids: HashMap::new(),
                subscriptions: HashMap::new(),
                next_subscription: 1,
                orders: BTreeMap::new(),
                next_order_id: FIRST_ORDER_ID,
            }),
        }
    }

    /// Seed a session from the `[paper]` config section.
    pub fn from_config(config: &PaperConfig, multiplier: Decimal) -> Self {
        let mut gateway = Self::new(config.account_id.clone(), multiplier);
        gateway.bid_step = config.bid_step;
        for pos in &config.positions {
            let contract = Contract::option(&pos.symbol, pos.expiry, pos.strike, pos.right)
                .with_id(ContractId(pos.contract_id));
            gateway.add_position(contract, pos.quantity, pos.entry_price, pos.bid);
        }
        gateway
    }

    /// Set the per-read bid walk.
    #[must_use]
    pub fn with_bid_step(mut self, step: Decimal) -> Self {
        self.bid_step = step;
        self
    }

    /// Add (or replace) a holding. The contract must carry an id.
    pub fn add_position(
        &self,
        contract: Contract,
        quantity: i64,
        entry_price: Decimal,
        bid: Decimal,
    ) {
        let Some(id) = contract.id else {
            return;
        };
        let mut state = self.state.lock();
        state.catalog.insert(id, contract.clone());
        state.bids.insert(id, bid);
        if quantity != 0 {
            state.holdings.insert(
                id,
                Holding {
                    contract,
                    quantity,
                    entry_price,
                },
            );
        } else {
            state.holdings.remove(&id);
        }
    }

    pub fn set_bid(&self, id: ContractId, bid: Decimal) {
        self.state.lock().bids.insert(id, bid);
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Current signed quantity held (0 when flat).
    pub fn position_quantity(&self, id: ContractId) -> i64 {
        self.state
            .lock()
            .holdings
            .get(&id)
            .map_or(0, |h| h.quantity)
    }

    /// Every order submitted this session, oldest first.
    pub fn submitted_orders(&self) -> Vec<(OrderId, OrderRequest, OrderStatus)> {
        self.state
            .lock()
            .orders
            .iter()
            .map(|(id, o)| (*id, o.request.clone(), o.status))
            .collect()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().subscriptions.len()
    }
}

#[async_trait]
impl BrokerGateway for PaperGateway {
    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn reconnect(&self) -> Result<()> {
        self.state.lock().connected = true;
        info!(account = %self.account, "Paper session reconnected");
        Ok(())
    }

    async fn list_open_positions(&self) -> Result<Vec<Position>> {
        let state = self.state.lock();
        state.ensure_connected()?;
        Ok(state
            .holdings
            .values()
            .map(|h| Position {
                account: self.account.clone(),
                contract: h.contract.clone(),
                quantity: h.quantity as f64,
                average_cost: (h.entry_price * self.multiplier).to_f64().unwrap_or(0.0),
            })
            .collect())
    }

    async fn list_open_orders(&self) -> Result<Vec<OpenOrder>> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        let working: Vec<OrderId> = state
            .orders
            .iter()
            .filter(|(_, o)| o.status.is_working())
            .map(|(id, _)| *id)
            .collect();
        for id in &working {
            state.try_fill(*id);
        }
        Ok(state
            .orders
            .iter()
            .filter(|(_, o)| o.status.is_working())
            .map(|(id, o)| OpenOrder {
                order_id: *id,
                account: Some(self.account.clone()),
                contract_id: Some(o.contract_id),
                symbol: o.request.contract.symbol.clone(),
                side: o.request.side,
                status: o.status,
                remaining: o.remaining(),
            })
            .collect())
    }

    async fn qualify_contract(&self, contract: &Contract) -> Result<Contract> {
        let state = self.state.lock();
        state.ensure_connected()?;

        let known = match contract.id {
            Some(id) => state.catalog.get(&id),
            None => state.catalog.values().find(|c| {
                c.symbol.eq_ignore_ascii_case(&contract.symbol) && c.kind == contract.kind
            }),
        };
        let Some(known) = known else {
            return Err(GatewayError::qualification(
                contract.display_name(),
                "No security definition has been found",
            ));
        };

        let mut qualified = known.clone();
        if !contract.exchange.trim().is_empty() {
            qualified.exchange = contract.exchange.clone();
        }
        qualified.ensure_exchange();
        debug!(contract = %qualified.display_name(), "Paper contract qualified");
        Ok(qualified)
    }

    async fn subscribe_quote(&self, contract: &Contract) -> Result<QuoteHandle> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        let id = contract.id.ok_or_else(|| {
            GatewayError::MarketData(format!("{} is not qualified", contract.display_name()))
        })?;
        let handle = QuoteHandle(state.next_subscription);
        state.next_subscription += 1;
        state.subscriptions.insert(handle, id);
        Ok(handle)
    }

    async fn read_bid(&self, handle: QuoteHandle) -> Result<Option<f64>> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        let id = *state
            .subscriptions
            .get(&handle)
            .ok_or(GatewayError::UnknownSubscription { handle })?;
        let Some(bid) = state.bid(id) else {
            return Ok(None);
        };
        if !self.bid_step.is_zero() {
            state.bids.insert(id, (bid + self.bid_step).max(Decimal::ZERO));
        }
        Ok(bid.to_f64())
    }

    async fn unsubscribe_quote(&self, handle: QuoteHandle) -> Result<()> {
        let mut state = self.state.lock();
        state
            .subscriptions
            .remove(&handle)
            .map(|_| ())
            .ok_or(GatewayError::UnknownSubscription { handle })
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        let mut state = self.state.lock();
        state.ensure_connected()?;

        if order.quantity == 0 {
            return Err(GatewayError::OrderRejected("quantity must be positive".to_string()));
        }
        if let OrderType::Limit { price } = order.order_type {
            if price <= Decimal::ZERO {
                return Err(GatewayError::OrderRejected(format!("invalid limit price {price}")));
            }
        }
        let contract_id = order
            .contract
            .id
            .filter(|id| state.catalog.contains_key(id))
            .ok_or_else(|| {
                GatewayError::OrderRejected(format!(
                    "{} is not a known contract",
                    order.contract.display_name()
                ))
            })?;

        let order_id = OrderId(state.next_order_id);
        state.next_order_id += 1;
        state.orders.insert(
            order_id,
            PaperOrder {
                request: order.clone(),
                contract_id,
                status: OrderStatus::Submitted,
                filled: 0,
                avg_fill_price: None,
            },
        );
        info!(
            order_id = %order_id,
            contract = %order.contract.display_name(),
            side = %order.side,
            quantity = order.quantity,
            order_type = %order.order_type,
            "Paper order accepted"
        );
        state.try_fill(order_id);
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| GatewayError::order_not_found(order_id))?;
        if order.status.is_working() {
            order.status = OrderStatus::Cancelled;
            info!(order_id = %order_id, "Paper order cancelled");
        }
        Ok(())
    }

    async fn order_status(&self, order_id: OrderId) -> Result<OrderState> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        state.try_fill(order_id);
        state
            .orders
            .get(&order_id)
            .map(|o| o.state(order_id))
            .ok_or_else(|| GatewayError::order_not_found(order_id))
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.subscriptions.clear();
        info!(account = %self.account, "Paper session disconnected");
        Ok(())
    }
}
