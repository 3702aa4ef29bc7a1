//! Order blotter: order lifecycle during a run.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub amount: i64,
    pub created: NaiveDate,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub order_id: OrderId,
    pub symbol: String,
    pub amount: i64,
    pub price: f64,
    pub session: NaiveDate,
}

/// What happens to unfilled orders at the session close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPolicy {
    Never,
    EndOfDay,
}

impl FromStr for CancelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(CancelPolicy::Never),
            "eod" => Ok(CancelPolicy::EndOfDay),
            other => Err(format!(
                "unknown cancel policy {other:?}, expected \"never\" or \"eod\""
            )),
        }
    }
}

pub trait Blotter {
    fn order(&mut self, symbol: &str, amount: i64, session: NaiveDate) -> OrderId;

    /// Cancel an open order. Returns false when the order is unknown or no
    /// longer open.
    fn cancel(&mut self, id: OrderId) -> bool;

    fn open_orders(&self) -> Vec<&Order>;

    /// Fill open orders against `price_of`. Orders for symbols without a
    /// price stay open.
    fn process_fills(
        &mut self,
        session: NaiveDate,
        price_of: &dyn Fn(&str) -> Option<f64>,
    ) -> Vec<Transaction>;

    fn end_of_session(&mut self, _session: NaiveDate) {}
}

/// Reference blotter: whole-order fills at the supplied price.
#[derive(Debug)]
pub struct SimulationBlotter {
    policy: CancelPolicy,
    next_id: OrderId,
    orders: Vec<Order>,
}

impl SimulationBlotter {
    pub fn new(policy: CancelPolicy) -> Self {
        SimulationBlotter {
            policy,
            next_id: 1,
            orders: Vec::new(),
        }
    }

    pub fn policy(&self) -> CancelPolicy {
        self.policy
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }
}

impl Blotter for SimulationBlotter {
    fn order(&mut self, symbol: &str, amount: i64, session: NaiveDate) -> OrderId {
        let id = self.next_id;
        self.next_id += 1;
        self.orders.push(Order {
            id,
            symbol: symbol.to_string(),
            amount,
            created: session,
            status: OrderStatus::Open,
        });
        id
    }

    fn cancel(&mut self, id: OrderId) -> bool {
        match self
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status == OrderStatus::Open)
        {
            Some(order) => {
                order.status = OrderStatus::Cancelled;
                true
            }
            None => false,
        }
    }

    fn open_orders(&self) -> Vec<&Order> {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Open)
            .collect()
    }

    fn process_fills(
        &mut self,
        session: NaiveDate,
        price_of: &dyn Fn(&str) -> Option<f64>,
    ) -> Vec<Transaction> {
        let mut filled = Vec::new();
        for order in self
            .orders
            .iter_mut()
            .filter(|o| o.status == OrderStatus::Open && o.amount != 0)
        {
            let Some(price) = price_of(&order.symbol) else {
                continue;
            };
            order.status = OrderStatus::Filled;
            filled.push(Transaction {
                order_id: order.id,
                symbol: order.symbol.clone(),
                amount: order.amount,
                price,
                session,
            });
        }
        filled
    }

    fn end_of_session(&mut self, session: NaiveDate) {
        if self.policy != CancelPolicy::EndOfDay {
            return;
        }
        for order in self
            .orders
            .iter_mut()
            .filter(|o| o.status == OrderStatus::Open)
        {
            debug!(order = order.id, symbol = %order.symbol, %session, "cancelling unfilled order");
            order.status = OrderStatus::Cancelled;
        }
    }
}
