//! Cash and position bookkeeping for a single run.

use std::collections::BTreeMap;

use crate::domain::blotter::Transaction;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub amount: i64,
    pub cost_basis: f64,
    pub last_price: f64,
}

impl Position {
    pub fn market_value(&self) -> f64 {
        self.amount as f64 * self.last_price
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub capital_base: f64,
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
}

impl Ledger {
    pub fn new(capital_base: f64) -> Self {
        Ledger {
            capital_base,
            cash: capital_base,
            positions: BTreeMap::new(),
        }
    }

    pub fn apply(&mut self, txn: &Transaction) {
        self.cash -= txn.amount as f64 * txn.price;
        let pos = self
            .positions
            .entry(txn.symbol.clone())
            .or_insert_with(|| Position {
                symbol: txn.symbol.clone(),
                amount: 0,
                cost_basis: 0.0,
                last_price: txn.price,
            });

        let new_amount = pos.amount + txn.amount;
        if new_amount == 0 {
            self.positions.remove(&txn.symbol);
            return;
        }
        // Cost basis only moves when the position grows in its current direction.
        if pos.amount == 0 || pos.amount.signum() == txn.amount.signum() {
            let total_cost = pos.cost_basis * pos.amount as f64 + txn.price * txn.amount as f64;
            pos.cost_basis = total_cost / new_amount as f64;
        } else if new_amount.signum() != pos.amount.signum() {
            pos.cost_basis = txn.price;
        }
        pos.amount = new_amount;
        pos.last_price = txn.price;
    }

    /// Mark open positions to the latest known prices.
    pub fn mark_to_market(&mut self, price_of: &dyn Fn(&str) -> Option<f64>) {
        for pos in self.positions.values_mut() {
            if let Some(price) = price_of(&pos.symbol) {
                pos.last_price = price;
            }
        }
    }

    pub fn positions_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    pub fn portfolio_value(&self) -> f64 {
        self.cash + self.positions_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn txn(symbol: &str, amount: i64, price: f64) -> Transaction {
        Transaction {
            order_id: 1,
            symbol: symbol.to_string(),
            amount,
            price,
            session: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }
    }

    #[test]
    fn new_ledger_is_all_cash() {
        let ledger = Ledger::new(100_000.0);
        assert_eq!(ledger.cash, 100_000.0);
        assert!(ledger.positions.is_empty());
        assert_eq!(ledger.portfolio_value(), 100_000.0);
    }

    #[test]
    fn buy_moves_cash_into_position() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.apply(&txn("AAPL", 10, 100.0));
        assert_eq!(ledger.cash, 9_000.0);
        assert_eq!(ledger.positions["AAPL"].amount, 10);
        assert_eq!(ledger.portfolio_value(), 10_000.0);
    }

    #[test]
    fn adding_to_position_averages_cost() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.apply(&txn("AAPL", 10, 100.0));
        ledger.apply(&txn("AAPL", 10, 110.0));
        assert_eq!(ledger.positions["AAPL"].cost_basis, 105.0);
    }

    #[test]
    fn closing_removes_position() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.apply(&txn("AAPL", 10, 100.0));
        ledger.apply(&txn("AAPL", -10, 120.0));
        assert!(ledger.positions.is_empty());
        assert_eq!(ledger.cash, 10_200.0);
    }

    #[test]
    fn flipping_resets_cost_basis() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.apply(&txn("AAPL", 10, 100.0));
        ledger.apply(&txn("AAPL", -15, 90.0));
        let pos = &ledger.positions["AAPL"];
        assert_eq!(pos.amount, -5);
        assert_eq!(pos.cost_basis, 90.0);
    }

    #[test]
    fn mark_to_market_updates_value() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.apply(&txn("AAPL", 10, 100.0));
        ledger.mark_to_market(&|s| (s == "AAPL").then_some(150.0));
        assert_eq!(ledger.positions_value(), 1_500.0);
        assert_eq!(ledger.portfolio_value(), 10_500.0);
    }
}
