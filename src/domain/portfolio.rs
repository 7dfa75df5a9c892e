//! Portfolio state: cash plus whole-share positions.
//!
//! The simulator owns exactly one `Portfolio` per run and mutates it only
//! through `buy` and `sell`, which enforce whole-share sizing, symmetric
//! commission and the no-oversell rule. Positions iterate in ticker order
//! so identical runs always produce identical ledgers.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub quantity: u64,
    /// Quantity-weighted running average of buy prices, commission included.
    pub average_cost: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.average_cost
    }
}

/// Result of a sell, net of commission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellOutcome {
    pub quantity: u64,
    pub revenue: f64,
    pub pnl: f64,
    /// Percent of the sold shares' cost basis.
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_cash: f64,
    positions: BTreeMap<String, Position>,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Portfolio {
            cash: initial_cash,
            initial_cash,
            positions: BTreeMap::new(),
        }
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn has_position(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Held tickers in sorted order.
    pub fn tickers(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Executes a buy at `price` for `quantity` whole shares. Returns the
    /// cash spent (commission included), or `None` without mutating state
    /// when the price is non-positive, the quantity is zero or cash cannot
    /// cover the cost.
    pub fn buy(
        &mut self,
        ticker: &str,
        price: f64,
        quantity: u64,
        commission_rate: f64,
    ) -> Option<f64> {
        if price <= 0.0 || quantity == 0 {
            return None;
        }
        let cost = price * quantity as f64 * (1.0 + commission_rate);
        if cost > self.cash {
            return None;
        }

        let unit_cost = price * (1.0 + commission_rate);
        match self.positions.get_mut(ticker) {
            Some(position) => {
                let total_qty = position.quantity + quantity;
                position.average_cost = (position.cost_basis() + unit_cost * quantity as f64)
                    / total_qty as f64;
                position.quantity = total_qty;
            }
            None => {
                self.positions.insert(
                    ticker.to_string(),
                    Position {
                        ticker: ticker.to_string(),
                        quantity,
                        average_cost: unit_cost,
                    },
                );
            }
        }
        self.cash -= cost;
        Some(cost)
    }

    /// Executes a sell at `price`, clamping `quantity` to the held amount.
    /// Removes the position when it reaches zero. Returns `None` without
    /// mutating state when nothing is held or the price is non-positive.
    pub fn sell(
        &mut self,
        ticker: &str,
        price: f64,
        quantity: u64,
        commission_rate: f64,
    ) -> Option<SellOutcome> {
        if price <= 0.0 || quantity == 0 {
            return None;
        }
        let position = self.positions.get_mut(ticker)?;
        let sell_qty = quantity.min(position.quantity);
        if sell_qty == 0 {
            return None;
        }

        let revenue = price * sell_qty as f64 * (1.0 - commission_rate);
        let basis = position.average_cost * sell_qty as f64;
        let pnl = revenue - basis;
        let pnl_pct = if basis > 0.0 { pnl / basis * 100.0 } else { 0.0 };

        position.quantity -= sell_qty;
        if position.quantity == 0 {
            self.positions.remove(ticker);
        }
        self.cash += revenue;

        Some(SellOutcome {
            quantity: sell_qty,
            revenue,
            pnl,
            pnl_pct,
        })
    }

    /// Cash plus positions marked at `marks`. A ticker missing from the
    /// marks contributes nothing, matching a day with no bar for it.
    pub fn total_equity(&self, marks: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .filter_map(|pos| marks.get(&pos.ticker).map(|&price| pos.market_value(price)))
            .sum();
        self.cash + position_value
    }

    /// Current weight of one ticker as a fraction of `equity`.
    pub fn weight_of(&self, ticker: &str, mark: f64, equity: f64) -> f64 {
        if equity <= 0.0 {
            return 0.0;
        }
        match self.positions.get(ticker) {
            Some(position) => position.market_value(mark) / equity,
            None => 0.0,
        }
    }

    /// Compact `TICKER:pct` listing used on every ledger row, positions in
    /// ticker order with cash appended when above a tenth of a percent.
    pub fn holdings_snapshot(&self, marks: &HashMap<String, f64>) -> String {
        let equity = self.total_equity(marks);
        if equity <= 0.0 {
            return "CASH:100%".to_string();
        }
        let mut parts: Vec<String> = Vec::with_capacity(self.positions.len() + 1);
        for position in self.positions.values() {
            let mark = marks.get(&position.ticker).copied().unwrap_or(0.0);
            let weight = position.market_value(mark) / equity * 100.0;
            parts.push(format!("{}:{:.1}%", position.ticker, weight));
        }
        let cash_pct = self.cash / equity * 100.0;
        if cash_pct > 0.1 {
            parts.push(format!("CASH:{:.1}%", cash_pct));
        }
        if parts.is_empty() {
            "CASH:100%".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn new_portfolio_is_all_cash() {
        let portfolio = Portfolio::new(100_000.0);
        assert!((portfolio.cash - 100_000.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.position_count(), 0);
    }

    #[test]
    fn buy_deducts_commissioned_cost_and_sets_average() {
        let mut portfolio = Portfolio::new(10_000.0);
        let cost = portfolio.buy("AAPL", 10.0, 100, 0.01).unwrap();
        assert_relative_eq!(cost, 1_010.0);
        assert_relative_eq!(portfolio.cash, 8_990.0);

        let position = portfolio.position("AAPL").unwrap();
        assert_eq!(position.quantity, 100);
        assert_relative_eq!(position.average_cost, 10.1);
    }

    #[test]
    fn second_buy_blends_average_cost() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.buy("AAPL", 10.0, 100, 0.01).unwrap();
        portfolio.buy("AAPL", 12.0, 50, 0.01).unwrap();

        let position = portfolio.position("AAPL").unwrap();
        assert_eq!(position.quantity, 150);
        // (1010 + 606) / 150
        assert_relative_eq!(position.average_cost, 1_616.0 / 150.0, epsilon = 1e-12);
    }

    #[test]
    fn buy_rejects_insufficient_cash() {
        let mut portfolio = Portfolio::new(1_000.0);
        assert!(portfolio.buy("AAPL", 10.0, 100, 0.01).is_none());
        assert!((portfolio.cash - 1_000.0).abs() < f64::EPSILON);
        assert!(!portfolio.has_position("AAPL"));
    }

    #[test]
    fn buy_rejects_degenerate_orders() {
        let mut portfolio = Portfolio::new(1_000.0);
        assert!(portfolio.buy("AAPL", 0.0, 10, 0.01).is_none());
        assert!(portfolio.buy("AAPL", -5.0, 10, 0.01).is_none());
        assert!(portfolio.buy("AAPL", 10.0, 0, 0.01).is_none());
    }

    #[test]
    fn sell_realizes_pnl_net_of_commission() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.buy("AAPL", 10.0, 100, 0.01).unwrap();
        portfolio.buy("AAPL", 12.0, 50, 0.01).unwrap();

        let outcome = portfolio.sell("AAPL", 11.0, 150, 0.01).unwrap();
        assert_eq!(outcome.quantity, 150);
        assert_relative_eq!(outcome.revenue, 1_633.5, epsilon = 1e-9);
        assert_relative_eq!(outcome.pnl, 17.5, epsilon = 1e-9);
        assert_relative_eq!(outcome.pnl_pct, 17.5 / 1_616.0 * 100.0, epsilon = 1e-9);
        assert!(!portfolio.has_position("AAPL"));
    }

    #[test]
    fn sell_clamps_to_held_quantity() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.buy("AAPL", 10.0, 100, 0.0).unwrap();

        let outcome = portfolio.sell("AAPL", 10.0, 500, 0.0).unwrap();
        assert_eq!(outcome.quantity, 100);
        assert!(!portfolio.has_position("AAPL"));
    }

    #[test]
    fn partial_sell_keeps_average_cost() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.buy("AAPL", 10.0, 100, 0.01).unwrap();
        portfolio.sell("AAPL", 11.0, 40, 0.01).unwrap();

        let position = portfolio.position("AAPL").unwrap();
        assert_eq!(position.quantity, 60);
        assert_relative_eq!(position.average_cost, 10.1);
    }

    #[test]
    fn sell_without_position_is_none() {
        let mut portfolio = Portfolio::new(10_000.0);
        assert!(portfolio.sell("AAPL", 10.0, 10, 0.01).is_none());
    }

    #[test]
    fn total_equity_skips_missing_marks() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.buy("AAPL", 10.0, 100, 0.0).unwrap();
        portfolio.buy("MSFT", 20.0, 50, 0.0).unwrap();

        let mut marks = HashMap::new();
        marks.insert("AAPL".to_string(), 12.0);
        // MSFT has no bar today and contributes nothing.
        let equity = portfolio.total_equity(&marks);
        assert_relative_eq!(equity, 8_000.0 + 1_200.0);
    }

    #[test]
    fn tickers_iterate_sorted() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.buy("MSFT", 20.0, 10, 0.0).unwrap();
        portfolio.buy("AAPL", 10.0, 10, 0.0).unwrap();
        portfolio.buy("GOOG", 30.0, 10, 0.0).unwrap();
        assert_eq!(portfolio.tickers(), vec!["AAPL", "GOOG", "MSFT"]);
    }

    #[test]
    fn holdings_snapshot_formats_weights() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.buy("AAPL", 10.0, 250, 0.0).unwrap();

        let mut marks = HashMap::new();
        marks.insert("AAPL".to_string(), 10.0);
        // 2500 position, 7500 cash.
        assert_eq!(portfolio.holdings_snapshot(&marks), "AAPL:25.0%, CASH:75.0%");
    }

    #[test]
    fn holdings_snapshot_all_cash() {
        let portfolio = Portfolio::new(10_000.0);
        assert_eq!(portfolio.holdings_snapshot(&HashMap::new()), "CASH:100.0%");
    }

    proptest! {
        /// Any interleaving of buys and sells leaves cash non-negative,
        /// keeps every open position at a positive share count and never
        /// sells more than is held.
        #[test]
        fn random_trade_sequences_keep_the_books_consistent(
            ops in prop::collection::vec(
                (any::<bool>(), 0usize..3, 1.0..500.0f64, 1u64..200),
                1..80
            )
        ) {
            let tickers = ["AAA", "BBB", "CCC"];
            let mut portfolio = Portfolio::new(50_000.0);
            for (is_buy, pick, price, quantity) in ops {
                let ticker = tickers[pick];
                if is_buy {
                    portfolio.buy(ticker, price, quantity, 0.01);
                } else {
                    let held = portfolio.position(ticker).map(|p| p.quantity).unwrap_or(0);
                    if let Some(outcome) = portfolio.sell(ticker, price, quantity, 0.01) {
                        prop_assert!(outcome.quantity <= held);
                        prop_assert!(outcome.revenue > 0.0);
                    }
                }
                prop_assert!(portfolio.cash >= 0.0);
                for position in portfolio.positions() {
                    prop_assert!(position.quantity > 0);
                    prop_assert!(position.average_cost > 0.0);
                }
            }
        }
    }
}
