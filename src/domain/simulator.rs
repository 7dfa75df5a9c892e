//! Portfolio simulator: the daily event loop and the weekly unified
//! rebalance.
//!
//! Ordering within a day is fixed: stop-loss and gap exits fire at the
//! open, the equity curve is marked, the bear overlay runs, and the
//! rebalance (when the weekday matches) executes last. Signals always come
//! from the previous trading day's data while fills use the current day's
//! prices, so no trade ever sees same-day information.

use crate::domain::calendar::TradingCalendar;
use crate::domain::config::StrategyConfig;
use crate::domain::error::RotatorError;
use crate::domain::metrics::TickerMetrics;
use crate::domain::portfolio::Portfolio;
use crate::domain::ranking::RankingEngine;
use crate::domain::regime::RegimeClassifier;
use crate::domain::trade::{
    EquitySnapshot, HoldingPosition, HoldingsSummary, RebalanceSnapshot, Trade, TradeAction,
};
use crate::ports::data_port::MarketDataPort;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeSet, HashMap};

/// Benchmark drawdown levels that trigger staged hedge entries.
const DIP_LEVELS: [f64; 3] = [0.15, 0.20, 0.25];
/// Capital fraction committed at each dip level, deepest gets the most.
const DIP_ALLOCATIONS: [f64; 3] = [0.30, 0.30, 0.40];
/// Consecutive rebalance-day closes above the long moving average needed
/// before stock trading resumes.
const BULL_CONFIRM_WEEKS: u32 = 2;
/// Names recorded in each rebalance audit snapshot.
const SNAPSHOT_TOP_COUNT: usize = 20;
/// Fraction of free cash the redistribution step may deploy.
const REDISTRIBUTE_CASH_BUFFER: f64 = 0.99;

/// Inverse-volatility weights: each ticker gets (1/atr_pct) normalized over
/// the group, so calmer names carry more capital. Tickers with a
/// non-positive ATR percentage are dropped before normalizing.
pub fn inverse_atr_weights(candidates: &[TickerMetrics]) -> HashMap<String, f64> {
    let valid: Vec<&TickerMetrics> = candidates.iter().filter(|m| m.atr_pct > 0.0).collect();
    if valid.is_empty() {
        return HashMap::new();
    }
    let inverse_sum: f64 = valid.iter().map(|m| 1.0 / m.atr_pct).sum();
    valid
        .into_iter()
        .map(|m| (m.ticker.clone(), (1.0 / m.atr_pct) / inverse_sum))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CloseScope {
    All,
    Stocks,
    Hedge,
}

impl CloseScope {
    fn label(self) -> &'static str {
        match self {
            CloseScope::All => "ALL",
            CloseScope::Stocks => "STOCK",
            CloseScope::Hedge => "DIP",
        }
    }
}

/// A sell decided during planning, executed after planning completes so a
/// partially filled plan never sees its own effects.
struct PlannedSale {
    ticker: String,
    quantity: u64,
    price: f64,
    reason: String,
    weight_before: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutput {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquitySnapshot>,
    pub rebalance_snapshots: Vec<RebalanceSnapshot>,
    /// Open positions at the final simulated day.
    pub holdings: HoldingsSummary,
}

pub struct Simulator<'a> {
    config: &'a StrategyConfig,
    data: &'a dyn MarketDataPort,
    engine: &'a RankingEngine<'a>,
    regime: &'a RegimeClassifier,
    calendar: &'a TradingCalendar,
    portfolio: Portfolio,
    /// Fractional targets from the last rebalance, keyed by ticker.
    target_weights: HashMap<String, f64>,
    bull_weeks: u32,
    dip_bought: [bool; 3],
    trades: Vec<Trade>,
    equity_curve: Vec<EquitySnapshot>,
    rebalance_snapshots: Vec<RebalanceSnapshot>,
    trade_logger: Option<Box<dyn Fn(&Trade) + 'a>>,
}

impl<'a> Simulator<'a> {
    pub fn new(
        config: &'a StrategyConfig,
        data: &'a dyn MarketDataPort,
        engine: &'a RankingEngine<'a>,
        regime: &'a RegimeClassifier,
        calendar: &'a TradingCalendar,
    ) -> Self {
        Simulator {
            config,
            data,
            engine,
            regime,
            calendar,
            portfolio: Portfolio::new(config.initial_cash),
            target_weights: HashMap::new(),
            bull_weeks: 0,
            dip_bought: [false; 3],
            trades: Vec::new(),
            equity_curve: Vec::new(),
            rebalance_snapshots: Vec::new(),
            trade_logger: None,
        }
    }

    /// Called with every executed trade as it happens. The CLI uses this
    /// for verbose per-trade output.
    pub fn with_trade_logger(mut self, logger: Box<dyn Fn(&Trade) + 'a>) -> Self {
        self.trade_logger = Some(logger);
        self
    }

    fn push_trade(&mut self, trade: Trade) {
        if let Some(logger) = &self.trade_logger {
            logger(&trade);
        }
        self.trades.push(trade);
    }

    pub fn run(mut self) -> Result<SimulationOutput, RotatorError> {
        let (start_idx, end_idx) = self
            .calendar
            .simulation_range(self.config.start_date, self.config.end_date)
            .ok_or_else(|| RotatorError::Data {
                reason: "no trading days inside the configured date range".to_string(),
            })?;
        let days: Vec<NaiveDate> = self.calendar.days()[start_idx..=end_idx].to_vec();

        for (i, &date) in days.iter().enumerate() {
            if i > 0 {
                self.check_stop_loss(date, days[i - 1]);
                self.check_gap_exit(date, days[i - 1]);
            }
            self.record_equity(date);
            self.check_bear_hedge(date);
            if self.is_rebalance_day(date) {
                let signal_date = if i > 0 { days[i - 1] } else { date };
                self.unified_rebalance(date, signal_date, self.is_rotation_week(date));
            }
        }

        let final_date = days[days.len() - 1];
        if !self.config.live_mode {
            self.close_positions(final_date, CloseScope::All);
        }
        let holdings = self.current_holdings(final_date);

        Ok(SimulationOutput {
            trades: self.trades,
            equity_curve: self.equity_curve,
            rebalance_snapshots: self.rebalance_snapshots,
            holdings,
        })
    }

    // ---- daily checks ----

    /// Sells any stock whose previous close fell below the stop level
    /// derived from its average cost. Fills at today's open. The hedge is
    /// exempt, its exits are managed by the bear overlay.
    fn check_stop_loss(&mut self, date: NaiveDate, prev_date: NaiveDate) {
        let config = self.config;
        for ticker in self.portfolio.tickers() {
            if ticker == config.hedge_ticker {
                continue;
            }
            let prev_close = self.price_on(&ticker, prev_date, false);
            if prev_close <= 0.0 {
                continue;
            }
            let Some((average_cost, quantity)) = self
                .portfolio
                .position(&ticker)
                .map(|p| (p.average_cost, p.quantity))
            else {
                continue;
            };
            if average_cost <= 0.0 {
                continue;
            }
            if prev_close >= average_cost * (1.0 - config.stop_loss_pct) {
                continue;
            }
            let open = self.price_on(&ticker, date, true);
            if open <= 0.0 {
                continue;
            }
            let reason = format!(
                "Stop Loss (Prev Close {:.2} < Cost {:.2})",
                prev_close, average_cost
            );
            self.execute_sell(&ticker, date, open, quantity, reason, None, None);
            self.target_weights.remove(&ticker);
        }
    }

    /// Sells any stock that opened yesterday with an overnight move beyond
    /// the gap threshold in either direction. Fills at today's open.
    fn check_gap_exit(&mut self, date: NaiveDate, prev_date: NaiveDate) {
        let Some(day_before) = self.calendar.prev_trading_day(prev_date) else {
            return;
        };
        let config = self.config;
        for ticker in self.portfolio.tickers() {
            if ticker == config.hedge_ticker {
                continue;
            }
            let prev_open = self.price_on(&ticker, prev_date, true);
            let base_close = self.price_on(&ticker, day_before, false);
            if base_close <= 0.0 || prev_open <= 0.0 {
                continue;
            }
            let gap = (prev_open - base_close) / base_close;
            if gap.abs() < config.gap_exit_pct {
                continue;
            }
            let open = self.price_on(&ticker, date, true);
            if open <= 0.0 {
                continue;
            }
            let quantity = self
                .portfolio
                .position(&ticker)
                .map(|p| p.quantity)
                .unwrap_or(0);
            if quantity == 0 {
                continue;
            }
            let direction = if gap > 0.0 { "Up" } else { "Down" };
            let reason = format!(
                "Gap Exit ({:+.1}% {} on {})",
                gap * 100.0,
                direction,
                prev_date
            );
            self.execute_sell(&ticker, date, open, quantity, reason, None, None);
            self.target_weights.remove(&ticker);
        }
    }

    /// Bear overlay, run every day after the equity mark.
    ///
    /// The bull counter only moves on rebalance weekdays: a benchmark close
    /// above its long moving average increments it, anything else resets it
    /// to zero. Two consecutive counts confirm a bull market; on the next
    /// rebalance day with a confirmed bull the hedge is cleared at the
    /// close. While unconfirmed and below the moving average, stocks are
    /// liquidated at the open and hedge tranches are bought at the close as
    /// the benchmark drawdown crosses each dip level, one entry per level
    /// per bear episode.
    fn check_bear_hedge(&mut self, date: NaiveDate) {
        let Some(state) = self.regime.state_on(date) else {
            return;
        };
        let above = state.ma200.map(|ma| state.close > ma).unwrap_or(false);
        let rebalance_day = self.is_rebalance_day(date);
        if rebalance_day {
            self.bull_weeks = if above { self.bull_weeks + 1 } else { 0 };
        }

        if self.bull_weeks >= BULL_CONFIRM_WEEKS {
            if rebalance_day && self.portfolio.has_position(&self.config.hedge_ticker) {
                self.close_positions(date, CloseScope::Hedge);
                self.dip_bought = [false; 3];
            }
            return;
        }

        let below = state.ma200.map(|ma| state.close < ma).unwrap_or(false);
        if !below {
            return;
        }

        if !self.held_stocks().is_empty() {
            self.close_positions(date, CloseScope::Stocks);
            self.target_weights.clear();
        }

        let config = self.config;
        let drawdown = state.drawdown.abs();
        for (i, &level) in DIP_LEVELS.iter().enumerate() {
            if self.dip_bought[i] || drawdown < level {
                continue;
            }
            let base = if config.compounding {
                self.total_equity(date)
            } else {
                config.initial_cash
            };
            let target_amount = base * DIP_ALLOCATIONS[i];
            let buy_amount = target_amount.min(self.portfolio.cash);
            let price = self.price_on(&config.hedge_ticker, date, false);
            if price <= 0.0 || buy_amount <= 0.0 {
                continue;
            }
            let quantity =
                (buy_amount / (price * (1.0 + config.commission_rate))).floor() as u64;
            if quantity == 0 {
                continue;
            }
            let reason = format!("Bear Dip Buy -{:.0}%", level * 100.0);
            if self.execute_buy(&config.hedge_ticker, date, price, quantity, reason, None) {
                self.dip_bought[i] = true;
            }
        }
    }

    // ---- weekly rebalance ----

    /// The five-phase rebalance: rotation sells, target-portfolio
    /// construction, overweight trims, new buys, then cash redistribution.
    /// Rotation phases only run on rotation weeks; trims and top-ups run on
    /// every rebalance day.
    fn unified_rebalance(&mut self, date: NaiveDate, signal_date: NaiveDate, rotation_week: bool) {
        if self.bull_weeks < BULL_CONFIRM_WEEKS {
            if !self.held_stocks().is_empty() {
                self.close_positions(date, CloseScope::Stocks);
                self.target_weights.clear();
            }
            return;
        }

        // Phase 1: rotation sells. Weight-before uses the equity right
        // before each individual fill.
        let mut rotation_sold: BTreeSet<String> = BTreeSet::new();
        if rotation_week {
            for sale in self.rotation_sells(date, signal_date) {
                rotation_sold.insert(sale.ticker.clone());
                let equity = self.total_equity(date);
                let held = self
                    .portfolio
                    .position(&sale.ticker)
                    .map(|p| p.quantity)
                    .unwrap_or(0);
                let weight_before = if equity > 0.0 {
                    sale.price * held as f64 / equity * 100.0
                } else {
                    0.0
                };
                if held > 0 && held >= sale.quantity {
                    self.execute_sell(
                        &sale.ticker,
                        date,
                        sale.price,
                        sale.quantity,
                        sale.reason,
                        None,
                        Some(weight_before),
                    );
                    self.target_weights.remove(&sale.ticker);
                }
            }
        }

        // Phase 2: decide the full target portfolio and its weights.
        let (buy_list, mut full_weights) = if rotation_week {
            self.buy_candidates(date, signal_date)
        } else {
            (Vec::new(), HashMap::new())
        };
        if full_weights.is_empty() {
            let held: Vec<String> = self
                .held_stocks()
                .into_iter()
                .filter(|ticker| !rotation_sold.contains(ticker))
                .collect();
            let mut with_atr: Vec<TickerMetrics> = Vec::new();
            for ticker in held {
                if let Some(metrics) =
                    self.engine
                        .calculate_metrics(&ticker, date, self.config.lookback)
                {
                    if metrics.atr_pct > 0.0 {
                        with_atr.push(metrics);
                    }
                }
            }
            if !with_atr.is_empty() {
                full_weights = inverse_atr_weights(&with_atr);
            }
        }
        if !full_weights.is_empty() {
            self.target_weights = full_weights.clone();
        }

        // Phase 3: trim overweights against the full-portfolio targets.
        for sale in self.overweight_sells(date, &rotation_sold, &full_weights) {
            let held = self
                .portfolio
                .position(&sale.ticker)
                .map(|p| p.quantity)
                .unwrap_or(0);
            if held > 0 && held >= sale.quantity {
                self.execute_sell(
                    &sale.ticker,
                    date,
                    sale.price,
                    sale.quantity,
                    sale.reason,
                    None,
                    sale.weight_before,
                );
            }
        }

        // Phase 4: buy new names at their target weights.
        let mut newly_bought: BTreeSet<String> = BTreeSet::new();
        if rotation_week && !buy_list.is_empty() {
            let config = self.config;
            let equity_base = if config.compounding {
                self.total_equity(date)
            } else {
                config.initial_cash
            };
            for (ticker, exec_price) in &buy_list {
                let weight = full_weights.get(ticker).copied().unwrap_or(0.0);
                if weight <= 0.0 || *exec_price <= 0.0 {
                    continue;
                }
                let allocation = equity_base * weight;
                let buy_amount = allocation.min(self.portfolio.cash);
                let quantity = (buy_amount / (exec_price * (1.0 + config.commission_rate)))
                    .floor() as u64;
                if quantity == 0 {
                    continue;
                }
                let cost = exec_price * quantity as f64 * (1.0 + config.commission_rate);
                if self.portfolio.cash < cost {
                    continue;
                }
                let reason = format!("ATR Buy (W:{:.1}%)", weight * 100.0);
                if self.execute_buy(ticker, date, *exec_price, quantity, reason, Some(weight)) {
                    newly_bought.insert(ticker.clone());
                }
            }
        }

        // Phase 5: put leftover cash to work in underweight names.
        self.redistribute_cash(date, &newly_bought);

        if rotation_week {
            self.record_rebalance_snapshot(date, signal_date);
        }
    }

    /// Held stocks to sell this rotation: either the name dropped out of
    /// the top ranks, or its signal-day close sits below the exit EMA.
    fn rotation_sells(&self, date: NaiveDate, signal_date: NaiveDate) -> Vec<PlannedSale> {
        let config = self.config;
        let scan = self.engine.scan_market(signal_date, config.lookback);
        let top_for_exit: Vec<&str> = scan
            .iter()
            .take(config.sell_rank_threshold)
            .map(|m| m.ticker.as_str())
            .collect();

        let mut sells = Vec::new();
        for ticker in self.held_stocks() {
            let mut reason: Option<String> = None;
            if !top_for_exit.iter().any(|t| *t == ticker) {
                reason = Some(format!(
                    "Rank fell below top {}",
                    config.sell_rank_threshold
                ));
            } else if let Some(row) = scan.iter().find(|m| m.ticker == ticker) {
                if row.price < row.exit_ema {
                    reason = Some(format!("Price below EMA{}", config.exit_ema_span));
                }
            }
            let Some(reason) = reason else {
                continue;
            };
            let exec_price = self.price_on(&ticker, date, true);
            if exec_price <= 0.0 {
                continue;
            }
            let quantity = self
                .portfolio
                .position(&ticker)
                .map(|p| p.quantity)
                .unwrap_or(0);
            sells.push(PlannedSale {
                ticker,
                quantity,
                price: exec_price,
                reason,
                weight_before: None,
            });
        }
        sells
    }

    /// Picks new names from the signal-day scan to fill the portfolio back
    /// to its target count, then computes inverse-ATR weights over kept
    /// holdings plus the picks. Returns the buy list with execution prices
    /// and the full weight map.
    fn buy_candidates(
        &self,
        date: NaiveDate,
        signal_date: NaiveDate,
    ) -> (Vec<(String, f64)>, HashMap<String, f64>) {
        let config = self.config;
        let scan = self.engine.scan_market(signal_date, config.lookback);
        let filtered: Vec<&TickerMetrics> = scan
            .iter()
            .filter(|m| config.max_adj_slope.map(|cap| m.score < cap).unwrap_or(true))
            .filter(|m| m.max_gap < config.skip_max_gap_pct)
            .collect();

        let held = self.held_stocks();
        let needed = config.target_holdings.saturating_sub(held.len());

        let mut buy_list: Vec<(String, f64)> = Vec::new();
        if needed > 0 {
            let candidates: Vec<&TickerMetrics> = filtered
                .iter()
                .copied()
                .filter(|m| !held.contains(&m.ticker))
                .collect();
            let picked: Vec<String> = if config.corr_filter_enabled {
                let rows: Vec<TickerMetrics> =
                    candidates.iter().map(|m| (*m).clone()).collect();
                self.engine
                    .filter_by_residual_correlation(&rows, signal_date, needed, &held)
            } else {
                candidates
                    .iter()
                    .take(needed)
                    .map(|m| m.ticker.clone())
                    .collect()
            };
            for ticker in picked {
                let exec_price = self.price_on(&ticker, date, true);
                if exec_price > 0.0 {
                    buy_list.push((ticker, exec_price));
                }
            }
        }

        let mut portfolio_tickers = held;
        portfolio_tickers.extend(buy_list.iter().map(|(ticker, _)| ticker.clone()));
        let mut with_atr: Vec<TickerMetrics> = Vec::new();
        for ticker in &portfolio_tickers {
            let metrics = filtered
                .iter()
                .find(|m| m.ticker == *ticker)
                .map(|m| (*m).clone())
                .or_else(|| self.engine.calculate_metrics(ticker, date, config.lookback));
            if let Some(metrics) = metrics {
                if metrics.atr_pct > 0.0 {
                    with_atr.push(metrics);
                }
            }
        }
        (buy_list, inverse_atr_weights(&with_atr))
    }

    /// Stocks whose current weight exceeds the target by at least the
    /// rebalance threshold, with the share count that brings them back. The
    /// whole step is skipped when any held stock is missing an execution
    /// price, so a data hole never causes a lopsided trim.
    fn overweight_sells(
        &self,
        date: NaiveDate,
        exclude: &BTreeSet<String>,
        weights: &HashMap<String, f64>,
    ) -> Vec<PlannedSale> {
        let mut sells = Vec::new();
        let stocks: Vec<String> = self
            .held_stocks()
            .into_iter()
            .filter(|ticker| !exclude.contains(ticker))
            .collect();
        if stocks.is_empty() || weights.is_empty() {
            return sells;
        }
        for ticker in &stocks {
            if self.price_on(ticker, date, true) <= 0.0 {
                return sells;
            }
        }
        let equity = self.total_equity(date);
        if equity <= 0.0 {
            return sells;
        }

        let threshold = self.config.effective_rebalance_threshold();
        for ticker in &stocks {
            let Some(&target) = weights.get(ticker) else {
                continue;
            };
            let quantity = self
                .portfolio
                .position(ticker)
                .map(|p| p.quantity)
                .unwrap_or(0);
            let price = self.price_on(ticker, date, true);
            if price <= 0.0 {
                continue;
            }
            let current_value = price * quantity as f64;
            let current_weight = current_value / equity;
            if current_weight - target < threshold {
                continue;
            }
            let diff_value = current_value - equity * target;
            if diff_value < price {
                continue;
            }
            let sell_qty = ((diff_value / price).floor() as u64).min(quantity);
            if sell_qty == 0 {
                continue;
            }
            sells.push(PlannedSale {
                ticker: ticker.clone(),
                quantity: sell_qty,
                price,
                reason: format!(
                    "Overweight Sell ({:.1}% -> {:.1}%)",
                    current_weight * 100.0,
                    target * 100.0
                ),
                weight_before: Some(current_weight * 100.0),
            });
        }
        sells
    }

    /// Spreads almost all remaining cash across held stocks that sit below
    /// target by at least the rebalance threshold, proportional to each
    /// shortfall. Buys below the minimum order size are dropped.
    fn redistribute_cash(&mut self, date: NaiveDate, exclude: &BTreeSet<String>) {
        let config = self.config;
        let stocks = self.held_stocks();
        if stocks.is_empty() || self.portfolio.cash <= 0.0 {
            return;
        }
        let equity = self.total_equity(date);
        if equity <= 0.0 {
            return;
        }

        struct Shortfall {
            ticker: String,
            price: f64,
            amount: f64,
            target: f64,
        }

        let threshold = config.effective_rebalance_threshold();
        let mut underweights: Vec<Shortfall> = Vec::new();
        for ticker in stocks {
            if exclude.contains(&ticker) {
                continue;
            }
            let Some(&target) = self.target_weights.get(&ticker) else {
                continue;
            };
            let quantity = self
                .portfolio
                .position(&ticker)
                .map(|p| p.quantity)
                .unwrap_or(0);
            let price = self.price_on(&ticker, date, true);
            if price <= 0.0 {
                continue;
            }
            let current_weight = price * quantity as f64 / equity;
            let amount = target - current_weight;
            if amount >= threshold {
                underweights.push(Shortfall {
                    ticker,
                    price,
                    amount,
                    target,
                });
            }
        }
        if underweights.is_empty() {
            return;
        }
        let total_shortfall: f64 = underweights.iter().map(|u| u.amount).sum();
        if total_shortfall <= 0.0 {
            return;
        }

        let available = self.portfolio.cash * REDISTRIBUTE_CASH_BUFFER;
        let min_buy_amount = equity * config.min_buy_amount_pct;
        for entry in underweights {
            let allocation = available * (entry.amount / total_shortfall);
            let quantity =
                (allocation / (entry.price * (1.0 + config.commission_rate))).floor() as u64;
            if quantity == 0 {
                continue;
            }
            let buy_amount = entry.price * quantity as f64;
            if buy_amount < min_buy_amount {
                continue;
            }
            if self.portfolio.cash < buy_amount * (1.0 + config.commission_rate) {
                continue;
            }
            let reason = format!("Underweight Top-Up (Target: {:.1}%)", entry.target * 100.0);
            self.execute_buy(
                &entry.ticker,
                date,
                entry.price,
                quantity,
                reason,
                Some(entry.target),
            );
        }
    }

    /// Audit record at the close of a rotation day: held weights plus the
    /// top of the filtered signal-day ranking.
    fn record_rebalance_snapshot(&mut self, date: NaiveDate, signal_date: NaiveDate) {
        let config = self.config;
        let equity = self.total_equity(date);
        let marks = self.close_marks(date);
        let mut weights: Vec<(String, f64)> = self
            .portfolio
            .positions()
            .filter(|p| p.quantity > 0)
            .map(|p| {
                let mark = marks.get(&p.ticker).copied().unwrap_or(0.0);
                let weight = if equity > 0.0 {
                    p.market_value(mark) / equity * 100.0
                } else {
                    0.0
                };
                (p.ticker.clone(), weight)
            })
            .collect();
        weights.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let scan = self.engine.scan_market(signal_date, config.lookback);
        let top_ranked: Vec<String> = scan
            .iter()
            .filter(|m| config.max_adj_slope.map(|cap| m.score < cap).unwrap_or(true))
            .filter(|m| m.max_gap < config.skip_max_gap_pct)
            .take(SNAPSHOT_TOP_COUNT)
            .map(|m| m.ticker.clone())
            .collect();

        self.rebalance_snapshots.push(RebalanceSnapshot {
            date,
            signal_date,
            weights,
            top_ranked,
        });
    }

    // ---- execution ----

    /// Sells every position the scope selects. Stock and full liquidations
    /// fill at the open; hedge exits fill at the close. A position with no
    /// price that day is left untouched.
    fn close_positions(&mut self, date: NaiveDate, scope: CloseScope) {
        let config = self.config;
        for ticker in self.portfolio.tickers() {
            let is_hedge = ticker == config.hedge_ticker;
            let selected = match scope {
                CloseScope::All => true,
                CloseScope::Hedge => is_hedge,
                CloseScope::Stocks => !is_hedge && ticker != config.benchmark_ticker,
            };
            if !selected {
                continue;
            }
            let use_open = scope != CloseScope::Hedge;
            let price = self.price_on(&ticker, date, use_open);
            if price <= 0.0 {
                continue;
            }
            let quantity = self
                .portfolio
                .position(&ticker)
                .map(|p| p.quantity)
                .unwrap_or(0);
            if quantity == 0 {
                continue;
            }
            let reason = format!("Clear {}", scope.label());
            self.execute_sell(&ticker, date, price, quantity, reason, None, None);
        }
    }

    fn execute_buy(
        &mut self,
        ticker: &str,
        date: NaiveDate,
        price: f64,
        quantity: u64,
        reason: String,
        target_weight: Option<f64>,
    ) -> bool {
        let equity_before = self.total_equity(date);
        let old_qty = self
            .portfolio
            .position(ticker)
            .map(|p| p.quantity)
            .unwrap_or(0);
        let weight_before = if equity_before > 0.0 && old_qty > 0 {
            price * old_qty as f64 / equity_before * 100.0
        } else {
            0.0
        };

        let Some(cost) = self
            .portfolio
            .buy(ticker, price, quantity, self.config.commission_rate)
        else {
            return false;
        };

        let new_qty = self
            .portfolio
            .position(ticker)
            .map(|p| p.quantity)
            .unwrap_or(0);
        let equity_after = self.total_equity(date);
        let weight_after = if equity_after > 0.0 {
            price * new_qty as f64 / equity_after * 100.0
        } else {
            0.0
        };
        let holdings = self.holdings_snapshot(date);

        self.push_trade(Trade {
            date,
            ticker: ticker.to_string(),
            action: TradeAction::Buy,
            price,
            quantity,
            cash_flow: cost,
            reason,
            pnl: None,
            pnl_pct: None,
            weight_before,
            weight_after,
            target_weight: target_weight.map(|w| w * 100.0),
            total_equity_after: equity_after,
            holdings,
        });
        true
    }

    fn execute_sell(
        &mut self,
        ticker: &str,
        date: NaiveDate,
        price: f64,
        quantity: u64,
        reason: String,
        target_weight: Option<f64>,
        weight_before: Option<f64>,
    ) {
        let weight_before = weight_before.unwrap_or_else(|| {
            let equity_before = self.total_equity(date);
            let held = self
                .portfolio
                .position(ticker)
                .map(|p| p.quantity)
                .unwrap_or(0);
            if equity_before > 0.0 {
                price * held as f64 / equity_before * 100.0
            } else {
                0.0
            }
        });

        let before_qty = self
            .portfolio
            .position(ticker)
            .map(|p| p.quantity)
            .unwrap_or(0);
        let Some(outcome) = self
            .portfolio
            .sell(ticker, price, quantity, self.config.commission_rate)
        else {
            return;
        };

        let remaining = before_qty - outcome.quantity;
        let equity_after = self.total_equity(date);
        let weight_after = if remaining > 0 && equity_after > 0.0 {
            price * remaining as f64 / equity_after * 100.0
        } else {
            0.0
        };
        let holdings = self.holdings_snapshot(date);

        self.push_trade(Trade {
            date,
            ticker: ticker.to_string(),
            action: TradeAction::Sell,
            price,
            quantity: outcome.quantity,
            cash_flow: outcome.revenue,
            reason,
            pnl: Some(outcome.pnl),
            pnl_pct: Some(outcome.pnl_pct),
            weight_before,
            weight_after,
            target_weight: target_weight.map(|w| w * 100.0),
            total_equity_after: equity_after,
            holdings,
        });
    }

    // ---- pricing and bookkeeping ----

    /// Execution/mark price for an exact date, 0.0 when the ticker has no
    /// bar that day. The benchmark and hedge load from close-only files, so
    /// lookups against them resolve to the close even when an open was
    /// requested.
    fn price_on(&self, ticker: &str, date: NaiveDate, use_open: bool) -> f64 {
        if ticker == self.config.hedge_ticker || ticker == self.config.benchmark_ticker {
            return match self.data.get_benchmark_series(ticker) {
                Ok(Some(series)) => series.close_on(date).unwrap_or(0.0),
                _ => 0.0,
            };
        }
        match self.data.get_series(ticker) {
            Ok(Some(series)) => series
                .bar_on(date)
                .map(|bar| if use_open { bar.open } else { bar.close })
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn close_marks(&self, date: NaiveDate) -> HashMap<String, f64> {
        self.portfolio
            .tickers()
            .into_iter()
            .map(|ticker| {
                let mark = self.price_on(&ticker, date, false);
                (ticker, mark)
            })
            .collect()
    }

    fn total_equity(&self, date: NaiveDate) -> f64 {
        self.portfolio.total_equity(&self.close_marks(date))
    }

    fn holdings_snapshot(&self, date: NaiveDate) -> String {
        self.portfolio.holdings_snapshot(&self.close_marks(date))
    }

    fn record_equity(&mut self, date: NaiveDate) {
        let total_equity = self.total_equity(date);
        self.equity_curve.push(EquitySnapshot {
            date,
            total_equity,
            cash: self.portfolio.cash,
        });
    }

    /// Held tickers that are neither the hedge nor the benchmark.
    fn held_stocks(&self) -> Vec<String> {
        self.portfolio
            .tickers()
            .into_iter()
            .filter(|ticker| {
                *ticker != self.config.hedge_ticker && *ticker != self.config.benchmark_ticker
            })
            .collect()
    }

    fn is_rebalance_day(&self, date: NaiveDate) -> bool {
        date.weekday().num_days_from_monday() == self.config.rebalance_weekday
    }

    fn is_rotation_week(&self, date: NaiveDate) -> bool {
        date.iso_week().week() % self.config.rebalance_weeks == 0
    }

    /// Open-position summary marked at `date`, sorted by weight.
    fn current_holdings(&self, date: NaiveDate) -> HoldingsSummary {
        let equity = self.total_equity(date);
        let mut positions: Vec<HoldingPosition> = Vec::new();
        for position in self.portfolio.positions() {
            if position.quantity == 0 {
                continue;
            }
            let price = self.price_on(&position.ticker, date, false);
            let value = position.market_value(price);
            let basis = position.cost_basis();
            let pnl = value - basis;
            let pnl_pct = if basis > 0.0 { pnl / basis * 100.0 } else { 0.0 };
            let weight = if equity > 0.0 { value / equity * 100.0 } else { 0.0 };
            let target_weight = self
                .target_weights
                .get(&position.ticker)
                .copied()
                .unwrap_or(0.0)
                * 100.0;
            positions.push(HoldingPosition {
                ticker: position.ticker.clone(),
                quantity: position.quantity,
                average_cost: position.average_cost,
                price,
                market_value: value,
                pnl,
                pnl_pct,
                weight,
                target_weight,
            });
        }
        positions.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let target_weights = self
            .target_weights
            .iter()
            .map(|(ticker, weight)| (ticker.clone(), weight * 100.0))
            .collect();

        HoldingsSummary {
            as_of: date,
            positions,
            cash: self.portfolio.cash,
            total_equity: equity,
            target_weights,
        }
    }
}
