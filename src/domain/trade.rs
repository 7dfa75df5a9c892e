//! Ledger record types.
//!
//! Everything the simulator emits for downstream export: the append-only
//! trade ledger, the daily equity curve, per-rebalance snapshots and the
//! live holdings summary. All types serialize directly into the CSV/JSON
//! ledger adapters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
        }
    }
}

/// One executed order. Weights are percentages of total equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: TradeAction,
    pub price: f64,
    pub quantity: u64,
    /// Cash spent on buys (commission included) or received on sells (net
    /// of commission).
    pub cash_flow: f64,
    pub reason: String,
    /// Realized profit, sells only.
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub weight_before: f64,
    pub weight_after: f64,
    pub target_weight: Option<f64>,
    pub total_equity_after: f64,
    pub holdings: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub date: NaiveDate,
    pub total_equity: f64,
    pub cash: f64,
}

/// Rotation-week audit record: weights held at the close plus the scan's
/// top-ranked names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceSnapshot {
    pub date: NaiveDate,
    /// Trading day whose scan produced the ranking.
    pub signal_date: NaiveDate,
    /// (ticker, percent weight) sorted by weight descending.
    pub weights: Vec<(String, f64)>,
    pub top_ranked: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingPosition {
    pub ticker: String,
    pub quantity: u64,
    pub average_cost: f64,
    pub price: f64,
    pub market_value: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    /// Percent of total equity.
    pub weight: f64,
    /// Percent target from the last rebalance, 0 when the ticker has none.
    pub target_weight: f64,
}

/// Final open-position state persisted in live-tracking mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingsSummary {
    pub as_of: NaiveDate,
    /// Sorted by weight descending.
    pub positions: Vec<HoldingPosition>,
    pub cash: f64,
    pub total_equity: f64,
    /// Percent targets from the last rebalance, keyed by ticker.
    pub target_weights: BTreeMap<String, f64>,
}
