//! Per-ticker ranking metrics.
//!
//! One `TickerMetrics` row summarises a ticker as of a date: momentum score,
//! gap risk, exit EMA and ATR volatility. Rows with too little history are
//! `None` rather than an error so a thin ticker never aborts a scan.

use crate::domain::series::{PRECOMPUTED_EMA_SPANS, PriceBar, PriceSeries, ema};
use crate::domain::stats::linear_fit_indexed;
use chrono::NaiveDate;

/// Score assigned when the log transform breaks (non-positive price) or the
/// regression is undefined. Sorts the ticker to the bottom of any ranking.
pub const SENTINEL_SCORE: f64 = -999.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TickerMetrics {
    pub ticker: String,
    /// Annualised regression slope scaled by fit quality.
    pub score: f64,
    /// Last close on or before the as-of date.
    pub price: f64,
    /// Largest overnight open-vs-prior-close move in the window, as a fraction.
    pub max_gap: f64,
    pub exit_ema: f64,
    pub atr: f64,
    pub atr_pct: f64,
}

/// Computes metrics from the trailing window ending at the most recent bar on
/// or before `date`. Returns `None` when fewer than `lookback` bars exist.
pub fn compute_metrics(
    series: &PriceSeries,
    date: NaiveDate,
    lookback: usize,
    exit_ema_span: usize,
    atr_period: usize,
) -> Option<TickerMetrics> {
    if lookback < 2 {
        return None;
    }
    let end = series.position_on_or_before(date)?;
    let available = end + 1;
    if available < lookback {
        return None;
    }

    // History window feeds the on-demand EMA; the chunk feeds everything else.
    let hist_start = available.saturating_sub(lookback + exit_ema_span);
    let chunk_start = available - lookback;
    let hist = &series.bars[hist_start..available];
    let chunk = &series.bars[chunk_start..available];

    let price = chunk[chunk.len() - 1].close;
    let score = momentum_score(chunk, lookback);
    let max_gap = max_overnight_gap(chunk);

    let exit_ema = if PRECOMPUTED_EMA_SPANS.contains(&exit_ema_span) {
        match series.precomputed_ema(exit_ema_span) {
            Some(full) => full[end],
            None => on_demand_ema(hist, exit_ema_span),
        }
    } else {
        on_demand_ema(hist, exit_ema_span)
    };

    let atr = average_true_range(chunk, atr_period);
    let atr_pct = if price > 0.0 { atr / price } else { 0.0 };

    Some(TickerMetrics {
        ticker: series.ticker.clone(),
        score,
        price,
        max_gap,
        exit_ema,
        atr,
        atr_pct,
    })
}

fn momentum_score(chunk: &[PriceBar], lookback: usize) -> f64 {
    let mut log_prices = Vec::with_capacity(chunk.len());
    for bar in chunk {
        let price = bar.score_price();
        if price <= 0.0 {
            return SENTINEL_SCORE;
        }
        log_prices.push(price.ln());
    }
    match linear_fit_indexed(&log_prices) {
        Some(fit) => ((1.0 + fit.slope).powi(lookback as i32) - 1.0) * fit.r_squared,
        None => SENTINEL_SCORE,
    }
}

fn max_overnight_gap(chunk: &[PriceBar]) -> f64 {
    if chunk.len() < 2 {
        return 0.0;
    }
    let mut max_gap = 0.0_f64;
    for i in 1..chunk.len() {
        let prev_close = chunk[i - 1].close;
        let gap = (chunk[i].open - prev_close).abs() / prev_close;
        if gap > max_gap {
            max_gap = gap;
        }
    }
    max_gap
}

fn on_demand_ema(hist: &[PriceBar], span: usize) -> f64 {
    let prices: Vec<f64> = hist.iter().map(|bar| bar.score_price()).collect();
    ema(&prices, span).last().copied().unwrap_or(0.0)
}

fn average_true_range(chunk: &[PriceBar], period: usize) -> f64 {
    if chunk.is_empty() {
        return 0.0;
    }
    let mut true_ranges = Vec::with_capacity(chunk.len());
    let mut prev_close = chunk[0].close;
    for (i, bar) in chunk.iter().enumerate() {
        if i > 0 {
            prev_close = chunk[i - 1].close;
        }
        true_ranges.push(bar.true_range(prev_close));
    }
    let period = period.max(1).min(true_ranges.len());
    let tail = &true_ranges[true_ranges.len() - period..];
    tail.iter().sum::<f64>() / period as f64
}
