//! Strategy configuration.
//!
//! All cross-cutting parameters live in one immutable struct passed by
//! reference into the ranking engine and the simulator. Defaults match the
//! production parameter set.

use crate::domain::error::RotatorError;
use chrono::NaiveDate;

/// Removes a ticker from the eligible universe for dates strictly after
/// `cutoff`; a held position is force-sold at the next rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct BlacklistEntry {
    pub cutoff: NaiveDate,
    pub ticker: String,
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub initial_cash: f64,
    pub commission_rate: f64,
    pub target_holdings: usize,
    /// 0 = Monday .. 6 = Sunday.
    pub rebalance_weekday: u32,
    pub rebalance_weeks: u32,
    pub lookback: usize,
    pub exit_ema_span: usize,
    pub skip_max_gap_pct: f64,
    pub gap_exit_pct: f64,
    pub sell_rank_threshold: usize,
    pub stop_loss_pct: f64,
    /// Overheat ceiling on the momentum score; `None` disables the filter.
    pub max_adj_slope: Option<f64>,
    pub benchmark_ticker: String,
    pub hedge_ticker: String,
    pub start_date: Option<NaiveDate>,
    /// `None` = run to the most recent available trading day.
    pub end_date: Option<NaiveDate>,
    pub live_mode: bool,
    pub compounding: bool,
    pub atr_period: usize,
    pub rebalance_threshold: f64,
    pub min_buy_amount_pct: f64,
    pub corr_filter_enabled: bool,
    pub corr_threshold: f64,
    pub corr_lookback: usize,
    pub corr_candidate_count: usize,
    pub blacklist: Vec<BlacklistEntry>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            initial_cash: 1_000_000.0,
            commission_rate: 0.01,
            target_holdings: 4,
            rebalance_weekday: 2,
            rebalance_weeks: 1,
            lookback: 90,
            exit_ema_span: 50,
            skip_max_gap_pct: 0.20,
            gap_exit_pct: 0.5,
            sell_rank_threshold: 20,
            stop_loss_pct: 0.2,
            max_adj_slope: Some(1.5),
            benchmark_ticker: "SPY".to_string(),
            hedge_ticker: "SSO".to_string(),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1),
            end_date: None,
            live_mode: true,
            compounding: true,
            atr_period: 20,
            rebalance_threshold: 0.03,
            min_buy_amount_pct: 0.03,
            corr_filter_enabled: true,
            corr_threshold: 0.6,
            corr_lookback: 60,
            corr_candidate_count: 20,
            blacklist: vec![BlacklistEntry {
                cutoff: NaiveDate::from_ymd_opt(2025, 12, 31)
                    .unwrap_or(NaiveDate::MAX),
                ticker: "WBD".to_string(),
            }],
        }
    }
}

impl StrategyConfig {
    /// Deviation threshold for overweight sells and cash redistribution.
    /// Values below 1% are treated as misconfiguration and clamped to 3%.
    pub fn effective_rebalance_threshold(&self) -> f64 {
        if self.rebalance_threshold < 0.01 {
            0.03
        } else {
            self.rebalance_threshold
        }
    }

    pub fn validate(&self) -> Result<(), RotatorError> {
        validate_initial_cash(self)?;
        validate_commission(self)?;
        validate_target_holdings(self)?;
        validate_rebalance_cadence(self)?;
        validate_windows(self)?;
        validate_fractions(self)?;
        validate_tickers(self)?;
        validate_dates(self)?;
        validate_correlation(self)?;
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> RotatorError {
    RotatorError::ConfigInvalid {
        section: "strategy".to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_initial_cash(config: &StrategyConfig) -> Result<(), RotatorError> {
    if config.initial_cash <= 0.0 {
        return Err(invalid("initial_cash", "initial_cash must be positive"));
    }
    Ok(())
}

fn validate_commission(config: &StrategyConfig) -> Result<(), RotatorError> {
    if config.commission_rate < 0.0 || config.commission_rate >= 1.0 {
        return Err(invalid(
            "commission_rate",
            "commission_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_target_holdings(config: &StrategyConfig) -> Result<(), RotatorError> {
    if config.target_holdings < 1 {
        return Err(invalid(
            "target_holdings",
            "target_holdings must be at least 1",
        ));
    }
    Ok(())
}

fn validate_rebalance_cadence(config: &StrategyConfig) -> Result<(), RotatorError> {
    if config.rebalance_weekday > 6 {
        return Err(invalid(
            "rebalance_weekday",
            "rebalance_weekday must be 0 (Monday) through 6 (Sunday)",
        ));
    }
    if config.rebalance_weeks < 1 {
        return Err(invalid(
            "rebalance_weeks",
            "rebalance_weeks must be at least 1",
        ));
    }
    Ok(())
}

fn validate_windows(config: &StrategyConfig) -> Result<(), RotatorError> {
    if config.lookback < 2 {
        return Err(invalid("lookback", "lookback must be at least 2 bars"));
    }
    if config.exit_ema_span < 1 {
        return Err(invalid("exit_ema_span", "exit_ema_span must be at least 1"));
    }
    if config.atr_period < 1 {
        return Err(invalid("atr_period", "atr_period must be at least 1"));
    }
    Ok(())
}

fn validate_fractions(config: &StrategyConfig) -> Result<(), RotatorError> {
    if config.stop_loss_pct <= 0.0 || config.stop_loss_pct >= 1.0 {
        return Err(invalid(
            "stop_loss_pct",
            "stop_loss_pct must be between 0 and 1",
        ));
    }
    if config.skip_max_gap_pct <= 0.0 {
        return Err(invalid(
            "skip_max_gap_pct",
            "skip_max_gap_pct must be positive",
        ));
    }
    if config.gap_exit_pct <= 0.0 {
        return Err(invalid("gap_exit_pct", "gap_exit_pct must be positive"));
    }
    if config.min_buy_amount_pct < 0.0 || config.min_buy_amount_pct >= 1.0 {
        return Err(invalid(
            "min_buy_amount_pct",
            "min_buy_amount_pct must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_tickers(config: &StrategyConfig) -> Result<(), RotatorError> {
    if config.benchmark_ticker.trim().is_empty() {
        return Err(invalid("benchmark_ticker", "benchmark_ticker is required"));
    }
    if config.hedge_ticker.trim().is_empty() {
        return Err(invalid("hedge_ticker", "hedge_ticker is required"));
    }
    Ok(())
}

fn validate_dates(config: &StrategyConfig) -> Result<(), RotatorError> {
    if let (Some(start), Some(end)) = (config.start_date, config.end_date) {
        if start >= end {
            return Err(invalid("start_date", "start_date must be before end_date"));
        }
    }
    Ok(())
}

fn validate_correlation(config: &StrategyConfig) -> Result<(), RotatorError> {
    if !config.corr_filter_enabled {
        return Ok(());
    }
    if config.corr_threshold <= 0.0 || config.corr_threshold > 1.0 {
        return Err(invalid(
            "corr_threshold",
            "corr_threshold must be between 0 and 1",
        ));
    }
    if config.corr_lookback < 5 {
        return Err(invalid(
            "corr_lookback",
            "corr_lookback must be at least 5 bars",
        ));
    }
    if config.corr_candidate_count < 1 {
        return Err(invalid(
            "corr_candidate_count",
            "corr_candidate_count must be at least 1",
        ));
    }
    Ok(())
}
