//! INI file configuration adapter.
//!
//! Wraps `configparser` behind [`ConfigPort`] and assembles a validated
//! [`StrategyConfig`] from the `[data]`, `[backtest]`, `[strategy]`,
//! `[correlation]` and `[blacklist]` sections. Missing keys fall back to
//! the production defaults; malformed dates, counts and blacklist entries
//! fail fast instead of being silently defaulted.

use crate::domain::config::{BlacklistEntry, StrategyConfig};
use crate::domain::error::RotatorError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RotatorError> {
        let mut config = Ini::new();
        config
            .load(&path)
            .map_err(|reason| RotatorError::ConfigParse {
                file: path.as_ref().display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, RotatorError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| RotatorError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

/// Builds a [`StrategyConfig`] from any config port, starting from the
/// production defaults, and validates it.
pub fn build_strategy_config(port: &dyn ConfigPort) -> Result<StrategyConfig, RotatorError> {
    let defaults = StrategyConfig::default();

    let config = StrategyConfig {
        initial_cash: port.get_double("backtest", "initial_cash", defaults.initial_cash),
        commission_rate: port.get_double("backtest", "commission", defaults.commission_rate),
        target_holdings: count_field(
            port,
            "strategy",
            "target_holdings",
            defaults.target_holdings,
        )?,
        rebalance_weekday: weekday_field(port, defaults.rebalance_weekday)?,
        rebalance_weeks: weeks_field(port, defaults.rebalance_weeks)?,
        lookback: count_field(port, "strategy", "lookback", defaults.lookback)?,
        exit_ema_span: count_field(port, "strategy", "exit_ema", defaults.exit_ema_span)?,
        skip_max_gap_pct: port.get_double("strategy", "skip_max_gap_pct", defaults.skip_max_gap_pct),
        gap_exit_pct: port.get_double("strategy", "gap_exit_pct", defaults.gap_exit_pct),
        sell_rank_threshold: count_field(
            port,
            "strategy",
            "sell_rank_threshold",
            defaults.sell_rank_threshold,
        )?,
        stop_loss_pct: port.get_double("strategy", "stop_loss_pct", defaults.stop_loss_pct),
        max_adj_slope: slope_cap_field(port, defaults.max_adj_slope)?,
        benchmark_ticker: port
            .get_string("data", "benchmark_ticker")
            .map(|t| t.trim().to_uppercase())
            .unwrap_or(defaults.benchmark_ticker),
        hedge_ticker: port
            .get_string("data", "hedge_ticker")
            .map(|t| t.trim().to_uppercase())
            .unwrap_or(defaults.hedge_ticker),
        start_date: date_field(port, "backtest", "start_date", defaults.start_date)?,
        end_date: date_field(port, "backtest", "end_date", defaults.end_date)?,
        live_mode: port.get_bool("backtest", "live_mode", defaults.live_mode),
        compounding: port.get_bool("backtest", "compounding", defaults.compounding),
        atr_period: count_field(port, "strategy", "atr_period", defaults.atr_period)?,
        rebalance_threshold: port.get_double(
            "strategy",
            "rebalance_threshold",
            defaults.rebalance_threshold,
        ),
        min_buy_amount_pct: port.get_double(
            "strategy",
            "min_buy_amount_pct",
            defaults.min_buy_amount_pct,
        ),
        corr_filter_enabled: port.get_bool("correlation", "enabled", defaults.corr_filter_enabled),
        corr_threshold: port.get_double("correlation", "threshold", defaults.corr_threshold),
        corr_lookback: count_field(port, "correlation", "lookback", defaults.corr_lookback)?,
        corr_candidate_count: count_field(
            port,
            "correlation",
            "candidate_count",
            defaults.corr_candidate_count,
        )?,
        blacklist: blacklist_field(port, defaults.blacklist)?,
    };

    config.validate()?;
    Ok(config)
}

fn invalid(section: &str, key: &str, reason: String) -> RotatorError {
    RotatorError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

fn count_field(
    port: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, RotatorError> {
    let value = port.get_int(section, key, default as i64);
    usize::try_from(value).map_err(|_| invalid(section, key, format!("{value} is negative")))
}

fn weekday_field(port: &dyn ConfigPort, default: u32) -> Result<u32, RotatorError> {
    let value = port.get_int("strategy", "rebalance_weekday", i64::from(default));
    u32::try_from(value).map_err(|_| {
        invalid(
            "strategy",
            "rebalance_weekday",
            format!("{value} is negative"),
        )
    })
}

fn weeks_field(port: &dyn ConfigPort, default: u32) -> Result<u32, RotatorError> {
    let value = port.get_int("strategy", "rebalance_weeks", i64::from(default));
    u32::try_from(value).map_err(|_| {
        invalid(
            "strategy",
            "rebalance_weeks",
            format!("{value} is negative"),
        )
    })
}

/// Optional date key. Absent keeps the default; an empty value or `none`
/// means open-ended.
fn date_field(
    port: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Option<NaiveDate>,
) -> Result<Option<NaiveDate>, RotatorError> {
    let Some(raw) = port.get_string(section, key) else {
        return Ok(default);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| {
            invalid(
                section,
                key,
                format!("{trimmed:?} is not a YYYY-MM-DD date"),
            )
        })
}

/// `max_adj_slope = none` disables the overheat ceiling.
fn slope_cap_field(
    port: &dyn ConfigPort,
    default: Option<f64>,
) -> Result<Option<f64>, RotatorError> {
    let Some(raw) = port.get_string("strategy", "max_adj_slope") else {
        return Ok(default);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed.parse::<f64>().map(Some).map_err(|_| {
        invalid(
            "strategy",
            "max_adj_slope",
            format!("{trimmed:?} is not a number"),
        )
    })
}

/// `entries = 2025-12-31:WBD, 2026-06-30:XYZ`. An empty value clears the
/// default list.
fn blacklist_field(
    port: &dyn ConfigPort,
    default: Vec<BlacklistEntry>,
) -> Result<Vec<BlacklistEntry>, RotatorError> {
    let Some(raw) = port.get_string("blacklist", "entries") else {
        return Ok(default);
    };
    let mut entries = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((date_part, ticker_part)) = part.split_once(':') else {
            return Err(invalid(
                "blacklist",
                "entries",
                format!("{part:?} is not DATE:TICKER"),
            ));
        };
        let cutoff = NaiveDate::parse_from_str(date_part.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "blacklist",
                "entries",
                format!("{:?} is not a YYYY-MM-DD date", date_part.trim()),
            )
        })?;
        let ticker = ticker_part.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(invalid(
                "blacklist",
                "entries",
                format!("{part:?} has an empty ticker"),
            ));
        }
        entries.push(BlacklistEntry { cutoff, ticker });
    }
    Ok(entries)
}
