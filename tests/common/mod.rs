#![allow(dead_code)]

use chrono::{Datelike, NaiveDate};
use rotator::domain::calendar::TradingCalendar;
use rotator::domain::config::StrategyConfig;
use rotator::domain::error::RotatorError;
use rotator::domain::ranking::RankingEngine;
use rotator::domain::regime::RegimeClassifier;
use rotator::domain::series::{BenchmarkSeries, PriceBar, PriceSeries};
use rotator::domain::simulator::{SimulationOutput, Simulator};
use rotator::ports::data_port::MarketDataPort;
use rotator::ports::universe_port::ConstituentPort;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::rc::Rc;

pub struct InMemoryData {
    pub series: HashMap<String, Rc<PriceSeries>>,
    pub benchmarks: HashMap<String, Rc<BenchmarkSeries>>,
    pub errors: HashMap<String, String>,
}

impl InMemoryData {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
            benchmarks: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.series.insert(series.ticker.clone(), Rc::new(series));
        self
    }

    pub fn with_benchmark(mut self, series: BenchmarkSeries) -> Self {
        self.benchmarks
            .insert(series.ticker.clone(), Rc::new(series));
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl MarketDataPort for InMemoryData {
    fn get_series(&self, ticker: &str) -> Result<Option<Rc<PriceSeries>>, RotatorError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(RotatorError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.series.get(ticker).cloned())
    }

    fn get_benchmark_series(
        &self,
        ticker: &str,
    ) -> Result<Option<Rc<BenchmarkSeries>>, RotatorError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(RotatorError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.benchmarks.get(ticker).cloned())
    }
}

pub struct FixedConstituents(pub BTreeSet<String>);

impl FixedConstituents {
    pub fn of(tickers: &[&str]) -> Self {
        FixedConstituents(tickers.iter().map(|t| t.to_string()).collect())
    }
}

impl ConstituentPort for FixedConstituents {
    fn constituents_as_of(&self, _date: NaiveDate) -> BTreeSet<String> {
        self.0.clone()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Consecutive weekdays starting Monday 2023-01-02.
pub fn weekdays(count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut day = date(2023, 1, 2);
    while days.len() < count {
        if day.weekday().num_days_from_monday() < 5 {
            days.push(day);
        }
        day = day.succ_opt().unwrap();
    }
    days
}

pub fn growth_closes(count: usize, start: f64, rate: f64) -> Vec<f64> {
    (0..count)
        .map(|i| start * (rate * i as f64).exp())
        .collect()
}

/// Bars whose open equals the prior close, so fixtures carry no overnight
/// gaps unless a test injects one.
pub fn bars_from_closes(days: &[NaiveDate], closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                date: days[i],
                open,
                high: open.max(close) * 1.005,
                low: open.min(close) * 0.995,
                close,
                adj_close: None,
                volume: 1_000_000.0,
            }
        })
        .collect()
}

pub fn series_from_closes(ticker: &str, days: &[NaiveDate], closes: &[f64]) -> PriceSeries {
    PriceSeries::new(ticker.into(), bars_from_closes(days, closes))
}

pub fn bench_from_closes(ticker: &str, days: &[NaiveDate], closes: &[f64]) -> BenchmarkSeries {
    let points = days.iter().copied().zip(closes.iter().copied()).collect();
    BenchmarkSeries::new(ticker.into(), points)
}

/// First simulated index into `weekdays`. Index 210 is a Monday with a full
/// 200-bar regime warmup behind it.
pub const SIM_START: usize = 210;

pub fn sim_config(days: &[NaiveDate], target_holdings: usize) -> StrategyConfig {
    StrategyConfig {
        target_holdings,
        corr_filter_enabled: false,
        start_date: Some(days[SIM_START]),
        end_date: days.last().copied(),
        blacklist: Vec::new(),
        ..StrategyConfig::default()
    }
}

pub fn run_sim(
    config: &StrategyConfig,
    data: &dyn MarketDataPort,
    universe: &dyn ConstituentPort,
    spy: &BenchmarkSeries,
    days: &[NaiveDate],
) -> SimulationOutput {
    let engine = RankingEngine::new(data, universe, config);
    let regime = RegimeClassifier::new(spy);
    let calendar = TradingCalendar::new(days.to_vec());
    let simulator = Simulator::new(config, data, &engine, &regime, &calendar);
    simulator.run().unwrap()
}

/// Writes `<ticker>.csv` with full OHLCV columns into `dir`.
pub fn write_price_csv(dir: &Path, ticker: &str, days: &[NaiveDate], closes: &[f64]) {
    let mut out = String::from("Date,Open,High,Low,Close,Volume\n");
    for bar in bars_from_closes(days, closes) {
        out.push_str(&format!(
            "{},{:.4},{:.4},{:.4},{:.4},{}\n",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume as u64
        ));
    }
    std::fs::write(dir.join(format!("{ticker}.csv")), out).unwrap();
}

/// Writes a headerless membership file: one snapshot row per line,
/// `date,TICKER,TICKER,...`.
pub fn write_constituents_csv(path: &Path, snapshots: &[(NaiveDate, &[&str])]) {
    let mut out = String::new();
    for (day, tickers) in snapshots {
        out.push_str(&format!("{day},{}\n", tickers.join(",")));
    }
    std::fs::write(path, out).unwrap();
}

/// A complete INI for the on-disk pipeline: 2 target holdings, short
/// windows, correlation filter off, empty blacklist.
pub fn backtest_ini(
    price_dir: &Path,
    constituent_file: &Path,
    start: NaiveDate,
    end: NaiveDate,
    live_mode: bool,
) -> String {
    format!(
        "[data]\n\
         price_dir = {price_dir}\n\
         constituent_file = {constituent_file}\n\
         benchmark_ticker = SPY\n\
         hedge_ticker = SSO\n\
         \n\
         [backtest]\n\
         initial_cash = 100000\n\
         commission = 0.0\n\
         start_date = {start}\n\
         end_date = {end}\n\
         live_mode = {live_mode}\n\
         compounding = true\n\
         \n\
         [strategy]\n\
         target_holdings = 2\n\
         rebalance_weekday = 2\n\
         rebalance_weeks = 1\n\
         lookback = 60\n\
         exit_ema = 30\n\
         atr_period = 14\n\
         \n\
         [correlation]\n\
         enabled = false\n\
         \n\
         [blacklist]\n\
         entries =\n",
        price_dir = price_dir.display(),
        constituent_file = constituent_file.display(),
    )
}
