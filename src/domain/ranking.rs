//! Ranking engine: cached metric computation, market scans and the
//! residual-correlation diversification filter.
//!
//! One engine instance serves one simulation run. Both caches live inside
//! the engine, so parameter sweeps running several simulations never share
//! state through a global table.

use crate::domain::cache::Cache;
use crate::domain::config::StrategyConfig;
use crate::domain::metrics::{TickerMetrics, compute_metrics};
use crate::domain::stats::{linear_fit, pearson};
use crate::ports::data_port::MarketDataPort;
use crate::ports::universe_port::ConstituentPort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Fewest overlapping residual observations for a pairwise correlation
/// check; sparser pairs are left untested rather than rejected.
const MIN_PAIR_OVERLAP: usize = 20;

type MetricsKey = (String, NaiveDate, usize, usize, usize);
type ScanKey = (NaiveDate, usize);
type ReturnSeries = BTreeMap<NaiveDate, f64>;

pub struct RankingEngine<'a> {
    data: &'a dyn MarketDataPort,
    constituents: &'a dyn ConstituentPort,
    config: &'a StrategyConfig,
    metrics_cache: Cache<MetricsKey, Option<TickerMetrics>>,
    scan_cache: Cache<ScanKey, Rc<Vec<TickerMetrics>>>,
}

impl<'a> RankingEngine<'a> {
    pub fn new(
        data: &'a dyn MarketDataPort,
        constituents: &'a dyn ConstituentPort,
        config: &'a StrategyConfig,
    ) -> Self {
        RankingEngine {
            data,
            constituents,
            config,
            metrics_cache: Cache::new(),
            scan_cache: Cache::new(),
        }
    }

    /// Metrics for one ticker as of `date`. `None` when the ticker has no
    /// data, failed to load or has fewer than `lookback` bars; a bad ticker
    /// never aborts the surrounding scan.
    pub fn calculate_metrics(
        &self,
        ticker: &str,
        date: NaiveDate,
        lookback: usize,
    ) -> Option<TickerMetrics> {
        let key = (
            ticker.to_string(),
            date,
            lookback,
            self.config.exit_ema_span,
            self.config.atr_period,
        );
        self.metrics_cache.get_or_compute(key, || {
            let series = match self.data.get_series(ticker) {
                Ok(Some(series)) => series,
                Ok(None) | Err(_) => return None,
            };
            compute_metrics(
                &series,
                date,
                lookback,
                self.config.exit_ema_span,
                self.config.atr_period,
            )
        })
    }

    /// Ranks every eligible constituent on `date` by momentum score,
    /// descending. Tickers whose worst overnight gap exceeds the skip
    /// ceiling are left out entirely.
    pub fn scan_market(&self, date: NaiveDate, lookback: usize) -> Rc<Vec<TickerMetrics>> {
        self.scan_cache.get_or_compute((date, lookback), || {
            let mut rows: Vec<TickerMetrics> = Vec::new();
            for ticker in self.constituents.constituents_as_of(date) {
                if let Some(metrics) = self.calculate_metrics(&ticker, date, lookback) {
                    if metrics.max_gap <= self.config.skip_max_gap_pct {
                        rows.push(metrics);
                    }
                }
            }
            rows.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Rc::new(rows)
        })
    }

    /// Greedy "box seat" selection: walk candidates in rank order and accept
    /// one only if its benchmark-residual returns are not highly correlated
    /// with any already-accepted ticker. Existing holdings seed the accepted
    /// set so new buys diversify against what is already held. Returns the
    /// newly accepted tickers, at most `needed`, in rank order; empty when
    /// the benchmark series cannot support residual computation.
    pub fn filter_by_residual_correlation(
        &self,
        candidates: &[TickerMetrics],
        date: NaiveDate,
        needed: usize,
        existing: &[String],
    ) -> Vec<String> {
        if needed == 0 {
            return Vec::new();
        }
        let capped = &candidates[..candidates.len().min(self.config.corr_candidate_count)];
        let Some(bench_returns) = self.benchmark_returns(date) else {
            return Vec::new();
        };

        let mut residuals: HashMap<String, ReturnSeries> = HashMap::new();
        let tickers = capped
            .iter()
            .map(|m| m.ticker.as_str())
            .chain(existing.iter().map(String::as_str));
        for ticker in tickers {
            if residuals.contains_key(ticker) {
                continue;
            }
            if let Some(res) = self.residuals_for(ticker, date, &bench_returns) {
                residuals.insert(ticker.to_string(), res);
            }
        }

        let mut accepted: Vec<String> = existing
            .iter()
            .filter(|ticker| residuals.contains_key(*ticker))
            .cloned()
            .collect();
        let mut result = Vec::new();

        for metrics in capped {
            if result.len() >= needed {
                break;
            }
            let Some(res_a) = residuals.get(&metrics.ticker) else {
                continue;
            };

            let mut passed = true;
            for sel in &accepted {
                let Some(res_b) = residuals.get(sel) else {
                    continue;
                };
                let mut xs = Vec::new();
                let mut ys = Vec::new();
                for (day, &ra) in res_a {
                    if let Some(&rb) = res_b.get(day) {
                        xs.push(ra);
                        ys.push(rb);
                    }
                }
                if xs.len() < MIN_PAIR_OVERLAP {
                    continue;
                }
                if let Some(corr) = pearson(&xs, &ys) {
                    if corr.abs() >= self.config.corr_threshold {
                        passed = false;
                        break;
                    }
                }
            }

            if passed {
                accepted.push(metrics.ticker.clone());
                result.push(metrics.ticker.clone());
            }
        }
        result
    }

    /// Benchmark daily returns over the correlation window ending at `date`.
    /// `None` when fewer than 80% of the expected observations exist.
    fn benchmark_returns(&self, date: NaiveDate) -> Option<ReturnSeries> {
        let series = self
            .data
            .get_benchmark_series(&self.config.benchmark_ticker)
            .ok()
            .flatten()?;
        let (dates, closes) = series.tail_up_to(date, self.config.corr_lookback + 1)?;

        let mut returns = BTreeMap::new();
        for i in 1..closes.len() {
            if closes[i - 1] != 0.0 {
                returns.insert(dates[i], closes[i] / closes[i - 1] - 1.0);
            }
        }
        if returns.len() < self.min_residual_observations() {
            return None;
        }
        Some(returns)
    }

    /// Alpha-beta residuals of a ticker's returns against the benchmark on
    /// their common dates.
    fn residuals_for(
        &self,
        ticker: &str,
        date: NaiveDate,
        bench_returns: &ReturnSeries,
    ) -> Option<ReturnSeries> {
        let series = self.data.get_series(ticker).ok().flatten()?;
        let end = series.position_on_or_before(date)?;
        let start = (end + 1).saturating_sub(self.config.corr_lookback + 1);
        let bars = &series.bars[start..=end];

        let mut dates = Vec::new();
        let mut stock = Vec::new();
        let mut market = Vec::new();
        for i in 1..bars.len() {
            let prev = bars[i - 1].score_price();
            if prev == 0.0 {
                continue;
            }
            if let Some(&bench) = bench_returns.get(&bars[i].date) {
                dates.push(bars[i].date);
                stock.push(bars[i].score_price() / prev - 1.0);
                market.push(bench);
            }
        }
        if dates.len() < self.min_residual_observations() {
            return None;
        }

        let fit = linear_fit(&market, &stock)?;
        let residuals = dates
            .into_iter()
            .zip(stock.iter().zip(market.iter()))
            .map(|(day, (&s, &m))| (day, s - (fit.intercept + fit.slope * m)))
            .collect();
        Some(residuals)
    }

    fn min_residual_observations(&self) -> usize {
        (self.config.corr_lookback as f64 * 0.8) as usize
    }
}
