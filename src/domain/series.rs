//! Price series containers.
//!
//! `PriceSeries` holds one ticker's daily bars with an exact-date index and
//! EMAs precomputed for the common spans. `BenchmarkSeries` is the close-only
//! variant used for the regime benchmark and the hedge instrument.

use chrono::NaiveDate;
use std::collections::HashMap;

/// Spans whose EMA is computed once over the full series at load time.
/// Other spans are computed on demand over the metrics window.
pub const PRECOMPUTED_EMA_SPANS: [usize; 5] = [20, 30, 40, 50, 60];

#[derive(Debug, Clone)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Split/dividend adjusted close when the source provides one.
    pub adj_close: Option<f64>,
    pub volume: f64,
}

impl PriceBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Price used for scoring: adjusted close when available, else close.
    pub fn score_price(&self) -> f64 {
        self.adj_close.unwrap_or(self.close)
    }
}

/// Incremental EMA with alpha = 2 / (span + 1), seeded with the first value.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let span = span.max(1);
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
    date_index: HashMap<NaiveDate, usize>,
    precomputed_emas: HashMap<usize, Vec<f64>>,
}

impl PriceSeries {
    /// Sorts bars by date, drops duplicate dates (first occurrence wins) and
    /// precomputes the common-span EMAs over the scoring price.
    pub fn new(ticker: String, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|bar| bar.date);
        bars.dedup_by_key(|bar| bar.date);
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        let score_prices: Vec<f64> = bars.iter().map(|bar| bar.score_price()).collect();
        let precomputed_emas = PRECOMPUTED_EMA_SPANS
            .iter()
            .map(|&span| (span, ema(&score_prices, span)))
            .collect();
        PriceSeries {
            ticker,
            bars,
            date_index,
            precomputed_emas,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bar_on(&self, date: NaiveDate) -> Option<&PriceBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    /// Index of the most recent bar on or before `date`.
    pub fn position_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        match self.bars.binary_search_by_key(&date, |bar| bar.date) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(idx) => Some(idx - 1),
        }
    }

    /// Full-series EMA for one of the precomputed spans.
    pub fn precomputed_ema(&self, span: usize) -> Option<&[f64]> {
        self.precomputed_emas.get(&span).map(|v| v.as_slice())
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkSeries {
    pub ticker: String,
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
    date_index: HashMap<NaiveDate, usize>,
}

impl BenchmarkSeries {
    /// Sorts by date and drops duplicate dates (first occurrence wins).
    pub fn new(ticker: String, mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.sort_by_key(|(date, _)| *date);
        points.dedup_by_key(|(date, _)| *date);
        let date_index = points
            .iter()
            .enumerate()
            .map(|(i, (date, _))| (*date, i))
            .collect();
        let (dates, closes) = points.into_iter().unzip();
        BenchmarkSeries {
            ticker,
            dates,
            closes,
            date_index,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.date_index.get(&date).map(|&i| self.closes[i])
    }

    pub fn position_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        match self.dates.binary_search(&date) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(idx) => Some(idx - 1),
        }
    }

    pub fn close_on_or_before(&self, date: NaiveDate) -> Option<f64> {
        self.position_on_or_before(date).map(|i| self.closes[i])
    }

    /// Last `count` closes on or before `date`, fewer if the series is short.
    pub fn tail_up_to(&self, date: NaiveDate, count: usize) -> Option<(&[NaiveDate], &[f64])> {
        let end = self.position_on_or_before(date)? + 1;
        let start = end.saturating_sub(count);
        Some((&self.dates[start..end], &self.closes[start..end]))
    }
}
