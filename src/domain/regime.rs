//! Bull/bear regime classification from the benchmark series.
//!
//! The classifier precomputes the 200-day moving average, the running
//! all-time high and the drawdown from it for every benchmark bar. State
//! lookups forward-fill to the most recent bar on or before the date. The
//! consecutive-week bull counter lives in the simulator, not here.

use crate::domain::series::BenchmarkSeries;
use chrono::{Days, NaiveDate};

pub const MA_WINDOW: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeState {
    /// The benchmark bar date the state was read from.
    pub date: NaiveDate,
    pub close: f64,
    /// `None` until a full moving-average window has accumulated.
    pub ma200: Option<f64>,
    pub all_time_high: f64,
    /// (close - ath) / ath, zero or negative.
    pub drawdown: f64,
}

#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    dates: Vec<NaiveDate>,
    closes: Vec<f64>,
    ma200: Vec<Option<f64>>,
    all_time_highs: Vec<f64>,
    drawdowns: Vec<f64>,
}

impl RegimeClassifier {
    pub fn new(series: &BenchmarkSeries) -> Self {
        let n = series.len();
        let mut ma200 = Vec::with_capacity(n);
        let mut all_time_highs = Vec::with_capacity(n);
        let mut drawdowns = Vec::with_capacity(n);

        let mut window_sum = 0.0;
        let mut ath = f64::MIN;
        for (i, &close) in series.closes.iter().enumerate() {
            window_sum += close;
            if i >= MA_WINDOW {
                window_sum -= series.closes[i - MA_WINDOW];
            }
            if i + 1 >= MA_WINDOW {
                ma200.push(Some(window_sum / MA_WINDOW as f64));
            } else {
                ma200.push(None);
            }

            if close > ath {
                ath = close;
            }
            all_time_highs.push(ath);
            if ath > 0.0 {
                drawdowns.push((close - ath) / ath);
            } else {
                drawdowns.push(0.0);
            }
        }

        RegimeClassifier {
            dates: series.dates.clone(),
            closes: series.closes.clone(),
            ma200,
            all_time_highs,
            drawdowns,
        }
    }

    /// State on the most recent benchmark bar on or before `date`. `None`
    /// when `date` precedes all data.
    pub fn state_on(&self, date: NaiveDate) -> Option<RegimeState> {
        let idx = match self.dates.binary_search(&date) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        Some(RegimeState {
            date: self.dates[idx],
            close: self.closes[idx],
            ma200: self.ma200[idx],
            all_time_high: self.all_time_highs[idx],
            drawdown: self.drawdowns[idx],
        })
    }

    /// Close strictly above the moving average on `date`. False when the
    /// lookup fails or the average has not accumulated yet.
    pub fn close_above_ma(&self, date: NaiveDate) -> bool {
        match self.state_on(date) {
            Some(state) => match state.ma200 {
                Some(ma) => state.close > ma,
                None => false,
            },
            None => false,
        }
    }

    /// Bull regime requires close > MA200 both on `date` and one week
    /// earlier; conservatively false if either lookup fails.
    pub fn is_bull(&self, date: NaiveDate) -> bool {
        let Some(week_ago) = date.checked_sub_days(Days::new(7)) else {
            return false;
        };
        self.close_above_ma(date) && self.close_above_ma(week_ago)
    }
}
