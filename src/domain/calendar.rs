//! Trading calendar derived from the benchmark series.
//!
//! The benchmark's bar dates define the canonical set of trading days. All
//! "most recent trading day on or before X" lookups resolve against this
//! ordered index instead of walking raw weekdays.

use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct TradingCalendar {
    days: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Builds a calendar from bar dates. The input must be strictly
    /// increasing, which holds for any validated price series.
    pub fn new(days: Vec<NaiveDate>) -> Self {
        TradingCalendar { days }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.days.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.days.last().copied()
    }

    /// Index of the most recent trading day on or before `date`.
    pub fn position_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        match self.days.binary_search(&date) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(idx) => Some(idx - 1),
        }
    }

    /// Most recent trading day on or before `date`.
    pub fn day_on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.position_on_or_before(date).map(|idx| self.days[idx])
    }

    /// Trading day immediately before `date`. `date` does not need to be a
    /// trading day itself.
    pub fn prev_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.position_on_or_before(date)?;
        if self.days[idx] == date {
            if idx == 0 {
                None
            } else {
                Some(self.days[idx - 1])
            }
        } else {
            Some(self.days[idx])
        }
    }

    /// Simulation day range for a backtest. A missing start defaults to the
    /// first day with a full 200-bar regime history; a missing end defaults
    /// to the last available day.
    pub fn simulation_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Option<(usize, usize)> {
        if self.days.is_empty() {
            return None;
        }
        let start_idx = match start {
            Some(date) => match self.days.binary_search(&date) {
                Ok(idx) => idx,
                Err(idx) => idx,
            },
            None => 200.min(self.days.len() - 1),
        };
        let end_idx = match end {
            Some(date) => self.position_on_or_before(date)?,
            None => self.days.len() - 1,
        };
        if start_idx >= self.days.len() || start_idx > end_idx {
            return None;
        }
        Some((start_idx, end_idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_calendar() -> TradingCalendar {
        // Mon 2024-01-08 through Fri 2024-01-12, then Mon 2024-01-15.
        let days = vec![
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        ];
        TradingCalendar::new(days)
    }

    #[test]
    fn exact_date_resolves_to_itself() {
        let cal = make_calendar();
        let wed = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(cal.day_on_or_before(wed), Some(wed));
    }

    #[test]
    fn weekend_resolves_to_prior_friday() {
        let cal = make_calendar();
        let sat = NaiveDate::from_ymd_opt(2024, 1, 13).unwrap();
        let fri = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
        assert_eq!(cal.day_on_or_before(sat), Some(fri));
    }

    #[test]
    fn date_before_calendar_has_no_resolution() {
        let cal = make_calendar();
        let early = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(cal.day_on_or_before(early), None);
        assert_eq!(cal.prev_trading_day(early), None);
    }

    #[test]
    fn prev_trading_day_skips_weekend() {
        let cal = make_calendar();
        let mon = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let fri = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
        assert_eq!(cal.prev_trading_day(mon), Some(fri));
    }

    #[test]
    fn prev_trading_day_from_non_trading_date() {
        let cal = make_calendar();
        let sun = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        let fri = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
        assert_eq!(cal.prev_trading_day(sun), Some(fri));
    }

    #[test]
    fn simulation_range_defaults() {
        let cal = make_calendar();
        // Fewer than 200 days, so the default start clamps to the last index.
        let (start, end) = cal.simulation_range(None, None).unwrap();
        assert_eq!(start, 5);
        assert_eq!(end, 5);
    }

    #[test]
    fn simulation_range_with_bounds() {
        let cal = make_calendar();
        let (start, end) = cal
            .simulation_range(
                NaiveDate::from_ymd_opt(2024, 1, 9),
                NaiveDate::from_ymd_opt(2024, 1, 13),
            )
            .unwrap();
        assert_eq!(cal.days()[start], NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
        assert_eq!(cal.days()[end], NaiveDate::from_ymd_opt(2024, 1, 12).unwrap());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let cal = make_calendar();
        assert!(
            cal.simulation_range(
                NaiveDate::from_ymd_opt(2024, 1, 12),
                NaiveDate::from_ymd_opt(2024, 1, 9),
            )
            .is_none()
        );
    }
}
