//! Constituent membership with point-in-time lookup.
//!
//! Membership snapshots are forward-filled: the set in force on a date is
//! the most recent snapshot on or before it. Scans over a historical date
//! therefore only see tickers that were index members at that time.

use crate::domain::config::BlacklistEntry;
use chrono::NaiveDate;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct MembershipTable {
    snapshots: Vec<(NaiveDate, Vec<String>)>,
}

impl MembershipTable {
    pub fn new(mut snapshots: Vec<(NaiveDate, Vec<String>)>) -> Self {
        snapshots.sort_by_key(|(date, _)| *date);
        snapshots.dedup_by_key(|(date, _)| *date);
        MembershipTable { snapshots }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Raw snapshot in force on `date`, before blacklist filtering. `None`
    /// when `date` precedes the first snapshot.
    pub fn constituents_as_of(&self, date: NaiveDate) -> Option<&[String]> {
        let idx = match self.snapshots.binary_search_by_key(&date, |(d, _)| *d) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        Some(&self.snapshots[idx].1)
    }

    /// Union of every member seen between `start` and `end` inclusive,
    /// counting the snapshot already in force at `start`. Used to decide
    /// which price series a run can touch.
    pub fn tickers_between(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        if let Some(active) = self.constituents_as_of(start) {
            out.extend(active.iter().cloned());
        }
        for (date, tickers) in &self.snapshots {
            if *date > start && *date <= end {
                out.extend(tickers.iter().cloned());
            }
        }
        out
    }

    /// Eligible tickers on `date`: the forward-filled snapshot minus
    /// blacklisted names. Empty before the first snapshot.
    pub fn eligible_on(&self, date: NaiveDate, blacklist: &[BlacklistEntry]) -> BTreeSet<String> {
        let Some(tickers) = self.constituents_as_of(date) else {
            return BTreeSet::new();
        };
        tickers
            .iter()
            .filter(|ticker| !is_blacklisted(ticker, date, blacklist))
            .cloned()
            .collect()
    }
}

/// A ticker is blacklisted strictly after its cutoff date; on the cutoff
/// itself it is still eligible.
pub fn is_blacklisted(ticker: &str, date: NaiveDate, blacklist: &[BlacklistEntry]) -> bool {
    blacklist
        .iter()
        .any(|entry| entry.ticker == ticker && date > entry.cutoff)
}
