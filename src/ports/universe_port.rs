//! Constituent membership port trait.

use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Point-in-time index membership. The returned set already reflects
/// blacklist exclusions; iteration order is sorted so scans over the
/// universe stay deterministic.
pub trait ConstituentPort {
    fn constituents_as_of(&self, date: NaiveDate) -> BTreeSet<String>;
}
