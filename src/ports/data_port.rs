//! Market data access port trait.

use crate::domain::error::RotatorError;
use crate::domain::series::{BenchmarkSeries, PriceSeries};
use std::rc::Rc;

/// Supplies per-ticker price history. Implementations load lazily and cache,
/// so repeated calls for one ticker are cheap; `Ok(None)` means the ticker
/// has no data at all, while `Err` is a load failure for that ticker only.
pub trait MarketDataPort {
    fn get_series(&self, ticker: &str) -> Result<Option<Rc<PriceSeries>>, RotatorError>;

    /// Close-only series for the regime benchmark and the hedge instrument.
    fn get_benchmark_series(
        &self,
        ticker: &str,
    ) -> Result<Option<Rc<BenchmarkSeries>>, RotatorError>;
}
