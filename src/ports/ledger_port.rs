//! Ledger export port trait.

use crate::domain::error::RotatorError;
use crate::domain::trade::{EquitySnapshot, HoldingsSummary, RebalanceSnapshot, Trade};

/// Persists simulation output. The core hands over complete sequences after
/// the run; adapters own formats and destinations.
pub trait LedgerPort {
    fn write_trades(&self, trades: &[Trade]) -> Result<(), RotatorError>;

    fn write_equity_curve(&self, snapshots: &[EquitySnapshot]) -> Result<(), RotatorError>;

    fn write_rebalances(&self, snapshots: &[RebalanceSnapshot]) -> Result<(), RotatorError>;

    /// Live-tracking only: the final open-position state.
    fn write_holdings(&self, summary: &HoldingsSummary) -> Result<(), RotatorError>;
}
