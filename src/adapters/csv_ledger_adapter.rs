//! CSV/JSON ledger export adapter.
//!
//! Writes the run artifacts under one output directory: `trades.csv`,
//! `equity_curve.csv`, `rebalances.csv` and, in live mode, the
//! `current_holdings.json` state file the live tracker consumes.

use crate::domain::error::RotatorError;
use crate::domain::trade::{EquitySnapshot, HoldingsSummary, RebalanceSnapshot, Trade};
use crate::ports::ledger_port::LedgerPort;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvLedgerAdapter {
    output_dir: PathBuf,
}

/// Flattened rebalance snapshot: the nested lists become `;`-joined cells
/// so the file stays one row per rebalance.
#[derive(Serialize)]
struct RebalanceRow {
    date: NaiveDate,
    signal_date: NaiveDate,
    holdings: String,
    top_ranked: String,
}

impl CsvLedgerAdapter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn target(&self, file: &str) -> Result<PathBuf, RotatorError> {
        fs::create_dir_all(&self.output_dir).map_err(|err| RotatorError::Export {
            path: self.output_dir.display().to_string(),
            reason: err.to_string(),
        })?;
        Ok(self.output_dir.join(file))
    }

    fn write_csv<T: Serialize>(&self, file: &str, rows: &[T]) -> Result<(), RotatorError> {
        let path = self.target(file)?;
        let mut writer = csv::Writer::from_path(&path).map_err(|err| export_error(&path, err))?;
        for row in rows {
            writer.serialize(row).map_err(|err| export_error(&path, err))?;
        }
        writer.flush().map_err(|err| export_error(&path, err))?;
        Ok(())
    }
}

impl LedgerPort for CsvLedgerAdapter {
    fn write_trades(&self, trades: &[Trade]) -> Result<(), RotatorError> {
        self.write_csv("trades.csv", trades)
    }

    fn write_equity_curve(&self, snapshots: &[EquitySnapshot]) -> Result<(), RotatorError> {
        self.write_csv("equity_curve.csv", snapshots)
    }

    fn write_rebalances(&self, snapshots: &[RebalanceSnapshot]) -> Result<(), RotatorError> {
        let rows: Vec<RebalanceRow> = snapshots
            .iter()
            .map(|snapshot| RebalanceRow {
                date: snapshot.date,
                signal_date: snapshot.signal_date,
                holdings: snapshot
                    .weights
                    .iter()
                    .map(|(ticker, weight)| format!("{ticker}:{weight:.2}"))
                    .collect::<Vec<_>>()
                    .join(";"),
                top_ranked: snapshot.top_ranked.join(";"),
            })
            .collect();
        self.write_csv("rebalances.csv", &rows)
    }

    fn write_holdings(&self, summary: &HoldingsSummary) -> Result<(), RotatorError> {
        let path = self.target("current_holdings.json")?;
        let json =
            serde_json::to_string_pretty(summary).map_err(|err| export_error(&path, err))?;
        fs::write(&path, json).map_err(|err| export_error(&path, err))?;
        Ok(())
    }
}

fn export_error(path: &Path, err: impl std::fmt::Display) -> RotatorError {
    RotatorError::Export {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
