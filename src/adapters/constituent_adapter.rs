//! CSV constituent membership adapter.
//!
//! Loads the wide membership table: one row per snapshot date, first field
//! the date, remaining fields the tickers in the index on that date. Rows
//! carry over until the next snapshot. Ticker cells may keep a `.txt`
//! suffix from the data exporter; it is stripped here.

use crate::domain::config::BlacklistEntry;
use crate::domain::error::RotatorError;
use crate::domain::universe::MembershipTable;
use crate::ports::universe_port::ConstituentPort;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub struct CsvConstituentAdapter {
    table: MembershipTable,
    blacklist: Vec<BlacklistEntry>,
}

impl CsvConstituentAdapter {
    pub fn from_file(path: &Path, blacklist: Vec<BlacklistEntry>) -> Result<Self, RotatorError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_csv(path, &content, blacklist))
    }

    /// Parses the wide table. An unparsable date in the first row is taken
    /// as a header and skipped silently; later ones get a warning.
    pub fn from_csv(path: &Path, content: &str, blacklist: Vec<BlacklistEntry>) -> Self {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut snapshots = Vec::new();
        for (row_index, row) in reader.records().enumerate() {
            let record = match row {
                Ok(record) => record,
                Err(err) => {
                    eprintln!("Warning: {}: skipping unreadable row ({err})", path.display());
                    continue;
                }
            };
            let Some(date_cell) = record.get(0) else {
                continue;
            };
            let Ok(date) = parse_snapshot_date(date_cell) else {
                if row_index > 0 {
                    eprintln!(
                        "Warning: {}: skipping row with invalid date {date_cell:?}",
                        path.display()
                    );
                }
                continue;
            };
            let tickers: Vec<String> = record
                .iter()
                .skip(1)
                .map(clean_ticker)
                .filter(|ticker| !ticker.is_empty())
                .collect();
            if !tickers.is_empty() {
                snapshots.push((date, tickers));
            }
        }

        Self {
            table: MembershipTable::new(snapshots),
            blacklist,
        }
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }
}

impl ConstituentPort for CsvConstituentAdapter {
    fn constituents_as_of(&self, date: NaiveDate) -> BTreeSet<String> {
        self.table.eligible_on(date, &self.blacklist)
    }
}

fn parse_snapshot_date(value: &str) -> Result<NaiveDate, ()> {
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(date);
        }
    }
    Err(())
}

fn clean_ticker(cell: &str) -> String {
    let trimmed = cell.trim();
    trimmed.strip_suffix(".txt").unwrap_or(trimmed).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample_adapter(blacklist: Vec<BlacklistEntry>) -> CsvConstituentAdapter {
        let content = "date,t1,t2,t3\n\
            2024-01-02,AAPL.txt, MSFT ,XOM\n\
            2024-03-01,AAPL,MSFT,GE,\n";
        CsvConstituentAdapter::from_csv(Path::new("members.csv"), content, blacklist)
    }

    #[test]
    fn snapshots_forward_fill_between_rows() {
        let adapter = sample_adapter(vec![]);

        let feb: Vec<String> = adapter
            .constituents_as_of(date("2024-02-15"))
            .into_iter()
            .collect();
        assert_eq!(feb, vec!["AAPL", "MSFT", "XOM"]);

        let apr = adapter.constituents_as_of(date("2024-04-01"));
        assert!(apr.contains("GE"));
        assert!(!apr.contains("XOM"));
    }

    #[test]
    fn ticker_cells_are_cleaned() {
        let adapter = sample_adapter(vec![]);
        let jan = adapter.constituents_as_of(date("2024-01-02"));
        assert!(jan.contains("AAPL"));
        assert!(jan.contains("MSFT"));
        assert_eq!(jan.len(), 3);
    }

    #[test]
    fn blacklist_drops_ticker_after_cutoff() {
        let adapter = sample_adapter(vec![BlacklistEntry {
            cutoff: date("2024-02-01"),
            ticker: "MSFT".into(),
        }]);
        assert!(adapter.constituents_as_of(date("2024-01-15")).contains("MSFT"));
        assert!(!adapter.constituents_as_of(date("2024-03-15")).contains("MSFT"));
    }

    #[test]
    fn before_first_snapshot_is_empty() {
        let adapter = sample_adapter(vec![]);
        assert!(adapter.constituents_as_of(date("2023-12-31")).is_empty());
    }

    #[test]
    fn headerless_table_loads_too() {
        let content = "2024-01-02,AAPL,MSFT\n2024-02-01,AAPL,GE\n";
        let adapter = CsvConstituentAdapter::from_csv(Path::new("members.csv"), content, vec![]);
        assert_eq!(adapter.table().len(), 2);
        assert!(adapter.constituents_as_of(date("2024-01-15")).contains("MSFT"));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("members.csv");
        fs::write(&path, "2024-01-02,AAPL,MSFT\n").unwrap();

        let adapter = CsvConstituentAdapter::from_file(&path, vec![]).unwrap();
        assert!(adapter.constituents_as_of(date("2024-01-02")).contains("AAPL"));
    }
}
