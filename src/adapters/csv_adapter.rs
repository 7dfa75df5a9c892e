//! CSV market data adapter.
//!
//! Reads one file per ticker (`<TICKER>.csv`, falling back to
//! `<TICKER>.txt`) from the configured data directory. Files are either
//! headered CSV with column names matched case-insensitively (shorthand
//! names like `o`/`c`/`vol`/`adj_c` included) or the headerless export
//! layout `ticker,date,open,high,low,close,volume`. Malformed rows are
//! skipped with a stderr warning so one bad line does not sink a whole
//! series. Loaded series are cached per ticker, misses included.

use crate::domain::error::RotatorError;
use crate::domain::series::{BenchmarkSeries, PriceBar, PriceSeries};
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

pub struct CsvDataAdapter {
    data_dir: PathBuf,
    series_cache: RefCell<HashMap<String, Option<Rc<PriceSeries>>>>,
    benchmark_cache: RefCell<HashMap<String, Option<Rc<BenchmarkSeries>>>>,
}

impl CsvDataAdapter {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            series_cache: RefCell::new(HashMap::new()),
            benchmark_cache: RefCell::new(HashMap::new()),
        }
    }

    fn data_file(&self, ticker: &str) -> Option<PathBuf> {
        for ext in ["csv", "txt"] {
            let path = self.data_dir.join(format!("{ticker}.{ext}"));
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    fn load_series(&self, ticker: &str) -> Result<Option<PriceSeries>, RotatorError> {
        let Some(path) = self.data_file(ticker) else {
            return Ok(None);
        };
        let content = fs::read_to_string(&path)?;
        let bars = parse_price_rows(&path, &content);
        if bars.is_empty() {
            return Ok(None);
        }
        Ok(Some(PriceSeries::new(ticker.to_string(), bars)))
    }

    fn load_benchmark(&self, ticker: &str) -> Result<Option<BenchmarkSeries>, RotatorError> {
        let Some(path) = self.data_file(ticker) else {
            return Ok(None);
        };
        let content = fs::read_to_string(&path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| RotatorError::Data {
                reason: format!("{}: unreadable header ({err})", path.display()),
            })?
            .clone();
        let columns = map_columns(&headers);
        let (Some(date_col), Some(close_col)) = (columns.date, columns.close) else {
            return Err(RotatorError::Data {
                reason: format!(
                    "{}: benchmark file needs Date and Close columns",
                    path.display()
                ),
            });
        };

        let mut points = Vec::new();
        for row in reader.records() {
            let record = match row {
                Ok(record) => record,
                Err(err) => {
                    eprintln!("Warning: {}: skipping unreadable row ({err})", path.display());
                    continue;
                }
            };
            match parse_benchmark_row(&record, date_col, close_col) {
                Ok(point) => points.push(point),
                Err(reason) => {
                    eprintln!("Warning: {}: skipping row ({reason})", path.display());
                }
            }
        }
        if points.is_empty() {
            return Ok(None);
        }
        Ok(Some(BenchmarkSeries::new(ticker.to_string(), points)))
    }
}

impl MarketDataPort for CsvDataAdapter {
    fn get_series(&self, ticker: &str) -> Result<Option<Rc<PriceSeries>>, RotatorError> {
        if let Some(cached) = self.series_cache.borrow().get(ticker) {
            return Ok(cached.clone());
        }
        let loaded = self.load_series(ticker)?.map(Rc::new);
        self.series_cache
            .borrow_mut()
            .insert(ticker.to_string(), loaded.clone());
        Ok(loaded)
    }

    fn get_benchmark_series(
        &self,
        ticker: &str,
    ) -> Result<Option<Rc<BenchmarkSeries>>, RotatorError> {
        if let Some(cached) = self.benchmark_cache.borrow().get(ticker) {
            return Ok(cached.clone());
        }
        let loaded = self.load_benchmark(ticker)?.map(Rc::new);
        self.benchmark_cache
            .borrow_mut()
            .insert(ticker.to_string(), loaded.clone());
        Ok(loaded)
    }
}

#[derive(Default)]
struct ColumnMap {
    date: Option<usize>,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    adj_close: Option<usize>,
    volume: Option<usize>,
}

impl ColumnMap {
    /// Fixed layout of the headerless export: ticker, date, then OHLCV.
    fn headerless() -> ColumnMap {
        ColumnMap {
            date: Some(1),
            open: Some(2),
            high: Some(3),
            low: Some(4),
            close: Some(5),
            adj_close: None,
            volume: Some(6),
        }
    }
}

/// Resolved column indices after the required ones are known to exist.
struct Layout {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    adj_close: Option<usize>,
    volume: Option<usize>,
}

fn map_columns(headers: &csv::StringRecord) -> ColumnMap {
    let mut map = ColumnMap::default();
    for (i, raw) in headers.iter().enumerate() {
        let key: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| *c != ' ' && *c != '_')
            .collect();
        match key.as_str() {
            "date" => map.date = Some(i),
            "open" | "o" => map.open = Some(i),
            "high" | "h" => map.high = Some(i),
            "low" | "l" => map.low = Some(i),
            "close" | "c" => map.close = Some(i),
            "adjclose" | "adjc" => map.adj_close = Some(i),
            "volume" | "vol" => map.volume = Some(i),
            _ => {}
        }
    }
    map
}

fn has_header_row(first_line: &str) -> bool {
    let lower = first_line.to_lowercase();
    ["date", "open", "high", "low", "close", "volume"]
        .iter()
        .any(|name| lower.contains(name))
}

fn parse_price_rows(path: &Path, content: &str) -> Vec<PriceBar> {
    let has_header = content.lines().next().map(has_header_row).unwrap_or(false);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let columns = if has_header {
        match reader.headers() {
            Ok(headers) => map_columns(headers),
            Err(err) => {
                eprintln!("Warning: {}: unreadable header ({err})", path.display());
                return Vec::new();
            }
        }
    } else {
        ColumnMap::headerless()
    };

    let (Some(date), Some(open), Some(high), Some(low), Some(close)) = (
        columns.date,
        columns.open,
        columns.high,
        columns.low,
        columns.close,
    ) else {
        eprintln!("Warning: {}: missing required price columns", path.display());
        return Vec::new();
    };
    let layout = Layout {
        date,
        open,
        high,
        low,
        close,
        adj_close: columns.adj_close,
        volume: columns.volume,
    };

    let mut bars = Vec::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                eprintln!("Warning: {}: skipping unreadable row ({err})", path.display());
                continue;
            }
        };
        match parse_bar(&record, &layout) {
            Ok(bar) => bars.push(bar),
            Err(reason) => {
                eprintln!("Warning: {}: skipping row ({reason})", path.display());
            }
        }
    }
    bars
}

fn parse_bar(record: &csv::StringRecord, layout: &Layout) -> Result<PriceBar, String> {
    let date = parse_date(field(record, layout.date, "date")?)?;
    let open = parse_number(field(record, layout.open, "open")?, "open")?;
    let high = parse_number(field(record, layout.high, "high")?, "high")?;
    let low = parse_number(field(record, layout.low, "low")?, "low")?;
    let close = parse_number(field(record, layout.close, "close")?, "close")?;
    let adj_close = match layout.adj_close.and_then(|i| record.get(i)) {
        Some(value) if !value.is_empty() => Some(parse_number(value, "adj close")?),
        _ => None,
    };
    let volume = match layout.volume.and_then(|i| record.get(i)) {
        Some(value) if !value.is_empty() => parse_number(value, "volume")?,
        _ => 0.0,
    };
    Ok(PriceBar {
        date,
        open,
        high,
        low,
        close,
        adj_close,
        volume,
    })
}

fn parse_benchmark_row(
    record: &csv::StringRecord,
    date_col: usize,
    close_col: usize,
) -> Result<(NaiveDate, f64), String> {
    let date = parse_date(field(record, date_col, "date")?)?;
    let close = parse_number(field(record, close_col, "close")?, "close")?;
    Ok((date, close))
}

fn field<'r>(record: &'r csv::StringRecord, index: usize, name: &str) -> Result<&'r str, String> {
    record
        .get(index)
        .ok_or_else(|| format!("missing {name} field"))
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(date);
        }
    }
    Err(format!("invalid date {value:?}"))
}

fn parse_number(value: &str, name: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| format!("invalid {name} {value:?}"))?;
    if parsed.is_nan() {
        return Err(format!("invalid {name} {value:?}"));
    }
    Ok(parsed)
}
