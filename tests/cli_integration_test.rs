//! On-disk pipeline tests: INI configuration and CSV price data wired
//! through the file adapters the same way the binary wires them.
//!
//! Tests cover:
//! - Strategy configuration built from a real INI file
//! - Full backtest over CSV files on disk, live and non-live
//! - Ledger artifacts written, re-readable and sized to the run
//! - Identical runs producing byte-identical artifacts

mod common;

use common::*;
use rotator::adapters::constituent_adapter::CsvConstituentAdapter;
use rotator::adapters::csv_adapter::CsvDataAdapter;
use rotator::adapters::csv_ledger_adapter::CsvLedgerAdapter;
use rotator::adapters::file_config_adapter::{build_strategy_config, FileConfigAdapter};
use rotator::domain::config::StrategyConfig;
use rotator::domain::simulator::SimulationOutput;
use rotator::ports::config_port::ConfigPort;
use rotator::ports::data_port::MarketDataPort;
use rotator::ports::ledger_port::LedgerPort;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct DiskWorld {
    dir: TempDir,
    config_path: PathBuf,
}

/// Price files, a membership file and an INI inside one temp directory.
/// Three uptrending stocks, AAA strongest, under a rising benchmark.
fn disk_world(live_mode: bool) -> DiskWorld {
    let dir = TempDir::new().unwrap();
    let price_dir = dir.path().join("prices");
    fs::create_dir_all(&price_dir).unwrap();

    let days = weekdays(260);
    write_price_csv(&price_dir, "SPY", &days, &growth_closes(260, 400.0, 0.0015));
    write_price_csv(&price_dir, "SSO", &days, &growth_closes(260, 40.0, 0.003));
    write_price_csv(&price_dir, "AAA", &days, &growth_closes(260, 100.0, 0.004));
    write_price_csv(&price_dir, "BBB", &days, &growth_closes(260, 100.0, 0.003));
    write_price_csv(&price_dir, "CCC", &days, &growth_closes(260, 100.0, 0.002));

    let members = price_dir.join("constituents.csv");
    write_constituents_csv(&members, &[(days[0], &["AAA", "BBB", "CCC"])]);

    let config_path = dir.path().join("backtest.ini");
    fs::write(
        &config_path,
        backtest_ini(
            &price_dir,
            &members,
            days[SIM_START],
            *days.last().unwrap(),
            live_mode,
        ),
    )
    .unwrap();

    DiskWorld { dir, config_path }
}

fn run_from_disk(world: &DiskWorld) -> (StrategyConfig, SimulationOutput) {
    let adapter = FileConfigAdapter::from_file(&world.config_path).unwrap();
    let config = build_strategy_config(&adapter).unwrap();

    let price_dir = PathBuf::from(adapter.get_string("data", "price_dir").unwrap());
    let members = PathBuf::from(adapter.get_string("data", "constituent_file").unwrap());
    let constituents =
        CsvConstituentAdapter::from_file(&members, config.blacklist.clone()).unwrap();
    let data = CsvDataAdapter::new(price_dir);
    let spy = data
        .get_benchmark_series(&config.benchmark_ticker)
        .unwrap()
        .unwrap();

    let output = run_sim(&config, &data, &constituents, &spy, &spy.dates);
    (config, output)
}

mod config_loading {
    use super::*;

    #[test]
    fn config_from_ini_reflects_file_values() {
        let world = disk_world(false);
        let adapter = FileConfigAdapter::from_file(&world.config_path).unwrap();
        let config = build_strategy_config(&adapter).unwrap();

        assert_eq!(config.target_holdings, 2);
        assert_eq!(config.lookback, 60);
        assert_eq!(config.exit_ema_span, 30);
        assert_eq!(config.atr_period, 14);
        assert_eq!(config.initial_cash, 100_000.0);
        assert_eq!(config.commission_rate, 0.0);
        assert_eq!(config.benchmark_ticker, "SPY");
        assert_eq!(config.hedge_ticker, "SSO");
        assert!(!config.live_mode);
        assert!(!config.corr_filter_enabled);
        assert!(config.blacklist.is_empty());
        assert!(config.start_date.is_some());
        assert!(config.end_date.is_some());
    }
}

mod disk_pipeline {
    use super::*;

    #[test]
    fn non_live_backtest_closes_out_and_writes_artifacts() {
        let world = disk_world(false);
        let (config, output) = run_from_disk(&world);
        assert!(!config.live_mode);

        // Two buys on the confirming Wednesday, two forced closes at the end.
        assert_eq!(output.trades.len(), 4);
        assert_eq!(output.trades[0].ticker, "AAA");
        assert_eq!(output.trades[1].ticker, "BBB");
        assert!(output.trades[2].reason.starts_with("Clear ALL"));
        assert!(output.trades[3].reason.starts_with("Clear ALL"));
        assert!(output.holdings.positions.is_empty());
        assert_eq!(output.equity_curve.len(), 50);

        let out_dir = world.dir.path().join("out");
        let ledger = CsvLedgerAdapter::new(out_dir.clone());
        ledger.write_trades(&output.trades).unwrap();
        ledger.write_equity_curve(&output.equity_curve).unwrap();
        ledger.write_rebalances(&output.rebalance_snapshots).unwrap();

        let trades_csv = fs::read_to_string(out_dir.join("trades.csv")).unwrap();
        assert_eq!(trades_csv.lines().count(), 1 + 4);
        let equity_csv = fs::read_to_string(out_dir.join("equity_curve.csv")).unwrap();
        assert_eq!(equity_csv.lines().count(), 1 + 50);
        // Nine confirmed rotation Wednesdays inside the window.
        let rebalances_csv = fs::read_to_string(out_dir.join("rebalances.csv")).unwrap();
        assert_eq!(rebalances_csv.lines().count(), 1 + 9);
        assert!(!out_dir.join("current_holdings.json").exists());
    }

    #[test]
    fn live_backtest_keeps_positions_and_exports_holdings_json() {
        let world = disk_world(true);
        let (config, output) = run_from_disk(&world);
        assert!(config.live_mode);

        assert_eq!(output.trades.len(), 2);
        assert_eq!(output.holdings.positions.len(), 2);
        let held: Vec<&str> = output
            .holdings
            .positions
            .iter()
            .map(|p| p.ticker.as_str())
            .collect();
        assert!(held.contains(&"AAA") && held.contains(&"BBB"));

        let out_dir = world.dir.path().join("out");
        let ledger = CsvLedgerAdapter::new(out_dir.clone());
        ledger.write_holdings(&output.holdings).unwrap();

        let raw = fs::read_to_string(out_dir.join("current_holdings.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            json["as_of"],
            serde_json::Value::String(output.holdings.as_of.to_string())
        );
        assert_eq!(json["positions"].as_array().unwrap().len(), 2);
        assert!(json["total_equity"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn identical_disk_runs_write_identical_artifacts() {
        let world = disk_world(false);

        let (_, first) = run_from_disk(&world);
        let (_, second) = run_from_disk(&world);

        let dir_a = world.dir.path().join("a");
        let dir_b = world.dir.path().join("b");
        let ledger_a = CsvLedgerAdapter::new(dir_a.clone());
        let ledger_b = CsvLedgerAdapter::new(dir_b.clone());
        ledger_a.write_trades(&first.trades).unwrap();
        ledger_b.write_trades(&second.trades).unwrap();
        ledger_a.write_equity_curve(&first.equity_curve).unwrap();
        ledger_b.write_equity_curve(&second.equity_curve).unwrap();

        let trades_a = fs::read_to_string(dir_a.join("trades.csv")).unwrap();
        let trades_b = fs::read_to_string(dir_b.join("trades.csv")).unwrap();
        assert_eq!(trades_a, trades_b);
        let equity_a = fs::read_to_string(dir_a.join("equity_curve.csv")).unwrap();
        let equity_b = fs::read_to_string(dir_b.join("equity_curve.csv")).unwrap();
        assert_eq!(equity_a, equity_b);
    }
}
