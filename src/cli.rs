//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use crate::adapters::constituent_adapter::CsvConstituentAdapter;
use crate::adapters::csv_adapter::CsvDataAdapter;
use crate::adapters::csv_ledger_adapter::CsvLedgerAdapter;
use crate::adapters::file_config_adapter::{build_strategy_config, FileConfigAdapter};
use crate::domain::calendar::TradingCalendar;
use crate::domain::config::StrategyConfig;
use crate::domain::error::RotatorError;
use crate::domain::metrics::TickerMetrics;
use crate::domain::performance::Performance;
use crate::domain::ranking::RankingEngine;
use crate::domain::regime::RegimeClassifier;
use crate::domain::series::BenchmarkSeries;
use crate::domain::simulator::{SimulationOutput, Simulator};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::ledger_port::LedgerPort;

#[derive(Parser, Debug)]
#[command(name = "rotator", about = "Momentum rotation backtester for index constituents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest and export the trade ledger
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for trades.csv, equity_curve.csv and rebalances.csv
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Print every executed trade
        #[arg(short, long)]
        verbose: bool,
    },
    /// Rank the market on a given date
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        /// Scan date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
        /// Number of rows to print
        #[arg(short, long, default_value_t = 20)]
        top: usize,
    },
    /// Run in live mode and print current holdings as JSON
    Holdings {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate configuration and data availability
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output_dir,
            verbose,
        } => run_backtest(&config, output_dir.as_ref(), verbose),
        Command::Scan { config, date, top } => run_scan(&config, &date, top),
        Command::Holdings { config } => run_holdings(&config),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &RotatorError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

/// Everything the subcommands share: parsed config, wired adapters and the
/// two index series every run needs.
struct Runtime {
    config: StrategyConfig,
    data: CsvDataAdapter,
    constituents: CsvConstituentAdapter,
    benchmark: Rc<BenchmarkSeries>,
    hedge: Rc<BenchmarkSeries>,
}

fn build_runtime(config_path: &PathBuf) -> Result<Runtime, ExitCode> {
    // Stage 1: Load config
    eprintln!("Loading configuration from {}", config_path.display());
    let adapter = match FileConfigAdapter::from_file(config_path) {
        Ok(adapter) => adapter,
        Err(err) => return Err(fail(&err)),
    };
    let config = match build_strategy_config(&adapter) {
        Ok(config) => config,
        Err(err) => return Err(fail(&err)),
    };

    // Stage 2: Wire data adapters
    let price_dir = PathBuf::from(
        adapter
            .get_string("data", "price_dir")
            .unwrap_or_else(|| "data".to_string()),
    );
    let constituent_file = adapter
        .get_string("data", "constituent_file")
        .map(PathBuf::from)
        .unwrap_or_else(|| price_dir.join("constituents.csv"));
    let constituents =
        match CsvConstituentAdapter::from_file(&constituent_file, config.blacklist.clone()) {
            Ok(adapter) => adapter,
            Err(err) => return Err(fail(&err)),
        };
    if constituents.table().is_empty() {
        let err = RotatorError::Data {
            reason: format!("no membership rows in {}", constituent_file.display()),
        };
        return Err(fail(&err));
    }
    let data = CsvDataAdapter::new(price_dir);

    // Stage 3: Load benchmark and hedge series
    let benchmark = load_index_series(&data, &config.benchmark_ticker)?;
    let hedge = load_index_series(&data, &config.hedge_ticker)?;

    Ok(Runtime {
        config,
        data,
        constituents,
        benchmark,
        hedge,
    })
}

fn load_index_series(
    data: &CsvDataAdapter,
    ticker: &str,
) -> Result<Rc<BenchmarkSeries>, ExitCode> {
    match data.get_benchmark_series(ticker) {
        Ok(Some(series)) => {
            if let (Some(first), Some(last)) = (series.dates.first(), series.dates.last()) {
                eprintln!("Loaded {ticker}: {first} to {last} ({} bars)", series.len());
            }
            Ok(series)
        }
        Ok(None) => {
            let err = RotatorError::NoData {
                ticker: ticker.to_string(),
            };
            Err(fail(&err))
        }
        Err(err) => Err(fail(&err)),
    }
}

fn run_backtest(config_path: &PathBuf, output_dir: Option<&PathBuf>, verbose: bool) -> ExitCode {
    let runtime = match build_runtime(config_path) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    let Runtime {
        config,
        data,
        constituents,
        benchmark,
        ..
    } = &runtime;

    // Stage 4: Resolve the simulated range
    let calendar = TradingCalendar::new(benchmark.dates.clone());
    let regime = RegimeClassifier::new(benchmark);
    let Some((start_idx, end_idx)) = calendar.simulation_range(config.start_date, config.end_date)
    else {
        let err = RotatorError::Data {
            reason: "no trading days inside the configured date range".to_string(),
        };
        return fail(&err);
    };
    let start = calendar.days()[start_idx];
    let end = calendar.days()[end_idx];

    // Stage 5: Preload price series for every ticker the run can touch
    let universe = constituents.table().tickers_between(start, end);
    let mut loaded = 0usize;
    for ticker in &universe {
        match data.get_series(ticker) {
            Ok(Some(_)) => loaded += 1,
            Ok(None) => {}
            Err(err) => eprintln!("Warning: skipping {ticker} ({err})"),
        }
    }
    eprintln!("Loaded {loaded} of {} price series", universe.len());

    // Stage 6: Run the simulation
    eprintln!(
        "Running simulation: {start} to {end} ({} trading days)",
        end_idx - start_idx + 1
    );
    let engine = RankingEngine::new(data, constituents, config);
    let mut simulator = Simulator::new(config, data, &engine, &regime, &calendar);
    if verbose {
        simulator = simulator.with_trade_logger(Box::new(|trade| {
            eprintln!(
                "  {} {:<4} {:<6} {:>6} @ {:>9.2}  {}",
                trade.date, trade.action, trade.ticker, trade.quantity, trade.price, trade.reason
            );
        }));
    }
    let output = match simulator.run() {
        Ok(output) => output,
        Err(err) => return fail(&err),
    };
    eprintln!(
        "Simulation complete: {} trades over {} days",
        output.trades.len(),
        output.equity_curve.len()
    );

    // Stage 7: Print the performance summary
    let performance = Performance::compute(&output.equity_curve, &output.trades, config.initial_cash);
    print_performance(&performance);

    // Stage 8: Export ledger artifacts
    let dir = output_dir
        .cloned()
        .unwrap_or_else(|| PathBuf::from("output"));
    let ledger = CsvLedgerAdapter::new(dir.clone());
    if let Err(err) = export_artifacts(&ledger, &output, config.live_mode) {
        return fail(&err);
    }
    eprintln!("\nArtifacts written to {}", dir.display());
    ExitCode::SUCCESS
}

fn export_artifacts(
    ledger: &dyn LedgerPort,
    output: &SimulationOutput,
    live_mode: bool,
) -> Result<(), RotatorError> {
    ledger.write_trades(&output.trades)?;
    ledger.write_equity_curve(&output.equity_curve)?;
    ledger.write_rebalances(&output.rebalance_snapshots)?;
    if live_mode {
        ledger.write_holdings(&output.holdings)?;
    }
    Ok(())
}

fn print_performance(perf: &Performance) {
    println!("\n=== Backtest Results ===");
    println!("Total return:      {:>8.2}%", perf.total_return * 100.0);
    println!("CAGR:              {:>8.2}%", perf.cagr * 100.0);
    println!("Sharpe ratio:      {:>8.2}", perf.sharpe_ratio);
    println!("Max drawdown:      {:>8.2}%", -perf.max_drawdown * 100.0);
    println!("Drawdown duration: {:>5} days", perf.max_drawdown_duration);
    println!(
        "Trades:            {:>5} ({} buys, {} sells)",
        perf.total_trades, perf.buys, perf.sells
    );
    println!(
        "Win rate:          {:>8.2}% ({} won, {} lost, {} flat)",
        perf.win_rate * 100.0,
        perf.trades_won,
        perf.trades_lost,
        perf.trades_breakeven
    );
    if perf.profit_factor.is_finite() {
        println!("Profit factor:     {:>8.2}", perf.profit_factor);
    } else {
        println!("Profit factor:     {:>8}", "inf");
    }
    println!("Avg win:           {:>8.2}", perf.avg_win);
    println!("Avg loss:          {:>8.2}", perf.avg_loss);
}

fn run_scan(config_path: &PathBuf, date_str: &str, top: usize) -> ExitCode {
    let runtime = match build_runtime(config_path) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    let Runtime {
        config,
        data,
        constituents,
        ..
    } = &runtime;

    let date = match NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            eprintln!("error: --date must be a YYYY-MM-DD date, got {date_str:?}");
            return ExitCode::from(2);
        }
    };

    // Stage 4: Rank the market
    let engine = RankingEngine::new(data, constituents, config);
    let scan = engine.scan_market(date, config.lookback);
    if scan.is_empty() {
        let err = RotatorError::Data {
            reason: format!("no rankable tickers on {date}"),
        };
        return fail(&err);
    }

    // Stage 5: Apply the entry filters and print
    let passing: Vec<&TickerMetrics> = scan
        .iter()
        .filter(|m| config.max_adj_slope.map(|cap| m.score < cap).unwrap_or(true))
        .filter(|m| m.max_gap < config.skip_max_gap_pct)
        .collect();
    let rows = &passing[..top.min(passing.len())];

    println!(
        "Scan for {date}: {} ranked, {} pass entry filters (showing {})",
        scan.len(),
        passing.len(),
        rows.len()
    );
    println!(
        "{:<5} {:<8} {:>9} {:>10} {:>7} {:>7} {:>10}",
        "Rank", "Ticker", "Score", "Price", "ATR%", "Gap%", "ExitEMA"
    );
    for (rank, m) in rows.iter().enumerate() {
        println!(
            "{:<5} {:<8} {:>9.3} {:>10.2} {:>7.2} {:>7.2} {:>10.2}",
            rank + 1,
            m.ticker,
            m.score,
            m.price,
            m.atr_pct * 100.0,
            m.max_gap * 100.0,
            m.exit_ema
        );
    }
    ExitCode::SUCCESS
}

fn run_holdings(config_path: &PathBuf) -> ExitCode {
    let runtime = match build_runtime(config_path) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    // Holdings only make sense when the final day's positions stay open.
    let mut config = runtime.config.clone();
    config.live_mode = true;

    let calendar = TradingCalendar::new(runtime.benchmark.dates.clone());
    let regime = RegimeClassifier::new(&runtime.benchmark);
    let engine = RankingEngine::new(&runtime.data, &runtime.constituents, &config);
    let simulator = Simulator::new(&config, &runtime.data, &engine, &regime, &calendar);
    let output = match simulator.run() {
        Ok(output) => output,
        Err(err) => return fail(&err),
    };

    match serde_json::to_string_pretty(&output.holdings) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let err = RotatorError::Export {
                path: "stdout".to_string(),
                reason: err.to_string(),
            };
            fail(&err)
        }
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    let runtime = match build_runtime(config_path) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    let Runtime {
        config,
        data,
        constituents,
        benchmark,
        hedge,
    } = &runtime;

    let calendar = TradingCalendar::new(benchmark.dates.clone());
    let Some((start_idx, end_idx)) = calendar.simulation_range(config.start_date, config.end_date)
    else {
        let err = RotatorError::Data {
            reason: "no trading days inside the configured date range".to_string(),
        };
        return fail(&err);
    };
    let start = calendar.days()[start_idx];
    let end = calendar.days()[end_idx];

    let universe = constituents.table().tickers_between(start, end);
    let mut available = 0usize;
    for ticker in &universe {
        if matches!(data.get_series(ticker), Ok(Some(_))) {
            available += 1;
        }
    }

    println!("Configuration OK");
    println!(
        "  Simulation window: {start} to {end} ({} trading days)",
        end_idx - start_idx + 1
    );
    println!(
        "  Benchmark {} ({} bars), hedge {} ({} bars)",
        config.benchmark_ticker,
        benchmark.len(),
        config.hedge_ticker,
        hedge.len()
    );
    println!(
        "  Universe: {} tickers, {} with price data",
        universe.len(),
        available
    );
    println!(
        "  Target holdings: {}, rebalance on {} every {} week(s)",
        config.target_holdings,
        weekday_name(config.rebalance_weekday),
        config.rebalance_weeks
    );
    if !config.blacklist.is_empty() {
        println!("  Blacklist entries: {}", config.blacklist.len());
    }
    if config.live_mode {
        println!("  Live mode: final-day positions stay open");
    }
    ExitCode::SUCCESS
}

fn weekday_name(num_days_from_monday: u32) -> &'static str {
    match num_days_from_monday {
        0 => "Monday",
        1 => "Tuesday",
        2 => "Wednesday",
        3 => "Thursday",
        4 => "Friday",
        5 => "Saturday",
        _ => "Sunday",
    }
}
