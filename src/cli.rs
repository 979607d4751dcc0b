//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::csv_store::{CsvResultsStore, CsvSignalLog};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestResult, CloseReason};
use crate::domain::backtest_service::BacktestService;
use crate::domain::config::{AppConfig, StorageBackend};
use crate::domain::error::ZlmaError;
use crate::domain::ohlcv::Timeframe;
use crate::domain::signal::{DetectOptions, Detection, SignalRecord};
use crate::domain::signal_service::SignalService;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use crate::ports::results_port::BacktestResultsPort;
use crate::ports::signal_log_port::SignalLogPort;

#[derive(Parser, Debug)]
#[command(name = "zlmatrader", about = "EMA/ZLMA crossover signals and backtests")]
pub struct Cli {
    /// INI configuration file; built-in defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the most recent indicator rows for a symbol
    Indicators {
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        timeframe: Option<String>,
        #[arg(long, default_value_t = 10)]
        tail: usize,
    },
    /// Detect crossover signals for a symbol
    Signals {
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        timeframe: Option<String>,
        #[arg(long)]
        months: Option<u32>,
        #[arg(long)]
        force_refresh: bool,
        #[arg(long)]
        no_save: bool,
    },
    /// Detect signals for several symbols (comma-separated, or [signals] symbols)
    Scan {
        #[arg(long)]
        symbols: Option<String>,
        #[arg(short, long)]
        timeframe: Option<String>,
    },
    /// Summarize the signal log
    Summary,
    /// List signals from the log that are still active
    Active {
        #[arg(short, long)]
        timeframe: Option<String>,
    },
    /// Run a long-only crossover backtest
    Backtest {
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        timeframe: Option<String>,
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,
    },
    /// Show persisted backtest summaries
    Results {
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Load bars from a CSV file into the SQLite store
    Import {
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        timeframe: Option<String>,
        /// Directory holding <SYMBOL>_<timeframe>.csv
        #[arg(long)]
        from: PathBuf,
    },
    /// Validate the configuration and open the configured storage
    Validate,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("invalid date {s:?} (expected YYYY-MM-DD)"))
}

/// Storage collaborators selected by `[storage] backend`.
pub struct App {
    pub config: AppConfig,
    pub prices: Arc<dyn PricePort>,
    pub signal_log: Arc<dyn SignalLogPort>,
    pub results: Arc<dyn BacktestResultsPort>,
}

impl App {
    pub fn signal_service(&self) -> SignalService {
        SignalService::new(
            Arc::clone(&self.prices),
            Arc::clone(&self.signal_log),
            self.config.indicators.engine(),
        )
    }

    pub fn backtest_service(&self) -> BacktestService {
        BacktestService::new(
            Arc::clone(&self.prices),
            Arc::clone(&self.results),
            self.config.indicators.engine(),
            self.config.backtest.clone(),
            self.config.indicators.history_months,
        )
    }

    fn timeframe(&self, value: Option<&str>) -> Result<Timeframe, ZlmaError> {
        match value {
            Some(s) => s.parse(),
            None => Ok(self.config.indicators.default_timeframe),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<(FileConfigAdapter, AppConfig), ZlmaError> {
    let adapter = match path {
        Some(p) => FileConfigAdapter::from_file(p)?,
        None => FileConfigAdapter::empty(),
    };
    let config = AppConfig::from_port(&adapter)?;
    Ok((adapter, config))
}

pub fn build_app(config: AppConfig) -> Result<App, ZlmaError> {
    match config.storage.backend {
        StorageBackend::Csv => Ok(App {
            prices: Arc::new(CsvPriceAdapter::new(config.storage.data_dir.clone())),
            signal_log: Arc::new(CsvSignalLog::new(config.storage.signals_path())),
            results: Arc::new(CsvResultsStore::new(config.storage.backtest_path())),
            config,
        }),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;

            let db = Arc::new(SqliteAdapter::from_config(&config.storage)?);
            db.initialize_schema()?;
            Ok(App {
                prices: db.clone(),
                signal_log: db.clone(),
                results: db,
                config,
            })
        }
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => Err(ZlmaError::invalid(
            "storage",
            "backend",
            "sqlite feature is required for the sqlite backend",
        )),
    }
}

/// `--symbols` wins over the `[signals] symbols` watchlist.
pub fn resolve_symbols(symbols_override: Option<&str>, config: &dyn ConfigPort) -> Vec<String> {
    match symbols_override {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => config.get_list("signals", "symbols"),
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), ZlmaError> {
    let (config_port, config) = load_config(cli.config.as_deref())?;
    let app = build_app(config)?;

    match cli.command {
        Command::Indicators {
            symbol,
            timeframe,
            tail,
        } => run_indicators(&app, &symbol, timeframe.as_deref(), tail),
        Command::Signals {
            symbol,
            timeframe,
            months,
            force_refresh,
            no_save,
        } => {
            let options = DetectOptions {
                lookback_months: months.unwrap_or(app.config.indicators.history_months),
                force_refresh,
                save_signals: app.config.signals.save && !no_save,
            };
            run_signals(&app, &symbol, timeframe.as_deref(), options)
        }
        Command::Scan { symbols, timeframe } => {
            let symbols = resolve_symbols(symbols.as_deref(), &config_port);
            run_scan(&app, &symbols, timeframe.as_deref())
        }
        Command::Summary => run_summary(&app),
        Command::Active { timeframe } => run_active(&app, timeframe.as_deref()),
        Command::Backtest {
            symbol,
            timeframe,
            start,
            end,
        } => run_backtest(&app, &symbol, timeframe.as_deref(), start, end),
        Command::Results { ticker } => run_results(&app, ticker.as_deref()),
        Command::Import {
            symbol,
            timeframe,
            from,
        } => run_import(&app, &symbol, timeframe.as_deref(), from),
        Command::Validate => {
            println!(
                "configuration OK: EMA={} ZLMA={} timeframe={} backend={:?}",
                app.config.indicators.ema_period,
                app.config.indicators.zlma_period,
                app.config.indicators.default_timeframe,
                app.config.storage.backend
            );
            Ok(())
        }
    }
}

fn run_indicators(
    app: &App,
    symbol: &str,
    timeframe: Option<&str>,
    tail: usize,
) -> Result<(), ZlmaError> {
    let timeframe = app.timeframe(timeframe)?;
    let series = app.prices.get_series(
        symbol,
        timeframe,
        app.config.indicators.history_months,
        false,
    )?;
    if series.is_empty() {
        return Err(ZlmaError::NoData {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
        });
    }

    match app.config.indicators.engine().add_indicators(&series) {
        Ok(rows) => {
            println!(
                "{:<20} {:>12} {:>12} {:>12} {:>8} {:>6}",
                "timestamp", "close", "ema", "zlma", "signal", "trend"
            );
            for row in rows.iter().skip(rows.len().saturating_sub(tail)) {
                println!(
                    "{:<20} {:>12.4} {:>12.4} {:>12.4} {:>8} {:>6}",
                    row.timestamp.to_string(),
                    row.close,
                    row.ema,
                    row.zlma,
                    row.signal.value(),
                    row.trend.value()
                );
            }
        }
        Err(e @ ZlmaError::MissingField { .. }) => {
            eprintln!("warning: {e}; showing raw bars");
            let bars = series.bars();
            for bar in bars.iter().skip(bars.len().saturating_sub(tail)) {
                println!(
                    "{:<20} {:>12} {:>12} {:>12} {:>12} {:>14}",
                    bar.timestamp.to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                );
            }
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

fn print_detection(detection: &Detection) {
    match detection {
        Detection::NoData { symbol, timeframe } => {
            println!("{symbol} ({timeframe}): no data");
        }
        Detection::RawOnly {
            symbol,
            timeframe,
            last_price,
            reason,
        } => {
            println!("{symbol} ({timeframe}): indicators unavailable ({reason}), last price {last_price}");
        }
        Detection::Detected(report) => {
            let last = &report.last_signal;
            println!(
                "{} ({}): last signal {} at {} price {:.4}, current {:.4}",
                report.symbol,
                report.timeframe,
                last.signal.label(),
                last.timestamp,
                last.price,
                report.last_price
            );
            println!(
                "  {} signals ({} bullish, {} bearish), trend {}",
                report.signals_count(),
                report.bullish_count,
                report.bearish_count,
                last.trend.value()
            );
        }
    }
}

fn run_signals(
    app: &App,
    symbol: &str,
    timeframe: Option<&str>,
    options: DetectOptions,
) -> Result<(), ZlmaError> {
    let timeframe = app.timeframe(timeframe)?;
    let detection = app
        .signal_service()
        .detect_signals(symbol, timeframe, options)?;
    print_detection(&detection);

    if let Detection::Detected(report) = &detection {
        for event in &report.all_signals {
            println!(
                "  {} {:<8} price {:.4} ema {:.4} zlma {:.4}",
                event.timestamp, event.label, event.price, event.ema, event.zlma
            );
        }
    }
    Ok(())
}

fn run_scan(app: &App, symbols: &[String], timeframe: Option<&str>) -> Result<(), ZlmaError> {
    if symbols.is_empty() {
        return Err(ZlmaError::ConfigMissing {
            section: "signals".into(),
            key: "symbols".into(),
        });
    }
    let timeframe = app.timeframe(timeframe)?;
    let options = DetectOptions {
        lookback_months: app.config.indicators.history_months,
        save_signals: app.config.signals.save,
        ..DetectOptions::default()
    };

    let outcomes = app
        .signal_service()
        .detect_signals_for_multiple(symbols, timeframe, options);
    for (symbol, outcome) in &outcomes {
        match outcome {
            Ok(detection) => print_detection(detection),
            Err(e) => println!("{symbol} ({timeframe}): error: {e}"),
        }
    }
    Ok(())
}

fn print_record(r: &SignalRecord) {
    println!(
        "{:<12} {:<4} {} {:<8} price {:.4} current {:.4}",
        r.symbol,
        r.timeframe.as_str(),
        r.date,
        r.signal.label(),
        r.price,
        r.current_price
    );
}

fn run_summary(app: &App) -> Result<(), ZlmaError> {
    let summary = app.signal_service().signals_summary()?;
    println!(
        "total {} ({} bullish, {} bearish)",
        summary.total, summary.bullish, summary.bearish
    );
    for record in &summary.latest {
        print_record(record);
    }
    Ok(())
}

fn run_active(app: &App, timeframe: Option<&str>) -> Result<(), ZlmaError> {
    let timeframe = app.timeframe(timeframe)?;
    let today = Local::now().date_naive();
    let active = app.signal_service().active_signals(timeframe, today)?;
    if active.is_empty() {
        println!("no active {timeframe} signals");
    }
    for record in &active {
        print_record(record);
    }
    Ok(())
}

fn print_backtest(symbol: &str, timeframe: Timeframe, result: &BacktestResult) {
    let stats = &result.stats;
    println!("{symbol} ({timeframe})");
    println!("  initial capital  {:.2}", result.initial_capital);
    println!("  final capital    {:.2}", result.final_capital);
    println!("  total return     {:.2}%", result.total_return);
    println!(
        "  trades           {} ({} won, {} lost)",
        stats.total_trades, stats.winning_trades, stats.losing_trades
    );
    println!("  win rate         {:.2}%", stats.win_rate);
    println!("  avg win / loss   {:.2} / {:.2}", stats.avg_win, stats.avg_loss);
    println!("  max drawdown     {:.2}%", stats.max_drawdown);

    for trade in &result.trades {
        let reason = match trade.close_reason {
            Some(CloseReason::Signal) => "signal",
            Some(CloseReason::EndOfSeries) => "end",
            None => "open",
        };
        println!(
            "  {} {} @ {:.4} -> {} @ {:.4}  pnl {:.2} ({:.2}%) [{}]",
            trade.direction.as_str(),
            trade.entry_time,
            trade.entry_price,
            trade
                .exit_time
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into()),
            trade.exit_price.unwrap_or(f64::NAN),
            trade.pnl.unwrap_or(0.0),
            trade.pnl_pct.unwrap_or(0.0),
            reason
        );
    }
}

fn run_backtest(
    app: &App,
    symbol: &str,
    timeframe: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), ZlmaError> {
    let timeframe = app.timeframe(timeframe)?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ZlmaError::invalid(
                "backtest",
                "start",
                format!("start {s} is after end {e}"),
            ));
        }
    }
    let result = app
        .backtest_service()
        .run_backtest(symbol, timeframe, start, end)?;
    print_backtest(symbol, timeframe, &result);
    Ok(())
}

fn run_results(app: &App, ticker: Option<&str>) -> Result<(), ZlmaError> {
    let results = app.backtest_service().results(ticker)?;
    if results.is_empty() {
        println!("no backtest results");
    }
    for s in &results {
        println!(
            "{} {:<12} {:<4} return {:>8.2}% trades {:>3} win {:>6.2}% dd {:>6.2}% final {:.2}",
            s.date,
            s.ticker,
            s.timeframe.as_str(),
            s.total_return,
            s.total_trades,
            s.win_rate,
            s.max_drawdown,
            s.final_capital
        );
    }
    Ok(())
}

fn run_import(
    app: &App,
    symbol: &str,
    timeframe: Option<&str>,
    from: PathBuf,
) -> Result<(), ZlmaError> {
    let timeframe = app.timeframe(timeframe)?;

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        if app.config.storage.backend != StorageBackend::Sqlite {
            return Err(ZlmaError::invalid(
                "storage",
                "backend",
                "import requires the sqlite backend",
            ));
        }
        let series = CsvPriceAdapter::new(from).get_series(symbol, timeframe, u32::MAX, false)?;
        if series.is_empty() {
            return Err(ZlmaError::NoData {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
            });
        }
        let db = SqliteAdapter::from_config(&app.config.storage)?;
        db.initialize_schema()?;
        db.insert_bars(symbol, timeframe, series.bars())?;
        println!("imported {} bars for {symbol} ({timeframe})", series.len());
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (app, symbol, timeframe, from);
        Err(ZlmaError::invalid(
            "storage",
            "backend",
            "sqlite feature is required for import",
        ))
    }
}
