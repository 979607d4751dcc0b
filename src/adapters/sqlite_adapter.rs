//! SQLite store: price bars, the signal log and backtest summaries.

use crate::domain::backtest::BacktestSummary;
use crate::domain::config::StorageConfig;
use crate::domain::error::ZlmaError;
use crate::domain::indicator::Signal;
use crate::domain::ohlcv::{PriceBar, PriceSeries, Timeframe, parse_timestamp};
use crate::domain::signal::SignalRecord;
use crate::ports::price_port::PricePort;
use crate::ports::results_port::BacktestResultsPort;
use crate::ports::signal_log_port::SignalLogPort;
use chrono::{NaiveDate, NaiveDateTime};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const DATE_FMT: &str = "%Y-%m-%d";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn pool_err(e: r2d2::Error) -> ZlmaError {
    ZlmaError::Storage {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> ZlmaError {
    ZlmaError::StorageQuery {
        reason: e.to_string(),
    }
}

fn conversion_err(idx: usize, value: &str, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("{:?}: {}", value, reason).into(),
    )
}

fn timestamp_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_err(idx, &raw, "invalid timestamp".into()))
}

fn timeframe_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Timeframe> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: ZlmaError| conversion_err(idx, &raw, e.to_string()))
}

/// NULL columns read back as the missing-value sentinel.
fn price_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<f64> {
    Ok(row.get::<_, Option<f64>>(idx)?.unwrap_or(f64::NAN))
}

fn nullable(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(storage: &StorageConfig) -> Result<Self, ZlmaError> {
        let db_path = storage
            .sqlite_path
            .as_deref()
            .ok_or_else(|| ZlmaError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(storage.sqlite_pool_size)
            .build(manager)
            .map_err(pool_err)?;

        log::debug!("opened sqlite store at {}", db_path);
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, ZlmaError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, ZlmaError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), ZlmaError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS prices (
                    symbol TEXT NOT NULL,
                    timeframe TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    open REAL,
                    high REAL,
                    low REAL,
                    close REAL,
                    volume REAL,
                    PRIMARY KEY (symbol, timeframe, timestamp)
                );
                CREATE TABLE IF NOT EXISTS signals (
                    symbol TEXT NOT NULL,
                    timeframe TEXT NOT NULL,
                    date TEXT NOT NULL,
                    signal INTEGER NOT NULL,
                    price REAL NOT NULL,
                    current_price REAL NOT NULL,
                    timestamp TEXT NOT NULL,
                    UNIQUE (symbol, timeframe, date, signal)
                );
                CREATE TABLE IF NOT EXISTS backtest_results (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticker TEXT NOT NULL,
                    timeframe TEXT NOT NULL,
                    date TEXT NOT NULL,
                    initial_capital REAL NOT NULL,
                    final_capital REAL NOT NULL,
                    total_return REAL NOT NULL,
                    total_trades INTEGER NOT NULL,
                    winning_trades INTEGER NOT NULL,
                    losing_trades INTEGER NOT NULL,
                    win_rate REAL NOT NULL,
                    max_drawdown REAL NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_backtest_ticker ON backtest_results(ticker);",
            )
            .map_err(query_err)
    }

    pub fn insert_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: &[PriceBar],
    ) -> Result<(), ZlmaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO prices (symbol, timeframe, timestamp, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    symbol,
                    timeframe.as_str(),
                    bar.timestamp.format(TIMESTAMP_FMT).to_string(),
                    nullable(bar.open),
                    nullable(bar.high),
                    nullable(bar.low),
                    nullable(bar.close),
                    nullable(bar.volume)
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        log::debug!("stored {} bars for {} ({})", bars.len(), symbol, timeframe);
        Ok(())
    }
}

impl PricePort for SqliteAdapter {
    fn get_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_months: u32,
        _force_refresh: bool,
    ) -> Result<PriceSeries, ZlmaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, open, high, low, close, volume
                 FROM prices
                 WHERE symbol = ?1 AND timeframe = ?2
                 ORDER BY timestamp ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![symbol, timeframe.as_str()], |row| {
                Ok(PriceBar {
                    timestamp: timestamp_col(row, 0)?,
                    open: price_col(row, 1)?,
                    high: price_col(row, 2)?,
                    low: price_col(row, 3)?,
                    close: price_col(row, 4)?,
                    volume: price_col(row, 5)?,
                })
            })
            .map_err(query_err)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_err)?);
        }

        if bars.is_empty() {
            log::error!("no stored prices for {} ({})", symbol, timeframe);
        }
        let absent = PriceSeries::blank_columns(&bars);
        Ok(PriceSeries::new(bars)?
            .with_absent_columns(&absent)
            .lookback(lookback_months))
    }
}

impl SignalLogPort for SqliteAdapter {
    fn append(&self, record: &SignalRecord) -> Result<bool, ZlmaError> {
        let changed = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO signals (symbol, timeframe, date, signal, price, current_price, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.symbol,
                    record.timeframe.as_str(),
                    record.date.format(DATE_FMT).to_string(),
                    record.signal.value(),
                    record.price,
                    record.current_price,
                    record.timestamp.format(TIMESTAMP_FMT).to_string()
                ],
            )
            .map_err(query_err)?;
        Ok(changed > 0)
    }

    fn load_all(&self) -> Result<Vec<SignalRecord>, ZlmaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, timeframe, date, signal, price, current_price, timestamp
                 FROM signals ORDER BY rowid ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                let date_str: String = row.get(2)?;
                let date = NaiveDate::parse_from_str(&date_str, DATE_FMT)
                    .map_err(|e| conversion_err(2, &date_str, e.to_string()))?;
                let raw_signal: i64 = row.get(3)?;
                let signal = Signal::from_value(raw_signal).ok_or_else(|| {
                    conversion_err(3, &raw_signal.to_string(), "invalid signal".into())
                })?;
                Ok(SignalRecord {
                    symbol: row.get(0)?,
                    timeframe: timeframe_col(row, 1)?,
                    date,
                    signal,
                    price: row.get(4)?,
                    current_price: row.get(5)?,
                    timestamp: timestamp_col(row, 6)?,
                })
            })
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(query_err)?);
        }
        Ok(records)
    }
}

impl BacktestResultsPort for SqliteAdapter {
    fn append(&self, summary: &BacktestSummary) -> Result<(), ZlmaError> {
        self.conn()?
            .execute(
                "INSERT INTO backtest_results (ticker, timeframe, date, initial_capital, final_capital,
                    total_return, total_trades, winning_trades, losing_trades, win_rate, max_drawdown)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    summary.ticker,
                    summary.timeframe.as_str(),
                    summary.date.format(TIMESTAMP_FMT).to_string(),
                    summary.initial_capital,
                    summary.final_capital,
                    summary.total_return,
                    summary.total_trades as i64,
                    summary.winning_trades as i64,
                    summary.losing_trades as i64,
                    summary.win_rate,
                    summary.max_drawdown
                ],
            )
            .map_err(query_err)?;
        log::info!("backtest summary for {} saved", summary.ticker);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<BacktestSummary>, ZlmaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticker, timeframe, date, initial_capital, final_capital, total_return,
                        total_trades, winning_trades, losing_trades, win_rate, max_drawdown
                 FROM backtest_results ORDER BY id ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(BacktestSummary {
                    ticker: row.get(0)?,
                    timeframe: timeframe_col(row, 1)?,
                    date: timestamp_col(row, 2)?,
                    initial_capital: row.get(3)?,
                    final_capital: row.get(4)?,
                    total_return: row.get(5)?,
                    total_trades: row.get::<_, i64>(6)? as usize,
                    winning_trades: row.get::<_, i64>(7)? as usize,
                    losing_trades: row.get::<_, i64>(8)? as usize,
                    win_rate: row.get(9)?,
                    max_drawdown: row.get(10)?,
                })
            })
            .map_err(query_err)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row.map_err(query_err)?);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            timestamp: ts(day),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        }
    }

    fn setup() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn record(day: u32, signal: Signal) -> SignalRecord {
        SignalRecord {
            symbol: "BTC".into(),
            timeframe: Timeframe::D1,
            date: ts(day).date(),
            signal,
            price: 42.0,
            current_price: 43.0,
            timestamp: ts(day),
        }
    }

    #[test]
    fn initialize_schema_is_idempotent() {
        let adapter = setup();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn stored_bars_round_trip_in_order() {
        let adapter = setup();
        adapter
            .insert_bars("BTC", Timeframe::D1, &[bar(3, 12.0), bar(1, 10.0), bar(2, 11.0)])
            .unwrap();

        let series = adapter.get_series("BTC", Timeframe::D1, 6, false).unwrap();
        assert_eq!(series.closes(), vec![10.0, 11.0, 12.0]);
        assert_eq!(series.bars()[0], bar(1, 10.0));

        let other = adapter.get_series("BTC", Timeframe::W1, 6, false).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn missing_value_stored_as_null() {
        let adapter = setup();
        let mut first = bar(1, 10.0);
        first.volume = f64::NAN;
        first.open = f64::NAN;
        let mut second = bar(2, 11.0);
        second.volume = f64::NAN;
        adapter.insert_bars("ETH", Timeframe::H12, &[first, second]).unwrap();

        let series = adapter.get_series("ETH", Timeframe::H12, 6, false).unwrap();
        assert!(series.bars()[0].open.is_nan());
        assert_eq!(series.missing_field(), Some("volume"));
    }

    #[test]
    fn signal_append_ignores_duplicates() {
        let adapter = setup();
        assert!(SignalLogPort::append(&adapter, &record(5, Signal::Bullish)).unwrap());
        assert!(!SignalLogPort::append(&adapter, &record(5, Signal::Bullish)).unwrap());
        assert!(SignalLogPort::append(&adapter, &record(5, Signal::Bearish)).unwrap());

        let records = SignalLogPort::load_all(&adapter).unwrap();
        assert_eq!(records, vec![record(5, Signal::Bullish), record(5, Signal::Bearish)]);
    }

    #[test]
    fn backtest_summaries_round_trip() {
        let adapter = setup();
        let summary = BacktestSummary {
            ticker: "SOL".into(),
            timeframe: Timeframe::W1,
            date: ts(9),
            initial_capital: 10_000.0,
            final_capital: 10_285.71,
            total_return: 2.8571,
            total_trades: 1,
            winning_trades: 1,
            losing_trades: 0,
            win_rate: 100.0,
            max_drawdown: 0.0,
        };
        BacktestResultsPort::append(&adapter, &summary).unwrap();
        assert_eq!(BacktestResultsPort::load_all(&adapter).unwrap(), vec![summary]);
    }

    #[test]
    fn from_config_opens_file_database() {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig {
            backend: crate::domain::config::StorageBackend::Sqlite,
            data_dir: PathBuf::from("data"),
            signals_file: "signals.csv".into(),
            backtest_file: "backtest_results.csv".into(),
            sqlite_path: Some(dir.path().join("zlma.db").display().to_string()),
            sqlite_pool_size: 2,
        };
        let adapter = SqliteAdapter::from_config(&storage).unwrap();
        adapter.initialize_schema().unwrap();
        assert!(SignalLogPort::load_all(&adapter).unwrap().is_empty());
    }

    #[test]
    fn from_config_requires_path() {
        let storage = StorageConfig {
            backend: crate::domain::config::StorageBackend::Sqlite,
            data_dir: PathBuf::from("data"),
            signals_file: "signals.csv".into(),
            backtest_file: "backtest_results.csv".into(),
            sqlite_path: None,
            sqlite_pool_size: 1,
        };
        assert!(matches!(
            SqliteAdapter::from_config(&storage),
            Err(ZlmaError::ConfigMissing { .. })
        ));
    }
}
