//! CSV-backed signal log and backtest summary store.

use crate::domain::backtest::BacktestSummary;
use crate::domain::error::ZlmaError;
use crate::domain::indicator::Signal;
use crate::domain::ohlcv::{Timeframe, parse_timestamp};
use crate::domain::signal::SignalRecord;
use crate::ports::results_port::BacktestResultsPort;
use crate::ports::signal_log_port::SignalLogPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const DATE_FMT: &str = "%Y-%m-%d";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

const SIGNAL_HEADER: [&str; 7] = [
    "symbol",
    "timeframe",
    "date",
    "signal",
    "price",
    "current_price",
    "timestamp",
];

const SUMMARY_HEADER: [&str; 11] = [
    "ticker",
    "timeframe",
    "date",
    "initial_capital",
    "final_capital",
    "total_return",
    "total_trades",
    "winning_trades",
    "losing_trades",
    "win_rate",
    "max_drawdown",
];

fn storage_err(context: &str, e: impl std::fmt::Display) -> ZlmaError {
    ZlmaError::Storage {
        reason: format!("{}: {}", context, e),
    }
}

fn ensure_parent(path: &Path) -> Result<(), ZlmaError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(Into::into),
        _ => Ok(()),
    }
}

/// Column positions looked up by header name, so column order in the file is free.
struct HeaderIndex(HashMap<&'static str, usize>);

impl HeaderIndex {
    fn from_headers(
        headers: &csv::StringRecord,
        expected: &[&'static str],
    ) -> Result<Self, ZlmaError> {
        let mut positions = HashMap::new();
        for &name in expected {
            let idx = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| storage_err("malformed header", format!("missing {} column", name)))?;
            positions.insert(name, idx);
        }
        Ok(HeaderIndex(positions))
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> Result<&'r str, ZlmaError> {
        self.0
            .get(name)
            .and_then(|&idx| record.get(idx))
            .map(str::trim)
            .ok_or_else(|| storage_err("malformed row", format!("missing {} column", name)))
    }

    fn get_f64(&self, record: &csv::StringRecord, name: &str) -> Result<f64, ZlmaError> {
        let raw = self.get(record, name)?;
        raw.parse()
            .map_err(|e| storage_err(&format!("invalid {} value {:?}", name, raw), e))
    }

    fn get_usize(&self, record: &csv::StringRecord, name: &str) -> Result<usize, ZlmaError> {
        let raw = self.get(record, name)?;
        raw.parse()
            .map_err(|e| storage_err(&format!("invalid {} value {:?}", name, raw), e))
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<fs::File>, ZlmaError> {
    csv::Reader::from_path(path)
        .map_err(|e| storage_err(&format!("failed to open {}", path.display()), e))
}

fn header_index(
    rdr: &mut csv::Reader<fs::File>,
    expected: &[&'static str],
) -> Result<HeaderIndex, ZlmaError> {
    let headers = rdr
        .headers()
        .map_err(|e| storage_err("CSV header error", e))?;
    HeaderIndex::from_headers(headers, expected)
}

/// Signal log kept as a CSV file, mirrored in memory.
///
/// `append` is idempotent on (symbol, timeframe, date, signal) and rewrites
/// the whole file while holding the cache lock.
pub struct CsvSignalLog {
    path: PathBuf,
    cache: Mutex<Option<Vec<SignalRecord>>>,
}

impl CsvSignalLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(None),
        }
    }

    fn read_file(&self) -> Result<Vec<SignalRecord>, ZlmaError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = open_reader(&self.path)?;
        let cols = header_index(&mut rdr, &SIGNAL_HEADER)?;

        let mut records = Vec::new();
        for result in rdr.records() {
            let row = result.map_err(|e| storage_err("CSV parse error", e))?;
            let date_str = cols.get(&row, "date")?;
            let ts_str = cols.get(&row, "timestamp")?;
            let signal_raw: i64 = cols
                .get(&row, "signal")?
                .parse()
                .map_err(|e| storage_err("invalid signal value", e))?;

            records.push(SignalRecord {
                symbol: cols.get(&row, "symbol")?.to_string(),
                timeframe: cols.get(&row, "timeframe")?.parse::<Timeframe>()?,
                date: NaiveDate::parse_from_str(date_str, DATE_FMT)
                    .map_err(|e| storage_err(&format!("invalid date {:?}", date_str), e))?,
                signal: Signal::from_value(signal_raw)
                    .ok_or_else(|| storage_err("invalid signal value", signal_raw))?,
                price: cols.get_f64(&row, "price")?,
                current_price: cols.get_f64(&row, "current_price")?,
                timestamp: parse_timestamp(ts_str)
                    .ok_or_else(|| storage_err("invalid timestamp", ts_str))?,
            });
        }
        Ok(records)
    }

    fn write_file(&self, records: &[SignalRecord]) -> Result<(), ZlmaError> {
        ensure_parent(&self.path)?;
        let mut wtr = csv::Writer::from_path(&self.path)
            .map_err(|e| storage_err(&format!("failed to create {}", self.path.display()), e))?;
        wtr.write_record(SIGNAL_HEADER)
            .map_err(|e| storage_err("CSV write error", e))?;
        for r in records {
            wtr.write_record([
                r.symbol.clone(),
                r.timeframe.to_string(),
                r.date.format(DATE_FMT).to_string(),
                r.signal.value().to_string(),
                r.price.to_string(),
                r.current_price.to_string(),
                r.timestamp.format(TIMESTAMP_FMT).to_string(),
            ])
            .map_err(|e| storage_err("CSV write error", e))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl SignalLogPort for CsvSignalLog {
    fn append(&self, record: &SignalRecord) -> Result<bool, ZlmaError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.is_none() {
            *cache = Some(self.read_file()?);
        }
        let records = cache.get_or_insert_with(Vec::new);

        if records.iter().any(|r| r.same_key(record)) {
            return Ok(false);
        }

        records.push(record.clone());
        if let Err(e) = self.write_file(records) {
            records.pop();
            return Err(e);
        }
        Ok(true)
    }

    fn load_all(&self) -> Result<Vec<SignalRecord>, ZlmaError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(records) = cache.as_ref() {
            return Ok(records.clone());
        }
        let records = self.read_file()?;
        *cache = Some(records.clone());
        Ok(records)
    }
}

/// Append-only CSV of backtest summary rows.
pub struct CsvResultsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvResultsStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }
}

impl BacktestResultsPort for CsvResultsStore {
    fn append(&self, summary: &BacktestSummary) -> Result<(), ZlmaError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        ensure_parent(&self.path)?;

        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            wtr.write_record(SUMMARY_HEADER)
                .map_err(|e| storage_err("CSV write error", e))?;
        }
        wtr.write_record([
            summary.ticker.clone(),
            summary.timeframe.to_string(),
            summary.date.format(TIMESTAMP_FMT).to_string(),
            summary.initial_capital.to_string(),
            summary.final_capital.to_string(),
            summary.total_return.to_string(),
            summary.total_trades.to_string(),
            summary.winning_trades.to_string(),
            summary.losing_trades.to_string(),
            summary.win_rate.to_string(),
            summary.max_drawdown.to_string(),
        ])
        .map_err(|e| storage_err("CSV write error", e))?;
        wtr.flush()?;

        log::info!("backtest summary for {} saved to {}", summary.ticker, self.path.display());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<BacktestSummary>, ZlmaError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = open_reader(&self.path)?;
        let cols = header_index(&mut rdr, &SUMMARY_HEADER)?;

        let mut summaries = Vec::new();
        for result in rdr.records() {
            let row = result.map_err(|e| storage_err("CSV parse error", e))?;
            let date_str = cols.get(&row, "date")?;
            summaries.push(BacktestSummary {
                ticker: cols.get(&row, "ticker")?.to_string(),
                timeframe: cols.get(&row, "timeframe")?.parse::<Timeframe>()?,
                date: parse_timestamp(date_str)
                    .ok_or_else(|| storage_err("invalid date", date_str))?,
                initial_capital: cols.get_f64(&row, "initial_capital")?,
                final_capital: cols.get_f64(&row, "final_capital")?,
                total_return: cols.get_f64(&row, "total_return")?,
                total_trades: cols.get_usize(&row, "total_trades")?,
                winning_trades: cols.get_usize(&row, "winning_trades")?,
                losing_trades: cols.get_usize(&row, "losing_trades")?,
                win_rate: cols.get_f64(&row, "win_rate")?,
                max_drawdown: cols.get_f64(&row, "max_drawdown")?,
            });
        }
        Ok(summaries)
    }
}
