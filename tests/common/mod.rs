#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Mutex;
use zlmatrader::domain::backtest::BacktestSummary;
use zlmatrader::domain::error::ZlmaError;
pub use zlmatrader::domain::ohlcv::{PriceBar, PriceSeries, Timeframe};
use zlmatrader::domain::signal::SignalRecord;
use zlmatrader::ports::price_port::PricePort;
use zlmatrader::ports::results_port::BacktestResultsPort;
use zlmatrader::ports::signal_log_port::SignalLogPort;

pub struct MockPricePort {
    pub data: HashMap<(String, Timeframe), Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
    pub absent: HashMap<String, Vec<&'static str>>,
}

impl MockPricePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            absent: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, timeframe: Timeframe, bars: Vec<PriceBar>) -> Self {
        self.data.insert((symbol.to_string(), timeframe), bars);
        self
    }

    /// Serves `symbol` as if its source had no `column` at all.
    pub fn without_column(mut self, symbol: &str, column: &'static str) -> Self {
        self.absent
            .entry(symbol.to_string())
            .or_default()
            .push(column);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl PricePort for MockPricePort {
    fn get_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _lookback_months: u32,
        _force_refresh: bool,
    ) -> Result<PriceSeries, ZlmaError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(ZlmaError::Storage {
                reason: reason.clone(),
            });
        }
        let bars = self
            .data
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default();
        let absent = self.absent.get(symbol).cloned().unwrap_or_default();
        Ok(PriceSeries::new(bars)?.with_absent_columns(&absent))
    }
}

/// Signal log held in memory, deduplicating on the record key.
#[derive(Default)]
pub struct MemorySignalLog {
    pub records: Mutex<Vec<SignalRecord>>,
}

impl MemorySignalLog {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl SignalLogPort for MemorySignalLog {
    fn append(&self, record: &SignalRecord) -> Result<bool, ZlmaError> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.same_key(record)) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    fn load_all(&self) -> Result<Vec<SignalRecord>, ZlmaError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Signal log whose storage is unreachable.
pub struct FailingSignalLog;

impl SignalLogPort for FailingSignalLog {
    fn append(&self, _record: &SignalRecord) -> Result<bool, ZlmaError> {
        Err(ZlmaError::Storage {
            reason: "disk full".into(),
        })
    }

    fn load_all(&self) -> Result<Vec<SignalRecord>, ZlmaError> {
        Err(ZlmaError::Storage {
            reason: "disk full".into(),
        })
    }
}

#[derive(Default)]
pub struct MemoryResults {
    pub rows: Mutex<Vec<BacktestSummary>>,
}

impl BacktestResultsPort for MemoryResults {
    fn append(&self, summary: &BacktestSummary) -> Result<(), ZlmaError> {
        self.rows.lock().unwrap().push(summary.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<BacktestSummary>, ZlmaError> {
        Ok(self.rows.lock().unwrap().clone())
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn day(i: usize) -> NaiveDateTime {
    date("2024-01-01").and_hms_opt(0, 0, 0).unwrap() + Duration::days(i as i64)
}

pub fn make_bar(timestamp: NaiveDateTime, close: f64) -> PriceBar {
    PriceBar {
        timestamp,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 10_000.0,
    }
}

/// One daily bar per close, starting 2024-01-01.
pub fn generate_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(day(i), c))
        .collect()
}

/// Falls, then recovers: one bullish crossover near the turn.
pub fn v_shape() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..30).map(|i| 200.0 - 3.0 * i as f64).collect();
    closes.extend((0..30).map(|i| 113.0 + 3.0 * i as f64));
    closes
}

/// Down, up, down: bullish then bearish crossover.
pub fn zigzag() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..25).map(|i| 200.0 - 4.0 * i as f64).collect();
    closes.extend((0..25).map(|i| 104.0 + 4.0 * i as f64));
    closes.extend((0..25).map(|i| 200.0 - 4.0 * i as f64));
    closes
}
