//! Signal extraction and the persisted signal log record.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::domain::indicator::{IndicatorRow, Signal, Trend};
use crate::domain::ohlcv::Timeframe;

pub const RECENT_SIGNALS_LIMIT: usize = 10;

/// Most recent crossover, or the final bar (neutral) when none ever fired.
#[derive(Debug, Clone, PartialEq)]
pub struct LastSignal {
    pub signal: Signal,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub trend: Trend,
}

/// A crossover bar tagged with its label.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub timestamp: NaiveDateTime,
    pub signal: Signal,
    pub label: &'static str,
    pub price: f64,
    pub ema: f64,
    pub zlma: f64,
    pub trend: Trend,
}

pub fn last_signal(rows: &[IndicatorRow]) -> Option<LastSignal> {
    let row = rows
        .iter()
        .rev()
        .find(|r| r.signal.is_crossover())
        .or_else(|| rows.last())?;
    Some(LastSignal {
        signal: row.signal,
        timestamp: row.timestamp,
        price: row.close,
        trend: row.trend,
    })
}

pub fn all_signals(rows: &[IndicatorRow]) -> Vec<SignalEvent> {
    rows.iter()
        .filter(|r| r.signal.is_crossover())
        .map(|r| SignalEvent {
            timestamp: r.timestamp,
            signal: r.signal,
            label: r.signal.label(),
            price: r.close,
            ema: r.ema,
            zlma: r.zlma,
            trend: r.trend,
        })
        .collect()
}

/// One row of the persisted signal log.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub date: NaiveDate,
    pub signal: Signal,
    pub price: f64,
    pub current_price: f64,
    pub timestamp: NaiveDateTime,
}

impl SignalRecord {
    /// Two records are duplicates when symbol, timeframe, date and value match.
    pub fn same_key(&self, other: &SignalRecord) -> bool {
        self.symbol == other.symbol
            && self.timeframe == other.timeframe
            && self.date == other.date
            && self.signal == other.signal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalReport {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub last_update: NaiveDateTime,
    pub last_signal: LastSignal,
    pub last_price: f64,
    pub all_signals: Vec<SignalEvent>,
    pub bullish_count: usize,
    pub bearish_count: usize,
}

impl SignalReport {
    pub fn signals_count(&self) -> usize {
        self.all_signals.len()
    }
}

/// Outcome of a detection run. The three variants are distinct empty states:
/// no bars at all, bars without derivable indicators, and a full report
/// (which may itself carry zero crossovers).
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    NoData {
        symbol: String,
        timeframe: Timeframe,
    },
    RawOnly {
        symbol: String,
        timeframe: Timeframe,
        last_price: f64,
        reason: String,
    },
    Detected(SignalReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    pub lookback_months: u32,
    pub force_refresh: bool,
    pub save_signals: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            lookback_months: 6,
            force_refresh: false,
            save_signals: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalsSummary {
    pub total: usize,
    pub bullish: usize,
    pub bearish: usize,
    pub latest: Vec<SignalRecord>,
}

impl SignalsSummary {
    pub fn from_records(records: &[SignalRecord]) -> Self {
        let mut sorted: Vec<SignalRecord> = records.to_vec();
        sorted.sort_by(|a, b| b.date.cmp(&a.date).then(b.timestamp.cmp(&a.timestamp)));
        sorted.truncate(RECENT_SIGNALS_LIMIT);

        Self {
            total: records.len(),
            bullish: records.iter().filter(|r| r.signal == Signal::Bullish).count(),
            bearish: records.iter().filter(|r| r.signal == Signal::Bearish).count(),
            latest: sorted,
        }
    }
}

/// Log entries still considered live for `timeframe` as of `today`:
/// daily signals dated today, weekly signals from the past seven days,
/// every entry for other timeframes.
pub fn active_signals(
    records: &[SignalRecord],
    timeframe: Timeframe,
    today: NaiveDate,
) -> Vec<SignalRecord> {
    let cutoff = match timeframe {
        Timeframe::D1 => Some(today),
        Timeframe::W1 => Some(today - Duration::days(7)),
        Timeframe::H12 => None,
    };
    records
        .iter()
        .filter(|r| r.timeframe == timeframe)
        .filter(|r| cutoff.is_none_or(|c| r.date >= c))
        .cloned()
        .collect()
}
