//! Trend-following indicators: EMA, ZLMA and their crossover classification.
//!
//! - `Signal`: crossover event on a bar (bullish, bearish or none)
//! - `Trend`: relative position of ZLMA against EMA on a bar
//! - `IndicatorRow`: per-bar derived record
//! - `IndicatorEngine`: computes the full row sequence for a series

pub mod crossover;
pub mod ema;
pub mod zlma;

use chrono::NaiveDateTime;

use crate::domain::error::ZlmaError;
use crate::domain::ohlcv::PriceSeries;

pub const DEFAULT_EMA_PERIOD: usize = 15;
pub const DEFAULT_ZLMA_PERIOD: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    Bearish,
    Neutral,
    Bullish,
}

impl Signal {
    pub fn value(self) -> i8 {
        match self {
            Signal::Bearish => -1,
            Signal::Neutral => 0,
            Signal::Bullish => 1,
        }
    }

    pub fn from_value(value: i64) -> Option<Signal> {
        match value {
            -1 => Some(Signal::Bearish),
            0 => Some(Signal::Neutral),
            1 => Some(Signal::Bullish),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Signal::Bearish => "Bearish",
            Signal::Neutral => "Neutral",
            Signal::Bullish => "Bullish",
        }
    }

    pub fn is_crossover(self) -> bool {
        self != Signal::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trend {
    Down,
    Flat,
    Up,
}

impl Trend {
    pub fn value(self) -> i8 {
        match self {
            Trend::Down => -1,
            Trend::Flat => 0,
            Trend::Up => 1,
        }
    }
}

/// Derived record for one bar. `ema`/`zlma` hold `NaN` when their column failed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub ema: f64,
    pub zlma: f64,
    pub signal: Signal,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorEngine {
    pub ema_period: usize,
    pub zlma_period: usize,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self {
            ema_period: DEFAULT_EMA_PERIOD,
            zlma_period: DEFAULT_ZLMA_PERIOD,
        }
    }
}

impl IndicatorEngine {
    pub fn new(ema_period: usize, zlma_period: usize) -> Self {
        log::debug!("indicator engine: EMA={ema_period}, ZLMA={zlma_period}");
        Self {
            ema_period,
            zlma_period,
        }
    }

    /// Computes one row per bar.
    ///
    /// Returns `MissingField` without computing anything if the source lacks
    /// an OHLCV column; the caller keeps its raw series. Blank cells are data.
    /// A failure inside the EMA or ZLMA column is logged and that column is
    /// filled with `NaN`, the remaining columns are still derived.
    pub fn add_indicators(&self, series: &PriceSeries) -> Result<Vec<IndicatorRow>, ZlmaError> {
        if let Some(field) = series.missing_field() {
            log::warn!("missing column {field}, indicators not computed");
            return Err(ZlmaError::MissingField { field });
        }

        let closes = series.closes();
        let n = closes.len();
        log::debug!("computing indicators for {n} bars");

        let ema = ema::moving_average(&closes, self.ema_period).unwrap_or_else(|e| {
            log::error!("{e}");
            vec![f64::NAN; n]
        });
        let zlma = zlma::zero_lag_average(&closes, self.zlma_period).unwrap_or_else(|e| {
            log::error!("{e}");
            vec![f64::NAN; n]
        });

        let signals = crossover::classify_signals(&ema, &zlma);
        let trends = crossover::classify_trend(&ema, &zlma);

        let rows = series
            .bars()
            .iter()
            .enumerate()
            .map(|(i, bar)| IndicatorRow {
                timestamp: bar.timestamp,
                close: bar.close,
                ema: ema[i],
                zlma: zlma[i],
                signal: signals[i],
                trend: trends[i],
            })
            .collect();

        Ok(rows)
    }
}
