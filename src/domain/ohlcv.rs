//! OHLCV bars, price series and timeframes.

use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate, NaiveDateTime};

use super::error::ZlmaError;

/// One OHLCV bar. A blank cell in the source holds `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub const FIELDS: [&'static str; 5] = ["open", "high", "low", "close", "volume"];

    fn values(&self) -> [f64; 5] {
        [self.open, self.high, self.low, self.close, self.volume]
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Ordered bars with strictly increasing timestamps.
///
/// `absent` lists OHLCV columns the source does not carry at all; their
/// values are `NaN` on every bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
    absent: Vec<&'static str>,
}

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, ZlmaError> {
        if let Some(w) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(ZlmaError::CorruptSeries {
                reason: format!(
                    "timestamp {} does not follow {}",
                    w[1].timestamp, w[0].timestamp
                ),
            });
        }
        Ok(Self {
            bars,
            absent: Vec::new(),
        })
    }

    /// Marks columns the source lacks. Names outside `PriceBar::FIELDS` are ignored.
    pub fn with_absent_columns(mut self, columns: &[&str]) -> Self {
        self.absent = PriceBar::FIELDS
            .into_iter()
            .filter(|f| columns.contains(f))
            .collect();
        self
    }

    /// Columns that are `NaN` on every bar of a non-empty slice.
    pub fn blank_columns(bars: &[PriceBar]) -> Vec<&'static str> {
        if bars.is_empty() {
            return Vec::new();
        }
        PriceBar::FIELDS
            .into_iter()
            .enumerate()
            .filter(|(i, _)| bars.iter().all(|b| b.values()[*i].is_nan()))
            .map(|(_, name)| name)
            .collect()
    }

    /// Sorts by timestamp first; duplicate timestamps are still rejected.
    pub fn from_unsorted(mut bars: Vec<PriceBar>) -> Result<Self, ZlmaError> {
        bars.sort_by_key(|b| b.timestamp);
        Self::new(bars)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// First required column the source does not carry, in OHLCV order.
    pub fn missing_field(&self) -> Option<&'static str> {
        self.absent.first().copied()
    }

    /// Keeps bars whose date lies within `[start, end]`; `None` leaves a side open.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceSeries {
        let bars = self
            .bars
            .iter()
            .filter(|b| start.is_none_or(|s| b.date() >= s))
            .filter(|b| end.is_none_or(|e| b.date() <= e))
            .cloned()
            .collect();
        PriceSeries {
            bars,
            absent: self.absent.clone(),
        }
    }

    /// Keeps the last `months` calendar months, measured back from the newest bar.
    pub fn lookback(&self, months: u32) -> PriceSeries {
        let Some(last) = self.bars.last() else {
            return PriceSeries::empty();
        };
        let Some(cutoff) = last.timestamp.checked_sub_months(Months::new(months)) else {
            return self.clone();
        };
        let bars = self
            .bars
            .iter()
            .filter(|b| b.timestamp >= cutoff)
            .cloned()
            .collect();
        PriceSeries {
            bars,
            absent: self.absent.clone(),
        }
    }
}

/// Bar interval supported by the price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    H12,
    D1,
    W1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::H12, Timeframe::D1, Timeframe::W1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ZlmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "12h" => Ok(Timeframe::H12),
            "1d" => Ok(Timeframe::D1),
            "1w" => Ok(Timeframe::W1),
            other => Err(ZlmaError::UnsupportedTimeframe {
                value: other.to_string(),
            }),
        }
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare date (midnight).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn new_accepts_increasing_timestamps() {
        let series = PriceSeries::new(vec![bar(1, 10.0), bar(2, 11.0), bar(3, 12.0)]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn new_rejects_duplicate_timestamp() {
        let err = PriceSeries::new(vec![bar(1, 10.0), bar(1, 11.0)]).unwrap_err();
        assert!(matches!(err, ZlmaError::CorruptSeries { .. }));
    }

    #[test]
    fn new_rejects_decreasing_timestamp() {
        assert!(PriceSeries::new(vec![bar(2, 10.0), bar(1, 11.0)]).is_err());
    }

    #[test]
    fn from_unsorted_sorts() {
        let series = PriceSeries::from_unsorted(vec![bar(3, 3.0), bar(1, 1.0), bar(2, 2.0)]).unwrap();
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn missing_field_comes_from_absent_columns_only() {
        let mut bars = vec![bar(1, 10.0), bar(2, 11.0)];
        bars[1].volume = f64::NAN;
        let series = PriceSeries::new(bars).unwrap();
        assert_eq!(series.missing_field(), None);

        let series = series.with_absent_columns(&["volume", "high", "adj_close"]);
        assert_eq!(series.missing_field(), Some("high"));
        assert_eq!(series.between(None, None).missing_field(), Some("high"));
        assert_eq!(series.lookback(1).missing_field(), Some("high"));
    }

    #[test]
    fn blank_columns_need_every_bar_blank() {
        let mut bars = vec![bar(1, 10.0), bar(2, 11.0)];
        bars[0].open = f64::NAN;
        bars[0].volume = f64::NAN;
        bars[1].volume = f64::NAN;
        assert_eq!(PriceSeries::blank_columns(&bars), vec!["volume"]);
        assert!(PriceSeries::blank_columns(&[]).is_empty());
    }

    #[test]
    fn between_is_inclusive() {
        let series = PriceSeries::new((1..=5).map(|d| bar(d, d as f64)).collect()).unwrap();
        let cut = series.between(
            NaiveDate::from_ymd_opt(2024, 1, 2),
            NaiveDate::from_ymd_opt(2024, 1, 4),
        );
        assert_eq!(cut.closes(), vec![2.0, 3.0, 4.0]);
        assert_eq!(series.between(None, None).len(), 5);
    }

    #[test]
    fn lookback_measures_from_newest_bar() {
        let bars = vec![
            PriceBar {
                timestamp: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                ..bar(1, 1.0)
            },
            PriceBar {
                timestamp: NaiveDate::from_ymd_opt(2023, 9, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                ..bar(1, 2.0)
            },
            PriceBar {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                ..bar(1, 3.0)
            },
        ];
        let series = PriceSeries::new(bars).unwrap();
        assert_eq!(series.lookback(6).closes(), vec![2.0, 3.0]);
        assert!(PriceSeries::empty().lookback(6).is_empty());
    }

    #[test]
    fn timeframe_round_trips_through_str() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("4h".parse::<Timeframe>().is_err());
        assert_eq!(" 1D ".parse::<Timeframe>().unwrap(), Timeframe::D1);
    }

    #[test]
    fn parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-15").is_some());
        assert!(parse_timestamp("2024-01-15 12:00:00").is_some());
        assert!(parse_timestamp("2024-01-15T12:00:00").is_some());
        assert!(parse_timestamp("15/01/2024").is_none());
    }
}
