//! CSV file price adapter.
//!
//! Reads `<SYMBOL>_<timeframe>.csv` from a base directory. Columns are found
//! by header name. An empty cell becomes `NaN`; a column missing from the
//! header is reported on the series as absent.

use crate::domain::error::ZlmaError;
use crate::domain::ohlcv::{PriceBar, PriceSeries, Timeframe, parse_timestamp};
use crate::ports::price_port::PricePort;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

struct Columns {
    timestamp: usize,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ZlmaError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let timestamp = find(&["timestamp", "date", "datetime"]).ok_or_else(|| {
            ZlmaError::Storage {
                reason: "missing timestamp column".into(),
            }
        })?;
        Ok(Columns {
            timestamp,
            open: find(&["open"]),
            high: find(&["high"]),
            low: find(&["low"]),
            close: find(&["close"]),
            volume: find(&["volume"]),
        })
    }

    fn absent(&self) -> Vec<&'static str> {
        [self.open, self.high, self.low, self.close, self.volume]
            .into_iter()
            .zip(PriceBar::FIELDS)
            .filter(|(idx, _)| idx.is_none())
            .map(|(_, name)| name)
            .collect()
    }
}

fn field(record: &csv::StringRecord, idx: Option<usize>, name: &str) -> Result<f64, ZlmaError> {
    let raw = idx.and_then(|i| record.get(i)).map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse().map_err(|e| ZlmaError::Storage {
        reason: format!("invalid {} value {:?}: {}", name, raw, e),
    })
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }

    fn read_series(&self, path: &Path) -> Result<PriceSeries, ZlmaError> {
        let content = fs::read_to_string(path).map_err(|e| ZlmaError::Storage {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr.headers().map_err(|e| ZlmaError::Storage {
            reason: format!("CSV header error: {}", e),
        })?;
        let cols = Columns::from_headers(headers)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| ZlmaError::Storage {
                reason: format!("CSV parse error: {}", e),
            })?;

            let ts_str = record.get(cols.timestamp).unwrap_or("").trim();
            let timestamp = parse_timestamp(ts_str).ok_or_else(|| ZlmaError::Storage {
                reason: format!("invalid timestamp {:?}", ts_str),
            })?;

            bars.push(PriceBar {
                timestamp,
                open: field(&record, cols.open, "open")?,
                high: field(&record, cols.high, "high")?,
                low: field(&record, cols.low, "low")?,
                close: field(&record, cols.close, "close")?,
                volume: field(&record, cols.volume, "volume")?,
            });
        }

        let absent = cols.absent();
        if !absent.is_empty() {
            log::warn!("{} has no {} column", path.display(), absent.join(", "));
        }
        Ok(PriceSeries::from_unsorted(bars)?.with_absent_columns(&absent))
    }
}

impl PricePort for CsvPriceAdapter {
    fn get_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_months: u32,
        _force_refresh: bool,
    ) -> Result<PriceSeries, ZlmaError> {
        let path = self.csv_path(symbol, timeframe);
        if !path.exists() {
            log::error!("no price file for {} ({}) at {}", symbol, timeframe, path.display());
            return Ok(PriceSeries::empty());
        }

        let series = self.read_series(&path)?;
        log::debug!(
            "read {} bars for {} ({}) from {}",
            series.len(),
            symbol,
            timeframe,
            path.display()
        );
        Ok(series.lookback(lookback_months))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "timestamp,open,high,low,close,volume\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n";
        fs::write(path.join("BTCUSDT_1d.csv"), csv_content).unwrap();

        fs::write(
            path.join("ETHUSDT_12h.csv"),
            "timestamp,open,high,low,close\n\
             2024-01-15 00:00:00,1.0,2.0,0.5,1.5\n\
             2024-01-15 12:00:00,1.5,2.5,1.0,\n",
        )
        .unwrap();

        fs::write(
            path.join("OLD_1w.csv"),
            "date,open,high,low,close,volume\n\
             2023-01-02,1,1,1,1,1\n\
             2023-06-05,2,2,2,2,2\n\
             2023-12-25,3,3,3,3,3\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn reads_and_sorts_bars() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);

        let series = adapter.get_series("BTCUSDT", Timeframe::D1, 6, false).unwrap();

        assert_eq!(series.len(), 3);
        let first = &series.bars()[0];
        assert_eq!(first.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 110.0);
        assert_eq!(first.low, 90.0);
        assert_eq!(first.close, 105.0);
        assert_eq!(first.volume, 50000.0);
        assert_eq!(series.closes(), vec![105.0, 110.0, 115.0]);
    }

    #[test]
    fn absent_column_is_missing_and_empty_cell_is_nan() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);

        let series = adapter.get_series("ETHUSDT", Timeframe::H12, 6, false).unwrap();

        assert_eq!(series.len(), 2);
        assert!(series.bars()[0].volume.is_nan());
        assert!(series.bars()[1].close.is_nan());
        assert_eq!(series.missing_field(), Some("volume"));
    }

    #[test]
    fn empty_cell_alone_is_not_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("GAP_1d.csv"),
            "timestamp,open,high,low,close,volume
             2024-01-01,1,1,1,1,
2024-01-02,2,2,2,2,5
",
        )
        .unwrap();
        let adapter = CsvPriceAdapter::new(dir.path().to_path_buf());

        let series = adapter.get_series("GAP", Timeframe::D1, 6, false).unwrap();
        assert!(series.bars()[0].volume.is_nan());
        assert_eq!(series.missing_field(), None);
    }

    #[test]
    fn lookback_measured_from_newest_bar() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);

        let series = adapter.get_series("OLD", Timeframe::W1, 7, false).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![2.0, 3.0]);
    }

    #[test]
    fn missing_file_is_empty_series() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);

        let series = adapter.get_series("XYZ", Timeframe::D1, 6, false).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn malformed_number_is_storage_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("BAD_1d.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-01,1,1,1,abc,1\n",
        )
        .unwrap();
        let adapter = CsvPriceAdapter::new(dir.path().to_path_buf());

        let err = adapter.get_series("BAD", Timeframe::D1, 6, false).unwrap_err();
        assert!(matches!(err, ZlmaError::Storage { .. }));
    }

    #[test]
    fn duplicate_timestamps_are_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("DUP_1d.csv"),
            "timestamp,open,high,low,close,volume\n\
             2024-01-01,1,1,1,1,1\n2024-01-01,2,2,2,2,2\n",
        )
        .unwrap();
        let adapter = CsvPriceAdapter::new(dir.path().to_path_buf());

        let err = adapter.get_series("DUP", Timeframe::D1, 6, false).unwrap_err();
        assert!(matches!(err, ZlmaError::CorruptSeries { .. }));
    }
}
