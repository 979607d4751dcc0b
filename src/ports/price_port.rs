//! Price-data source port trait.

use crate::domain::error::ZlmaError;
use crate::domain::ohlcv::{PriceSeries, Timeframe};

pub trait PricePort: Send + Sync {
    /// Bars for `symbol` covering the last `lookback_months`. An unknown
    /// symbol or a timeframe the source cannot serve yields an empty series;
    /// `Err` is reserved for I/O or storage failures.
    fn get_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_months: u32,
        force_refresh: bool,
    ) -> Result<PriceSeries, ZlmaError>;
}
