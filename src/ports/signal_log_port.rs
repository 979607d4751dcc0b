//! Signal log store port trait.

use crate::domain::error::ZlmaError;
use crate::domain::signal::SignalRecord;

pub trait SignalLogPort: Send + Sync {
    /// Appends unless a record with the same (symbol, timeframe, date, signal)
    /// already exists. Returns whether a row was written.
    fn append(&self, record: &SignalRecord) -> Result<bool, ZlmaError>;

    /// Every record, in insertion order.
    fn load_all(&self) -> Result<Vec<SignalRecord>, ZlmaError>;
}
