//! Backtest summary store port trait.

use crate::domain::backtest::BacktestSummary;
use crate::domain::error::ZlmaError;

pub trait BacktestResultsPort: Send + Sync {
    fn append(&self, summary: &BacktestSummary) -> Result<(), ZlmaError>;

    fn load_all(&self) -> Result<Vec<BacktestSummary>, ZlmaError>;
}
