//! Zero-lag moving average.
//!
//! ZLMA = EMA(x + (x - EMA(x))). Smoothing the lag-corrected series twice
//! removes most of the EMA's delay; the price of that is overshoot on sharp
//! reversals, which is expected output and not an error.

use super::ema::moving_average;
use crate::domain::error::ZlmaError;

pub fn zero_lag_average(values: &[f64], period: usize) -> Result<Vec<f64>, ZlmaError> {
    let ema = moving_average(values, period).map_err(as_zlma)?;
    let correction: Vec<f64> = values
        .iter()
        .zip(&ema)
        .map(|(&x, &e)| x + (x - e))
        .collect();
    moving_average(&correction, period).map_err(as_zlma)
}

fn as_zlma(err: ZlmaError) -> ZlmaError {
    match err {
        ZlmaError::Computation { reason, .. } => ZlmaError::Computation {
            indicator: "ZLMA",
            reason,
        },
        other => other,
    }
}
