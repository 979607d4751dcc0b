//! Exponential moving average.
//!
//! k = 2/(n+1), seeded with the first observation (no warm-up window),
//! then EMA[i] = x[i]*k + EMA[i-1]*(1-k). Every output point is valid.

use crate::domain::error::ZlmaError;

pub fn moving_average(values: &[f64], period: usize) -> Result<Vec<f64>, ZlmaError> {
    if period == 0 {
        return Err(ZlmaError::Computation {
            indicator: "EMA",
            reason: "period must be at least 1".into(),
        });
    }

    let k = smoothing_factor(period);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for (i, &x) in values.iter().enumerate() {
        let ema = match prev {
            None => x,
            Some(p) => x * k + p * (1.0 - k),
        };
        if !ema.is_finite() {
            return Err(ZlmaError::Computation {
                indicator: "EMA",
                reason: format!("non-finite value at index {i}"),
            });
        }
        out.push(ema);
        prev = Some(ema);
    }

    Ok(out)
}

pub fn smoothing_factor(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}
