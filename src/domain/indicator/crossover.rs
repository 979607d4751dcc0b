//! ZLMA/EMA crossover and trend classification.

use super::{Signal, Trend};

/// Bar 0 is always neutral. A bar fires only when it is strictly on the new
/// side and the previous bar was on or across the old side, so exact equality
/// at `i` never fires. `NaN` on either side compares false and stays neutral.
pub fn classify_signals(ema: &[f64], zlma: &[f64]) -> Vec<Signal> {
    let n = ema.len().min(zlma.len());
    (0..n)
        .map(|i| {
            if i == 0 {
                return Signal::Neutral;
            }
            let (e, z) = (ema[i], zlma[i]);
            let (pe, pz) = (ema[i - 1], zlma[i - 1]);
            if z > e && pz <= pe {
                Signal::Bullish
            } else if z < e && pz >= pe {
                Signal::Bearish
            } else {
                Signal::Neutral
            }
        })
        .collect()
}

pub fn classify_trend(ema: &[f64], zlma: &[f64]) -> Vec<Trend> {
    ema.iter()
        .zip(zlma)
        .map(|(&e, &z)| {
            if z > e {
                Trend::Up
            } else if z < e {
                Trend::Down
            } else {
                Trend::Flat
            }
        })
        .collect()
}
