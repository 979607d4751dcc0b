//! Signal detection over a price source, with a deduplicated signal log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDate};

use crate::domain::error::ZlmaError;
use crate::domain::indicator::{IndicatorEngine, Signal};
use crate::domain::ohlcv::Timeframe;
use crate::domain::signal::{
    self, DetectOptions, Detection, LastSignal, SignalRecord, SignalReport, SignalsSummary,
};
use crate::ports::price_port::PricePort;
use crate::ports::signal_log_port::SignalLogPort;

type KeyLock = Arc<Mutex<()>>;

pub struct SignalService {
    prices: Arc<dyn PricePort>,
    log: Arc<dyn SignalLogPort>,
    engine: IndicatorEngine,
    key_locks: Mutex<HashMap<(String, Timeframe), KeyLock>>,
}

impl SignalService {
    pub fn new(
        prices: Arc<dyn PricePort>,
        log: Arc<dyn SignalLogPort>,
        engine: IndicatorEngine,
    ) -> Self {
        Self {
            prices,
            log,
            engine,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn detect_signals(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        options: DetectOptions,
    ) -> Result<Detection, ZlmaError> {
        let series = self.prices.get_series(
            symbol,
            timeframe,
            options.lookback_months,
            options.force_refresh,
        )?;

        let Some(last_bar) = series.last() else {
            log::warn!("no data for {symbol} ({timeframe}), cannot detect signals");
            return Ok(Detection::NoData {
                symbol: symbol.to_string(),
                timeframe,
            });
        };
        let last_price = last_bar.close;

        let rows = match self.engine.add_indicators(&series) {
            Ok(rows) => rows,
            Err(e @ ZlmaError::MissingField { .. }) => {
                log::warn!("{symbol} ({timeframe}): {e}, falling back to raw series");
                return Ok(Detection::RawOnly {
                    symbol: symbol.to_string(),
                    timeframe,
                    last_price,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let all_signals = signal::all_signals(&rows);
        let Some(last_signal) = signal::last_signal(&rows) else {
            return Ok(Detection::NoData {
                symbol: symbol.to_string(),
                timeframe,
            });
        };

        if options.save_signals {
            if let Err(e) = self.save_signal(symbol, timeframe, &last_signal, last_price) {
                log::error!("failed to save signal for {symbol} ({timeframe}): {e}");
            }
        }

        let bullish_count = all_signals
            .iter()
            .filter(|s| s.signal == Signal::Bullish)
            .count();
        let bearish_count = all_signals.len() - bullish_count;

        log::info!(
            "{symbol} ({timeframe}): {} signals, last {} at {}",
            all_signals.len(),
            last_signal.signal.label(),
            last_signal.timestamp
        );

        Ok(Detection::Detected(SignalReport {
            symbol: symbol.to_string(),
            timeframe,
            last_update: Local::now().naive_local(),
            last_signal,
            last_price,
            all_signals,
            bullish_count,
            bearish_count,
        }))
    }

    /// Runs detection per symbol; one symbol failing does not stop the rest.
    pub fn detect_signals_for_multiple(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        options: DetectOptions,
    ) -> Vec<(String, Result<Detection, ZlmaError>)> {
        symbols
            .iter()
            .map(|symbol| {
                let outcome = self.detect_signals(symbol, timeframe, options);
                if let Err(e) = &outcome {
                    log::error!("signal detection failed for {symbol}: {e}");
                }
                (symbol.clone(), outcome)
            })
            .collect()
    }

    pub fn signals_summary(&self) -> Result<SignalsSummary, ZlmaError> {
        let records = self.log.load_all()?;
        Ok(SignalsSummary::from_records(&records))
    }

    pub fn active_signals(
        &self,
        timeframe: Timeframe,
        today: NaiveDate,
    ) -> Result<Vec<SignalRecord>, ZlmaError> {
        let records = self.log.load_all()?;
        Ok(signal::active_signals(&records, timeframe, today))
    }

    /// Appends a crossover to the log unless the same key is already present.
    /// The check and the append run under a per-(symbol, timeframe) lock.
    fn save_signal(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        last: &LastSignal,
        current_price: f64,
    ) -> Result<bool, ZlmaError> {
        if !last.signal.is_crossover() {
            return Ok(false);
        }

        let record = SignalRecord {
            symbol: symbol.to_string(),
            timeframe,
            date: last.timestamp.date(),
            signal: last.signal,
            price: last.price,
            current_price,
            timestamp: Local::now().naive_local(),
        };

        let lock = self.key_lock(symbol, timeframe);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.log.load_all()?.iter().any(|r| r.same_key(&record)) {
            log::info!(
                "signal already logged for {symbol} ({timeframe}) on {}",
                record.date
            );
            return Ok(false);
        }

        let written = self.log.append(&record)?;
        if written {
            log::info!(
                "{} signal logged for {symbol} ({timeframe}) on {}",
                record.signal.label(),
                record.date
            );
        }
        Ok(written)
    }

    fn key_lock(&self, symbol: &str, timeframe: Timeframe) -> KeyLock {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry((symbol.to_string(), timeframe))
            .or_default()
            .clone()
    }
}
