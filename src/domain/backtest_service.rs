//! Backtest orchestration: fetch, derive signals, simulate, persist the summary.

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::domain::backtest::{
    self, BacktestConfig, BacktestResult, BacktestSummary, signals_from_rows,
};
use crate::domain::error::ZlmaError;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::ohlcv::Timeframe;
use crate::ports::price_port::PricePort;
use crate::ports::results_port::BacktestResultsPort;

pub struct BacktestService {
    prices: Arc<dyn PricePort>,
    results: Arc<dyn BacktestResultsPort>,
    engine: IndicatorEngine,
    config: BacktestConfig,
    lookback_months: u32,
}

impl BacktestService {
    pub fn new(
        prices: Arc<dyn PricePort>,
        results: Arc<dyn BacktestResultsPort>,
        engine: IndicatorEngine,
        config: BacktestConfig,
        lookback_months: u32,
    ) -> Self {
        Self {
            prices,
            results,
            engine,
            config,
            lookback_months,
        }
    }

    /// Backtests `symbol` over bars dated within `[start, end]`.
    ///
    /// `NoData` when the source has nothing for the range; an `Ok` result
    /// with zero trades means data was present but no crossover fired.
    pub fn run_backtest(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<BacktestResult, ZlmaError> {
        log::info!("starting backtest for {symbol} on {timeframe}");

        let no_data = || ZlmaError::NoData {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
        };

        let series = self
            .prices
            .get_series(symbol, timeframe, self.lookback_months, false)?;
        if series.is_empty() {
            log::warn!("no data for {symbol} on {timeframe}");
            return Err(no_data());
        }
        if let Some(field) = series.missing_field() {
            log::error!("missing column {field} in data for {symbol}");
            return Err(ZlmaError::MissingField { field });
        }

        let series = series.between(start, end);
        if series.is_empty() {
            log::warn!("no data for {symbol} on {timeframe} in the requested range");
            return Err(no_data());
        }

        let rows = self.engine.add_indicators(&series)?;
        let signals = signals_from_rows(&rows);

        let result = backtest::simulate(&series, &signals, &self.config).inspect_err(|e| {
            log::error!("backtest for {symbol} on {timeframe} aborted: {e}");
        })?;

        let summary =
            BacktestSummary::from_result(symbol, timeframe, Local::now().naive_local(), &result);
        if let Err(e) = self.results.append(&summary) {
            log::error!("failed to save backtest summary for {symbol}: {e}");
        }

        log::info!(
            "backtest finished for {symbol} on {timeframe}: {} trades, {:.2}% return",
            result.stats.total_trades,
            result.total_return
        );
        Ok(result)
    }

    /// Persisted summaries, optionally restricted to one ticker.
    pub fn results(&self, ticker: Option<&str>) -> Result<Vec<BacktestSummary>, ZlmaError> {
        let all = self.results.load_all()?;
        Ok(match ticker {
            Some(t) => all.into_iter().filter(|s| s.ticker == t).collect(),
            None => all,
        })
    }
}
