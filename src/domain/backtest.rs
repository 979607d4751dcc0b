//! Long-only backtest simulation.
//!
//! Two states, FLAT and LONG. FLAT + bullish opens a position sized at a
//! fixed fraction of current capital; LONG + bearish closes it at the bar's
//! close. A position still open after the last bar is closed at that bar's
//! close. Every other signal/state combination is a no-op.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use super::error::ZlmaError;
use super::indicator::{IndicatorRow, Signal};
use super::metrics::TradeStats;
use super::ohlcv::{PriceSeries, Timeframe};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Fraction of current capital committed per entry, in (0, 1].
    pub position_size_pct: f64,
    /// Accepted and validated but not enforced by `simulate`.
    pub stop_loss_pct: f64,
    /// Accepted and validated but not enforced by `simulate`.
    pub take_profit_pct: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_size_pct: 0.1,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Signal,
    EndOfSeries,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub units: f64,
    pub direction: Direction,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    /// Capital at entry while open, capital after the exit once closed.
    pub capital_after: f64,
    pub close_reason: Option<CloseReason>,
}

impl Trade {
    fn open(entry_time: NaiveDateTime, entry_price: f64, units: f64, capital: f64) -> Self {
        Trade {
            entry_time,
            entry_price,
            units,
            direction: Direction::Long,
            exit_time: None,
            exit_price: None,
            pnl: None,
            pnl_pct: None,
            capital_after: capital,
            close_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Closes the trade and returns its P&L.
    fn close(
        &mut self,
        exit_time: NaiveDateTime,
        exit_price: f64,
        capital_before: f64,
        reason: CloseReason,
    ) -> f64 {
        debug_assert!(self.is_open(), "trade closed twice");
        let pnl = self.units * (exit_price - self.entry_price);
        self.exit_time = Some(exit_time);
        self.exit_price = Some(exit_price);
        self.pnl = Some(pnl);
        self.pnl_pct = Some(pnl / (self.units * self.entry_price) * 100.0);
        self.capital_after = capital_before + pnl;
        self.close_reason = Some(reason);
        pnl
    }
}

/// A signal value pinned to a bar timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSignal {
    pub timestamp: NaiveDateTime,
    pub signal: Signal,
}

impl From<&IndicatorRow> for TimedSignal {
    fn from(row: &IndicatorRow) -> Self {
        TimedSignal {
            timestamp: row.timestamp,
            signal: row.signal,
        }
    }
}

pub fn signals_from_rows(rows: &[IndicatorRow]) -> Vec<TimedSignal> {
    rows.iter().map(TimedSignal::from).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub final_capital: f64,
    /// Percent.
    pub total_return: f64,
    pub stats: TradeStats,
    pub trades: Vec<Trade>,
}

impl BacktestResult {
    fn flat(initial_capital: f64) -> Self {
        BacktestResult {
            initial_capital,
            final_capital: initial_capital,
            total_return: 0.0,
            stats: TradeStats::default(),
            trades: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionState {
    Flat,
    Long,
}

fn validate_config(config: &BacktestConfig) -> Result<(), ZlmaError> {
    if !(config.initial_capital > 0.0 && config.initial_capital.is_finite()) {
        return Err(ZlmaError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    if !(config.position_size_pct > 0.0 && config.position_size_pct <= 1.0) {
        return Err(ZlmaError::invalid(
            "backtest",
            "position_size_pct",
            "position_size_pct must be in (0, 1]",
        ));
    }
    Ok(())
}

/// Runs the FLAT/LONG state machine over `series`.
///
/// Signals are joined to bars by timestamp; bars without a signal are
/// neutral and signals on timestamps absent from the series are ignored.
/// A bar whose close is unusable aborts the whole run, so a result is never
/// built from a partial trade list.
pub fn simulate(
    series: &PriceSeries,
    signals: &[TimedSignal],
    config: &BacktestConfig,
) -> Result<BacktestResult, ZlmaError> {
    validate_config(config)?;

    if series.is_empty() || signals.is_empty() {
        log::debug!("empty price or signal stream, nothing to simulate");
        return Ok(BacktestResult::flat(config.initial_capital));
    }

    let by_time: HashMap<NaiveDateTime, Signal> =
        signals.iter().map(|s| (s.timestamp, s.signal)).collect();

    let mut capital = config.initial_capital;
    let mut state = PositionState::Flat;
    let mut trades: Vec<Trade> = Vec::new();

    for bar in series.bars() {
        let price = bar.close;
        if !price.is_finite() || price < 0.0 {
            return Err(ZlmaError::Simulation {
                at: bar.timestamp,
                reason: format!("unusable close price {price}"),
            });
        }
        let signal = by_time
            .get(&bar.timestamp)
            .copied()
            .unwrap_or(Signal::Neutral);

        match (state, signal) {
            (PositionState::Flat, Signal::Bullish) => {
                if price == 0.0 {
                    return Err(ZlmaError::Simulation {
                        at: bar.timestamp,
                        reason: "cannot size a position at a zero price".into(),
                    });
                }
                let units = capital * config.position_size_pct / price;
                log::debug!("open long at {} price {price:.4} units {units:.6}", bar.timestamp);
                trades.push(Trade::open(bar.timestamp, price, units, capital));
                state = PositionState::Long;
            }
            (PositionState::Long, Signal::Bearish) => {
                let trade = open_trade(&mut trades, bar.timestamp)?;
                let pnl = trade.close(bar.timestamp, price, capital, CloseReason::Signal);
                capital += pnl;
                log::debug!("close long at {} price {price:.4} pnl {pnl:.4}", bar.timestamp);
                state = PositionState::Flat;
            }
            _ => {}
        }
    }

    if state == PositionState::Long {
        if let Some(last) = series.last() {
            let trade = open_trade(&mut trades, last.timestamp)?;
            let pnl = trade.close(last.timestamp, last.close, capital, CloseReason::EndOfSeries);
            capital += pnl;
            log::debug!("forced close at {} pnl {pnl:.4}", last.timestamp);
        }
    }

    let stats = TradeStats::compute(config.initial_capital, &trades);
    Ok(BacktestResult {
        initial_capital: config.initial_capital,
        final_capital: capital,
        total_return: (capital / config.initial_capital - 1.0) * 100.0,
        stats,
        trades,
    })
}

fn open_trade(trades: &mut [Trade], at: NaiveDateTime) -> Result<&mut Trade, ZlmaError> {
    trades
        .last_mut()
        .filter(|t| t.is_open())
        .ok_or_else(|| ZlmaError::Simulation {
            at,
            reason: "LONG state without an open trade".into(),
        })
}

/// Persisted summary row of one backtest run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSummary {
    pub ticker: String,
    pub timeframe: Timeframe,
    pub date: NaiveDateTime,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub max_drawdown: f64,
}

impl BacktestSummary {
    pub fn from_result(
        ticker: &str,
        timeframe: Timeframe,
        date: NaiveDateTime,
        result: &BacktestResult,
    ) -> Self {
        BacktestSummary {
            ticker: ticker.to_string(),
            timeframe,
            date,
            initial_capital: result.initial_capital,
            final_capital: result.final_capital,
            total_return: result.total_return,
            total_trades: result.stats.total_trades,
            winning_trades: result.stats.winning_trades,
            losing_trades: result.stats.losing_trades,
            win_rate: result.stats.win_rate,
            max_drawdown: result.stats.max_drawdown,
        }
    }
}
