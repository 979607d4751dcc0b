//! Trade statistics derived from a completed backtest.

use super::backtest::Trade;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent, 0 when there are no trades.
    pub win_rate: f64,
    pub loss_rate: f64,
    /// Mean P&L of winners, 0 when there are none.
    pub avg_win: f64,
    /// Mean P&L of losers (negative), 0 when there are none.
    pub avg_loss: f64,
    /// Percent, measured on post-trade capital.
    pub max_drawdown: f64,
}

impl TradeStats {
    pub fn compute(initial_capital: f64, trades: &[Trade]) -> Self {
        let pnls: Vec<f64> = trades.iter().filter_map(|t| t.pnl).collect();

        let wins: Vec<f64> = pnls.iter().copied().filter(|&p| p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|&p| p < 0.0).collect();

        let total_trades = trades.len();
        let (win_rate, loss_rate) = if total_trades > 0 {
            (
                wins.len() as f64 / total_trades as f64 * 100.0,
                losses.len() as f64 / total_trades as f64 * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        TradeStats {
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            loss_rate,
            avg_win: mean(&wins),
            avg_loss: mean(&losses),
            max_drawdown: max_drawdown(initial_capital, trades),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Running peak starts at the initial capital; each trade contributes
/// (peak - capital_after) / peak * 100.
pub fn max_drawdown(initial_capital: f64, trades: &[Trade]) -> f64 {
    let mut peak = initial_capital;
    let mut max_dd = 0.0_f64;

    for trade in trades {
        let capital = trade.capital_after;
        peak = peak.max(capital);
        if peak > 0.0 {
            let dd = (peak - capital) / peak * 100.0;
            max_dd = max_dd.max(dd);
        }
    }

    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{CloseReason, Direction};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_trade(pnl: f64, capital_after: f64) -> Trade {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Trade {
            entry_time: ts,
            entry_price: 100.0,
            units: 10.0,
            direction: Direction::Long,
            exit_time: Some(ts),
            exit_price: Some(100.0 + pnl / 10.0),
            pnl: Some(pnl),
            pnl_pct: Some(pnl / 1000.0 * 100.0),
            capital_after,
            close_reason: Some(CloseReason::Signal),
        }
    }

    #[test]
    fn no_trades_is_all_zero() {
        let stats = TradeStats::compute(10_000.0, &[]);
        assert_eq!(stats, TradeStats::default());
    }

    #[test]
    fn win_and_loss_counts_and_rates() {
        let trades = vec![
            make_trade(100.0, 10_100.0),
            make_trade(-50.0, 10_050.0),
            make_trade(200.0, 10_250.0),
            make_trade(0.0, 10_250.0),
        ];
        let stats = TradeStats::compute(10_000.0, &trades);
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert_relative_eq!(stats.win_rate, 50.0);
        assert_relative_eq!(stats.loss_rate, 25.0);
    }

    #[test]
    fn averages_per_subset() {
        let trades = vec![
            make_trade(100.0, 10_100.0),
            make_trade(-60.0, 10_040.0),
            make_trade(200.0, 10_240.0),
            make_trade(-40.0, 10_200.0),
        ];
        let stats = TradeStats::compute(10_000.0, &trades);
        assert_relative_eq!(stats.avg_win, 150.0);
        assert_relative_eq!(stats.avg_loss, -50.0);
    }

    #[test]
    fn only_winners_leaves_avg_loss_zero() {
        let stats = TradeStats::compute(10_000.0, &[make_trade(10.0, 10_010.0)]);
        assert_relative_eq!(stats.avg_loss, 0.0);
        assert_relative_eq!(stats.win_rate, 100.0);
    }

    #[test]
    fn drawdown_against_running_peak() {
        let trades = vec![
            make_trade(0.0, 10_000.0),
            make_trade(-1_000.0, 9_000.0),
            make_trade(500.0, 9_500.0),
        ];
        assert_relative_eq!(max_drawdown(10_000.0, &trades), 10.0);
    }

    #[test]
    fn drawdown_uses_new_peaks() {
        let trades = vec![
            make_trade(2_000.0, 12_000.0),
            make_trade(-3_000.0, 9_000.0),
            make_trade(1_000.0, 10_000.0),
        ];
        assert_relative_eq!(max_drawdown(10_000.0, &trades), 25.0);
    }

    #[test]
    fn drawdown_zero_when_only_rising() {
        let trades = vec![make_trade(10.0, 10_010.0), make_trade(10.0, 10_020.0)];
        assert_relative_eq!(max_drawdown(10_000.0, &trades), 0.0);
    }
}
