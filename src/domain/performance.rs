//! Post-run performance statistics.
//!
//! Computed once from the equity curve and the trade ledger after a
//! simulation finishes. Realized-trade stats only look at sell rows that
//! carry a recorded profit.

use super::trade::{EquitySnapshot, Trade, TradeAction};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const CALENDAR_DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    pub total_return: f64,
    /// Compound annual growth rate on a calendar-day basis.
    pub cagr: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// Longest stretch of consecutive snapshots below the running peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub buys: usize,
    pub sells: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

impl Performance {
    pub fn compute(equity_curve: &[EquitySnapshot], trades: &[Trade], initial_cash: f64) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|point| point.total_equity)
            .unwrap_or(initial_cash);

        let total_return = if initial_cash > 0.0 {
            (final_equity - initial_cash) / initial_cash
        } else {
            0.0
        };

        let years = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => {
                (last.date - first.date).num_days() as f64 / CALENDAR_DAYS_PER_YEAR
            }
            _ => 0.0,
        };
        let cagr = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let sharpe_ratio = compute_sharpe(equity_curve);

        let mut buys = 0usize;
        let mut sells = 0usize;
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;

        for trade in trades {
            match trade.action {
                TradeAction::Buy => buys += 1,
                TradeAction::Sell => sells += 1,
            }
            let Some(pnl) = trade.pnl else {
                continue;
            };
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
            } else {
                trades_breakeven += 1;
            }
        }

        let closed = trades_won + trades_lost + trades_breakeven;
        let win_rate = if closed > 0 {
            trades_won as f64 / closed as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };
        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        Performance {
            total_return,
            cagr,
            sharpe_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: trades.len(),
            buys,
            sells,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
        }
    }
}

fn compute_drawdown(equity_curve: &[EquitySnapshot]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.total_equity;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut current_duration = 0usize;

    for point in equity_curve {
        if point.total_equity > peak {
            peak = point.total_equity;
            current_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.total_equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_duration += 1;
            if current_duration > max_duration {
                max_duration = current_duration;
            }
        }
    }

    (max_dd, max_duration)
}

/// Mean daily return over its standard deviation, annualized by sqrt(252).
/// Risk-free rate is taken as zero.
fn compute_sharpe(equity_curve: &[EquitySnapshot]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|pair| {
            let prev = pair[0].total_equity;
            let curr = pair[1].total_equity;
            if prev > 0.0 { (curr - prev) / prev } else { 0.0 }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    if stddev > 0.0 {
        (mean / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
