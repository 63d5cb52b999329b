//! Performance statistics over a finished run's journal.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use market_core::TimeFrame;

use crate::journal::{Journal, TradeRecord};

const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStatistics {
    pub initial_capital: Decimal,
    pub final_balance: Decimal,
    /// Absolute.
    pub total_return: Decimal,
    pub return_pct: f64,
    pub annualized_return: f64,
    /// Largest peak-to-trough fall of the equity curve, as a fraction of the peak.
    pub max_drawdown: f64,
    /// Annualized over bar returns, zero risk-free rate.
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub max_consecutive_losses: usize,
    pub total_fees: Decimal,
    pub total_slippage: Decimal,
    pub avg_trade_duration_hours: f64,
    pub bars_processed: usize,
}

impl BacktestStatistics {
    pub fn compute(
        journal: &Journal,
        initial_capital: Decimal,
        final_balance: Decimal,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bars_processed: usize,
    ) -> Self {
        let trades = journal.trades();
        let total_return = final_balance - initial_capital;
        let return_pct = if initial_capital > Decimal::ZERO {
            (total_return / initial_capital).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        let years = (end - start).num_seconds() as f64 / SECONDS_PER_YEAR;
        let annualized_return = if years > 0.0 && return_pct > -1.0 {
            (1.0 + return_pct).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let bars_per_year = SECONDS_PER_YEAR / timeframe.approximate_span().num_seconds().max(1) as f64;
        let (sharpe_ratio, sortino_ratio) = risk_ratios(journal.equity_curve(), bars_per_year);

        let winning_trades = trades.iter().filter(|t| t.is_win()).count();
        let losing_trades = trades.len() - winning_trades;
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            winning_trades as f64 / trades.len() as f64
        };

        let gross_wins: Decimal = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).sum();
        let gross_losses: Decimal = trades.iter().filter(|t| !t.is_win()).map(|t| t.pnl.abs()).sum();
        let profit_factor = if gross_losses > Decimal::ZERO {
            (gross_wins / gross_losses).to_f64().unwrap_or(0.0)
        } else if gross_wins > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_trade_duration_hours = if trades.is_empty() {
            0.0
        } else {
            trades.iter().map(TradeRecord::duration_hours).sum::<f64>() / trades.len() as f64
        };

        Self {
            initial_capital,
            final_balance,
            total_return,
            return_pct,
            annualized_return,
            max_drawdown: max_drawdown(journal.equity_curve()),
            sharpe_ratio,
            sortino_ratio,
            win_rate,
            profit_factor,
            total_trades: trades.len(),
            winning_trades,
            losing_trades,
            max_consecutive_losses: max_consecutive_losses(trades),
            total_fees: trades.iter().map(|t| t.fees).sum(),
            total_slippage: trades.iter().map(|t| t.slippage).sum(),
            avg_trade_duration_hours,
            bars_processed,
        }
    }
}

fn max_drawdown(equity_curve: &[(DateTime<Utc>, Decimal)]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.1;
    let mut max_drawdown: f64 = 0.0;
    for (_, value) in equity_curve {
        if *value > peak {
            peak = *value;
        }
        if peak > Decimal::ZERO {
            let drawdown = ((peak - *value) / peak).to_f64().unwrap_or(0.0);
            max_drawdown = max_drawdown.max(drawdown);
        }
    }
    max_drawdown
}

fn risk_ratios(equity_curve: &[(DateTime<Utc>, Decimal)], periods_per_year: f64) -> (f64, f64) {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let (prev, curr) = (w[0].1, w[1].1);
            if prev == Decimal::ZERO {
                0.0
            } else {
                ((curr - prev) / prev).to_f64().unwrap_or(0.0)
            }
        })
        .collect();
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let std_dev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    let sharpe = if std_dev > 0.0 {
        mean / std_dev * periods_per_year.sqrt()
    } else {
        0.0
    };

    let downside: Vec<f64> = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).collect();
    let downside_dev = if downside.is_empty() {
        0.0
    } else {
        (downside.iter().sum::<f64>() / downside.len() as f64).sqrt()
    };
    let sortino = if downside_dev > 0.0 {
        mean / downside_dev * periods_per_year.sqrt()
    } else if mean > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    (sharpe, sortino)
}

fn max_consecutive_losses(trades: &[TradeRecord]) -> usize {
    let mut max = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_win() {
            current = 0;
        } else {
            current += 1;
            max = max.max(current);
        }
    }
    max
}
