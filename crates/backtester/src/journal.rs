//! Closed-trade journal and equity curve.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::{CloseReason, Direction};

/// A completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Sequence number within the run, starting at 1.
    pub id: usize,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    /// Entry and exit fees.
    pub fees: Decimal,
    /// Slippage cost on both fills.
    pub slippage: Decimal,
    /// Net of fees.
    pub pnl: Decimal,
    /// `pnl` relative to the entry notional.
    pub return_pct: f64,
    pub close_reason: CloseReason,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn duration_hours(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 3600.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Journal {
    trades: Vec<TradeRecord>,
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trade(&mut self, trade: TradeRecord) {
        self.trades.push(trade);
    }

    /// Append a mark-to-market point; a second point for the same time replaces the first.
    pub fn record_equity(&mut self, time: DateTime<Utc>, equity: Decimal) {
        match self.equity_curve.last_mut() {
            Some(last) if last.0 == time => last.1 = equity,
            _ => self.equity_curve.push((time, equity)),
        }
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, Decimal)] {
        &self.equity_curve
    }

    pub fn last_equity(&self) -> Option<Decimal> {
        self.equity_curve.last().map(|(_, v)| *v)
    }
}
