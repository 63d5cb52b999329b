//! Simulated single-position account.
//!
//! Bots submit requests while a bar is being handled; market orders fill at the
//! next bar's open, so nothing a bot does can trade on the bar it has just seen.
//! Open positions are checked against every bar's range for stop-loss and
//! take-profit hits. When both lie inside one bar the stop-loss is assumed hit
//! first.

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use market_core::Bar;

use crate::config::SimulatorConfig;
use crate::error::OrderRejection;
use crate::journal::{Journal, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// `NoPosition -> Opening -> Open -> Closing -> NoPosition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    NoPosition,
    /// Entry submitted, fills at the next bar's open.
    Opening,
    Open,
    /// Exit submitted, fills at the next bar's open.
    Closing,
}

/// How a new stop level relates to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopUpdate {
    /// Rejected if the new level gives less protection than the current one.
    TightenOnly,
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Bot,
    StopLoss,
    TakeProfit,
    EndOfRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    /// Fill price including slippage.
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_fees: Decimal,
    pub entry_slippage: Decimal,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Last mark.
    pub current_price: Decimal,
}

impl Position {
    pub fn unrealized_pnl(&self) -> Decimal {
        self.direction.sign() * (self.current_price - self.entry_price) * self.quantity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone, Copy, Default)]
struct Stops {
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SimulatedAccount {
    config: SimulatorConfig,
    cash: Decimal,
    state: PositionState,
    /// Direction and stops of a submitted entry.
    pending_entry: Option<(Direction, Stops)>,
    position: Option<Position>,
    journal: Journal,
    traded_volume: Decimal,
    total_fees: Decimal,
    total_slippage: Decimal,
}

fn to_price(price: f64) -> Result<Decimal, OrderRejection> {
    if price.is_finite() && price > 0.0 {
        Decimal::from_f64(price).ok_or(OrderRejection::InvalidPrice(price))
    } else {
        Err(OrderRejection::InvalidPrice(price))
    }
}

impl SimulatedAccount {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            cash: config.initial_capital,
            config,
            state: PositionState::NoPosition,
            pending_entry: None,
            position: None,
            journal: Journal::new(),
            traded_volume: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            total_slippage: Decimal::ZERO,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Direction of the open or pending position.
    pub fn direction(&self) -> Option<Direction> {
        self.position
            .as_ref()
            .map(|p| p.direction)
            .or(self.pending_entry.map(|(d, _)| d))
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// Cash plus the open position's unrealized P&L.
    pub fn equity(&self) -> Decimal {
        self.cash + self.position.as_ref().map_or(Decimal::ZERO, Position::unrealized_pnl)
    }

    pub fn total_fees(&self) -> Decimal {
        self.total_fees
    }

    pub fn total_slippage(&self) -> Decimal {
        self.total_slippage
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn into_journal(self) -> Journal {
        self.journal
    }

    // Bot requests

    pub fn try_open(&mut self, direction: Direction) -> Result<(), OrderRejection> {
        if self.state != PositionState::NoPosition {
            return Err(OrderRejection::AlreadyInPosition);
        }
        if self.equity() < self.config.min_position_size {
            return Err(OrderRejection::InsufficientFunds {
                available: self.equity().to_string(),
            });
        }
        self.pending_entry = Some((direction, Stops::default()));
        self.state = PositionState::Opening;
        Ok(())
    }

    /// Exit the open position, or withdraw an entry that has not filled yet.
    pub fn try_close(&mut self) -> Result<(), OrderRejection> {
        match self.state {
            PositionState::NoPosition => Err(OrderRejection::NoPosition),
            PositionState::Opening => {
                self.pending_entry = None;
                self.state = PositionState::NoPosition;
                Ok(())
            }
            PositionState::Open => {
                self.state = PositionState::Closing;
                Ok(())
            }
            PositionState::Closing => Ok(()),
        }
    }

    pub fn set_stop_loss(&mut self, price: f64, update: StopUpdate) -> Result<(), OrderRejection> {
        self.set_level(Level::StopLoss, price, update)
    }

    /// Tightening a take-profit moves it towards the market.
    pub fn set_take_profit(&mut self, price: f64, update: StopUpdate) -> Result<(), OrderRejection> {
        self.set_level(Level::TakeProfit, price, update)
    }

    fn set_level(&mut self, level: Level, price: f64, update: StopUpdate) -> Result<(), OrderRejection> {
        to_price(price)?;
        let (direction, slot) = self.level_slot(level).ok_or(OrderRejection::NoPosition)?;
        if let (StopUpdate::TightenOnly, Some(current)) = (update, *slot) {
            let tighter_is_higher = matches!(
                (level, direction),
                (Level::StopLoss, Direction::Long) | (Level::TakeProfit, Direction::Short)
            );
            let loosens = if tighter_is_higher { price < current } else { price > current };
            if loosens {
                return Err(OrderRejection::WouldLoosen { current, requested: price });
            }
        }
        *slot = Some(price);
        Ok(())
    }

    /// The pending entry's level while opening, the position's afterwards.
    fn level_slot(&mut self, level: Level) -> Option<(Direction, &mut Option<f64>)> {
        match self.state {
            PositionState::Opening => self.pending_entry.as_mut().map(|(d, s)| {
                let slot = match level {
                    Level::StopLoss => &mut s.stop_loss,
                    Level::TakeProfit => &mut s.take_profit,
                };
                (*d, slot)
            }),
            PositionState::Open | PositionState::Closing => self.position.as_mut().map(|p| {
                let slot = match level {
                    Level::StopLoss => &mut p.stop_loss,
                    Level::TakeProfit => &mut p.take_profit,
                };
                (p.direction, slot)
            }),
            PositionState::NoPosition => None,
        }
    }

    // Simulation steps

    /// Execute orders submitted on the previous bar at this bar's open.
    pub(crate) fn fill_pending(&mut self, bar: &Bar) {
        match self.state {
            PositionState::Opening => {
                if let Some((direction, stops)) = self.pending_entry.take() {
                    if let Err(rejection) = self.open_position(direction, stops, bar) {
                        warn!(time = %bar.open_time, %rejection, "Entry could not be filled");
                        self.state = PositionState::NoPosition;
                    }
                }
            }
            PositionState::Closing => self.close_position(bar.open, bar, CloseReason::Bot),
            _ => {}
        }
    }

    /// Close the position if the bar's range reached its stop-loss or take-profit.
    pub(crate) fn check_exits(&mut self, bar: &Bar) {
        let Some(position) = self.position.as_ref() else {
            return;
        };
        let exit = match position.direction {
            Direction::Long => {
                if let Some(sl) = position.stop_loss.filter(|sl| bar.low <= *sl) {
                    Some((bar.open.min(sl), CloseReason::StopLoss))
                } else {
                    position
                        .take_profit
                        .filter(|tp| bar.high >= *tp)
                        .map(|tp| (bar.open.max(tp), CloseReason::TakeProfit))
                }
            }
            Direction::Short => {
                if let Some(sl) = position.stop_loss.filter(|sl| bar.high >= *sl) {
                    Some((bar.open.max(sl), CloseReason::StopLoss))
                } else {
                    position
                        .take_profit
                        .filter(|tp| bar.low <= *tp)
                        .map(|tp| (bar.open.min(tp), CloseReason::TakeProfit))
                }
            }
        };
        if let Some((price, reason)) = exit {
            self.close_position(price, bar, reason);
        }
    }

    /// Mark the open position at the bar's close and record equity.
    pub(crate) fn mark(&mut self, bar: &Bar) {
        if let (Some(position), Ok(close)) = (self.position.as_mut(), to_price(bar.close)) {
            position.current_price = close;
        }
        let equity = self.equity();
        self.journal.record_equity(bar.open_time, equity);
    }

    /// Flatten at the bar's close, withdrawing any unfilled entry.
    pub(crate) fn close_at_end(&mut self, bar: &Bar) {
        match self.state {
            PositionState::Opening => {
                self.pending_entry = None;
                self.state = PositionState::NoPosition;
            }
            PositionState::Open | PositionState::Closing => {
                self.close_position(bar.close, bar, CloseReason::EndOfRun);
                let equity = self.equity();
                self.journal.record_equity(bar.open_time, equity);
            }
            PositionState::NoPosition => {}
        }
    }

    fn open_position(&mut self, direction: Direction, stops: Stops, bar: &Bar) -> Result<(), OrderRejection> {
        let base_price = to_price(bar.open)?;
        let hour = bar.open_time.hour();
        let equity = self.equity();
        let budget = equity * self.config.position_size_pct.min(Decimal::ONE);

        let mut quantity = budget / base_price;
        let slippage = self.config.slippage_model.calculate(base_price, quantity, hour);
        let price = match direction {
            Direction::Long => base_price + slippage,
            Direction::Short => base_price - slippage,
        };
        if price <= Decimal::ZERO {
            return Err(OrderRejection::InvalidPrice(bar.open));
        }

        quantity = budget / price;
        let mut fees = self.config.fee_model.calculate(quantity * price, false, self.traded_volume);
        if quantity * price + fees > equity {
            quantity = quantity * equity / (quantity * price + fees);
            fees = self.config.fee_model.calculate(quantity * price, false, self.traded_volume);
        }

        let notional = quantity * price;
        if notional < self.config.min_position_size {
            return Err(OrderRejection::InsufficientFunds {
                available: equity.to_string(),
            });
        }

        self.cash -= fees;
        self.traded_volume += notional;
        self.total_fees += fees;
        self.total_slippage += slippage * quantity;
        self.position = Some(Position {
            direction,
            entry_time: bar.open_time,
            entry_price: price,
            quantity,
            entry_fees: fees,
            entry_slippage: slippage * quantity,
            stop_loss: stops.stop_loss,
            take_profit: stops.take_profit,
            current_price: price,
        });
        self.state = PositionState::Open;

        debug!(
            time = %bar.open_time,
            ?direction,
            price = %price,
            quantity = %quantity,
            fees = %fees,
            "Position opened"
        );
        Ok(())
    }

    fn close_position(&mut self, exit_price: f64, bar: &Bar, reason: CloseReason) {
        let Some(position) = self.position.take() else {
            self.state = PositionState::NoPosition;
            return;
        };

        let base_price = to_price(exit_price).unwrap_or(position.current_price);
        let slippage = self
            .config
            .slippage_model
            .calculate(base_price, position.quantity, bar.open_time.hour());
        let price = match position.direction {
            Direction::Long => base_price - slippage,
            Direction::Short => base_price + slippage,
        };

        let notional = position.quantity * price;
        // Take-profits rest on the book as limit orders; every other exit takes liquidity.
        let is_maker = reason == CloseReason::TakeProfit;
        let fees = self.config.fee_model.calculate(notional, is_maker, self.traded_volume);
        let gross = position.direction.sign() * (price - position.entry_price) * position.quantity;
        let pnl = gross - fees - position.entry_fees;
        let cost_basis = position.quantity * position.entry_price;
        let return_pct = if cost_basis > Decimal::ZERO {
            (pnl / cost_basis).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        self.cash += gross - fees;
        self.traded_volume += notional;
        self.total_fees += fees;
        self.total_slippage += slippage * position.quantity;
        self.state = PositionState::NoPosition;
        self.pending_entry = None;

        let trade = TradeRecord {
            id: self.journal.trades().len() + 1,
            direction: position.direction,
            entry_time: position.entry_time,
            exit_time: bar.open_time,
            entry_price: position.entry_price,
            exit_price: price,
            quantity: position.quantity,
            fees: position.entry_fees + fees,
            slippage: position.entry_slippage + slippage * position.quantity,
            pnl,
            return_pct,
            close_reason: reason,
        };
        debug!(
            time = %bar.open_time,
            id = trade.id,
            pnl = %pnl,
            reason = ?reason,
            "Position closed"
        );
        self.journal.record_trade(trade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeeModel, SlippageModel};
    use chrono::{Duration, TimeZone};

    fn frictionless() -> SimulatorConfig {
        SimulatorConfig {
            slippage_model: SlippageModel::None,
            fee_model: FeeModel::Fixed(Decimal::ZERO),
            ..Default::default()
        }
    }

    fn bar(hour: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        Bar::new(t, open, high, low, close, 1.0)
    }

    #[test]
    fn test_entry_fills_at_next_open() {
        let mut account = SimulatedAccount::new(frictionless());
        account.try_open(Direction::Long).unwrap();
        assert_eq!(account.state(), PositionState::Opening);
        assert!(account.position().is_none());

        account.fill_pending(&bar(1, 100.0, 101.0, 99.0, 100.5));
        let position = account.position().unwrap();
        assert_eq!(account.state(), PositionState::Open);
        assert_eq!(position.entry_price, Decimal::new(100, 0));
        assert_eq!(position.quantity, Decimal::new(100, 0));

        account.mark(&bar(1, 100.0, 101.0, 99.0, 110.0));
        assert_eq!(account.equity(), Decimal::new(11000, 0));
    }

    #[test]
    fn test_round_trip_pnl() {
        let mut account = SimulatedAccount::new(frictionless());
        account.try_open(Direction::Short).unwrap();
        account.fill_pending(&bar(1, 100.0, 100.0, 100.0, 100.0));
        account.try_close().unwrap();
        assert_eq!(account.state(), PositionState::Closing);
        account.fill_pending(&bar(2, 90.0, 90.0, 90.0, 90.0));

        assert_eq!(account.state(), PositionState::NoPosition);
        assert_eq!(account.cash(), Decimal::new(11000, 0));
        let trade = &account.journal().trades()[0];
        assert_eq!(trade.pnl, Decimal::new(1000, 0));
        assert_eq!(trade.close_reason, CloseReason::Bot);
        assert!((trade.return_pct - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_requests_follow_state_machine() {
        let mut account = SimulatedAccount::new(frictionless());
        assert_eq!(account.try_close(), Err(OrderRejection::NoPosition));
        assert_eq!(account.set_stop_loss(90.0, StopUpdate::Unspecified), Err(OrderRejection::NoPosition));

        account.try_open(Direction::Long).unwrap();
        assert_eq!(account.try_open(Direction::Short), Err(OrderRejection::AlreadyInPosition));

        // Withdrawn before it fills.
        account.try_close().unwrap();
        assert_eq!(account.state(), PositionState::NoPosition);
        account.fill_pending(&bar(1, 100.0, 100.0, 100.0, 100.0));
        assert!(account.position().is_none());
    }

    #[test]
    fn test_tighten_only_rejects_looser_stop() {
        let mut account = SimulatedAccount::new(frictionless());
        account.try_open(Direction::Long).unwrap();
        account.set_stop_loss(95.0, StopUpdate::Unspecified).unwrap();
        account.fill_pending(&bar(1, 100.0, 100.0, 100.0, 100.0));
        assert_eq!(account.position().unwrap().stop_loss, Some(95.0));

        assert_eq!(
            account.set_stop_loss(94.0, StopUpdate::TightenOnly),
            Err(OrderRejection::WouldLoosen { current: 95.0, requested: 94.0 })
        );
        account.set_stop_loss(97.0, StopUpdate::TightenOnly).unwrap();
        account.set_stop_loss(93.0, StopUpdate::Unspecified).unwrap();
        assert_eq!(account.position().unwrap().stop_loss, Some(93.0));
        assert!(matches!(
            account.set_stop_loss(f64::NAN, StopUpdate::Unspecified),
            Err(OrderRejection::InvalidPrice(_))
        ));
    }

    #[test]
    fn test_stop_loss_fills_at_gap_open() {
        let mut account = SimulatedAccount::new(frictionless());
        account.try_open(Direction::Long).unwrap();
        account.set_stop_loss(95.0, StopUpdate::Unspecified).unwrap();
        account.set_take_profit(120.0, StopUpdate::Unspecified).unwrap();
        account.fill_pending(&bar(1, 100.0, 100.0, 100.0, 100.0));

        account.check_exits(&bar(2, 99.0, 101.0, 96.0, 100.0));
        assert_eq!(account.state(), PositionState::Open);

        // Gapped through the stop: filled at the open, not the stop.
        account.check_exits(&bar(3, 90.0, 92.0, 88.0, 91.0));
        let trade = &account.journal().trades()[0];
        assert_eq!(trade.close_reason, CloseReason::StopLoss);
        assert_eq!(trade.exit_price, Decimal::new(90, 0));
    }

    #[test]
    fn test_take_profit_and_costs() {
        let config = SimulatorConfig {
            slippage_model: SlippageModel::None,
            fee_model: FeeModel::Fixed(Decimal::new(1, 2)),
            position_size_pct: Decimal::new(5, 1),
            ..Default::default()
        };
        let mut account = SimulatedAccount::new(config);
        account.try_open(Direction::Long).unwrap();
        account.set_take_profit(110.0, StopUpdate::Unspecified).unwrap();
        account.fill_pending(&bar(1, 100.0, 100.0, 100.0, 100.0));
        // 5000 notional, 50 entry fee.
        assert_eq!(account.cash(), Decimal::new(9950, 0));

        account.check_exits(&bar(2, 105.0, 112.0, 104.0, 111.0));
        let trade = &account.journal().trades()[0];
        assert_eq!(trade.close_reason, CloseReason::TakeProfit);
        // 50 units * 10 gain - 50 entry fee - 55 exit fee.
        assert_eq!(trade.pnl, Decimal::new(395, 0));
        assert_eq!(account.cash(), Decimal::new(10395, 0));
    }

    #[test]
    fn test_take_profit_pays_maker_fee() {
        let config = SimulatorConfig {
            slippage_model: SlippageModel::None,
            fee_model: FeeModel::MakerTaker {
                maker_fee: Decimal::new(1, 3),
                taker_fee: Decimal::new(1, 2),
            },
            position_size_pct: Decimal::new(5, 1),
            ..Default::default()
        };
        let mut account = SimulatedAccount::new(config);
        account.try_open(Direction::Long).unwrap();
        account.set_take_profit(110.0, StopUpdate::Unspecified).unwrap();
        account.fill_pending(&bar(1, 100.0, 100.0, 100.0, 100.0));
        // Market entry: 5000 notional at the taker rate.
        assert_eq!(account.total_fees(), Decimal::new(50, 0));

        account.check_exits(&bar(2, 105.0, 112.0, 104.0, 111.0));
        let trade = &account.journal().trades()[0];
        assert_eq!(trade.close_reason, CloseReason::TakeProfit);
        // 5500 exit notional at the maker rate.
        assert_eq!(trade.fees, Decimal::new(555, 1));
        assert_eq!(account.cash(), Decimal::new(104445, 1));

        account.try_open(Direction::Long).unwrap();
        account.set_stop_loss(95.0, StopUpdate::Unspecified).unwrap();
        account.fill_pending(&bar(3, 100.0, 100.0, 100.0, 100.0));
        account.check_exits(&bar(4, 96.0, 97.0, 94.0, 95.0));
        let trade = &account.journal().trades()[1];
        assert_eq!(trade.close_reason, CloseReason::StopLoss);
        // 52.2225 units, taker on both legs: 52.2225 in, 49.611375 out.
        assert_eq!(trade.fees, Decimal::new(101833875, 6));
    }
}
