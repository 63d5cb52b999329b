//! The strategy interface driven by the simulator.

use chrono::{DateTime, Utc};

use market_core::{Bar, DataSeries, TimeFrame};

use crate::account::{Direction, Position, PositionState, SimulatedAccount, StopUpdate};
use crate::error::{OrderRejection, Result};
use crate::params::ParameterMap;

/// A trading strategy driven one closed bar at a time.
///
/// For every bar the simulator first calls [`Bot::update_indicators`] (also for
/// warm-up bars before the run's start) and then, once trading has begun,
/// [`Bot::on_bar`]. Bots see only bars up to and including the current one.
pub trait Bot: Send {
    fn name(&self) -> &str;

    /// Effective parameters, for reports.
    fn parameters(&self) -> ParameterMap;

    /// Bars needed before the first [`Bot::on_bar`] can act.
    fn lookback(&self) -> usize;

    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Advance indicator state by one closed bar.
    fn update_indicators(&mut self, bar: &Bar);

    fn on_bar(&mut self, ctx: &mut BotContext<'_>) -> Result<()>;

    fn on_stop(&mut self, _ctx: &mut BotContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// What a bot can see and do while handling a bar.
pub struct BotContext<'a> {
    symbol: &'a str,
    timeframe: TimeFrame,
    bars: &'a DataSeries<Bar>,
    account: &'a mut SimulatedAccount,
}

impl<'a> BotContext<'a> {
    pub fn new(
        symbol: &'a str,
        timeframe: TimeFrame,
        bars: &'a DataSeries<Bar>,
        account: &'a mut SimulatedAccount,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            bars,
            account,
        }
    }

    pub fn symbol(&self) -> &str {
        self.symbol
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    /// Bars so far; `bars().get(0)` is the current one.
    pub fn bars(&self) -> &DataSeries<Bar> {
        self.bars
    }

    pub fn bar(&self) -> Result<&Bar> {
        Ok(self.bars.get(0)?)
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.open_time)
    }

    pub fn account(&self) -> &SimulatedAccount {
        self.account
    }

    pub fn position_state(&self) -> PositionState {
        self.account.state()
    }

    pub fn position(&self) -> Option<&Position> {
        self.account.position()
    }

    pub fn try_open(&mut self, direction: Direction) -> std::result::Result<(), OrderRejection> {
        self.account.try_open(direction)
    }

    pub fn try_close(&mut self) -> std::result::Result<(), OrderRejection> {
        self.account.try_close()
    }

    pub fn set_stop_loss(&mut self, price: f64, update: StopUpdate) -> std::result::Result<(), OrderRejection> {
        self.account.set_stop_loss(price, update)
    }

    pub fn set_take_profit(&mut self, price: f64, update: StopUpdate) -> std::result::Result<(), OrderRejection> {
        self.account.set_take_profit(price, update)
    }
}
