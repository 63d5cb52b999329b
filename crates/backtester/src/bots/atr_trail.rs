//! Trend-following bot with an ATR trailing stop.
//!
//! Enters on a fast/slow EMA crossover, protects the position with a Chandelier
//! Exit stop that only ever tightens, optionally takes profit a multiple of ATR
//! away from the entry bar's close, and exits when the EMAs cross back.

use market_core::Bar;
use indicators::{Atr, ChandelierExit, Ema, Hlc, Indicator, IndicatorSeries};
use tracing::debug;

use crate::account::{Direction, PositionState, StopUpdate};
use crate::bot::{Bot, BotContext};
use crate::error::{OrderRejection, Result};
use crate::params::{parse_non_negative, parse_period, parse_value, BotParameters, ParameterKey, ParameterMap};

pub const NAME: &str = "atr-trail";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtrTrailParam {
    AtrPeriod,
    AtrMultiplier,
    FastPeriod,
    SlowPeriod,
    TakeProfitAtr,
    AllowShort,
}

impl ParameterKey for AtrTrailParam {
    const ALL: &'static [Self] = &[
        AtrTrailParam::AtrPeriod,
        AtrTrailParam::AtrMultiplier,
        AtrTrailParam::FastPeriod,
        AtrTrailParam::SlowPeriod,
        AtrTrailParam::TakeProfitAtr,
        AtrTrailParam::AllowShort,
    ];

    fn path(&self) -> &'static str {
        match self {
            AtrTrailParam::AtrPeriod => "atr.period",
            AtrTrailParam::AtrMultiplier => "atr.multiplier",
            AtrTrailParam::FastPeriod => "trend.fast",
            AtrTrailParam::SlowPeriod => "trend.slow",
            AtrTrailParam::TakeProfitAtr => "exit.take-profit-atr",
            AtrTrailParam::AllowShort => "trade.allow-short",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtrTrailParams {
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub fast_period: usize,
    pub slow_period: usize,
    /// Take-profit distance in ATRs; zero disables it.
    pub take_profit_atr: f64,
    pub allow_short: bool,
}

impl Default for AtrTrailParams {
    fn default() -> Self {
        Self {
            atr_period: 14,
            atr_multiplier: 3.0,
            fast_period: 12,
            slow_period: 26,
            take_profit_atr: 0.0,
            allow_short: true,
        }
    }
}

impl BotParameters for AtrTrailParams {
    type Key = AtrTrailParam;

    fn set(&mut self, key: AtrTrailParam, raw: &str) -> std::result::Result<(), String> {
        match key {
            AtrTrailParam::AtrPeriod => self.atr_period = parse_period(raw)?,
            AtrTrailParam::AtrMultiplier => self.atr_multiplier = parse_non_negative(raw)?,
            AtrTrailParam::FastPeriod => self.fast_period = parse_period(raw)?,
            AtrTrailParam::SlowPeriod => self.slow_period = parse_period(raw)?,
            AtrTrailParam::TakeProfitAtr => self.take_profit_atr = parse_non_negative(raw)?,
            AtrTrailParam::AllowShort => self.allow_short = parse_value(raw)?,
        }
        Ok(())
    }

    fn get(&self, key: AtrTrailParam) -> String {
        match key {
            AtrTrailParam::AtrPeriod => self.atr_period.to_string(),
            AtrTrailParam::AtrMultiplier => self.atr_multiplier.to_string(),
            AtrTrailParam::FastPeriod => self.fast_period.to_string(),
            AtrTrailParam::SlowPeriod => self.slow_period.to_string(),
            AtrTrailParam::TakeProfitAtr => self.take_profit_atr.to_string(),
            AtrTrailParam::AllowShort => self.allow_short.to_string(),
        }
    }
}

/// The crossover reads `[1]`, so keep one output more than the EMA's lookback.
fn crossing_series(period: usize) -> IndicatorSeries<Ema> {
    let ema = Ema::new(period);
    let capacity = ema.lookback() + 2;
    IndicatorSeries::with_capacity(ema, capacity)
}

pub struct AtrTrailBot {
    params: AtrTrailParams,
    fast: IndicatorSeries<Ema>,
    slow: IndicatorSeries<Ema>,
    atr: IndicatorSeries<Atr>,
    chandelier: IndicatorSeries<ChandelierExit>,
}

impl AtrTrailBot {
    pub fn new(params: AtrTrailParams) -> Self {
        Self {
            fast: crossing_series(params.fast_period),
            slow: crossing_series(params.slow_period),
            atr: IndicatorSeries::new(Atr::new(params.atr_period)),
            chandelier: IndicatorSeries::new(ChandelierExit::new(params.atr_period, params.atr_multiplier)),
            params,
        }
    }

    pub fn params(&self) -> &AtrTrailParams {
        &self.params
    }

    /// Tighten the stop towards `stop`; a looser level keeps the old stop.
    fn trail_stop(ctx: &mut BotContext<'_>, stop: f64) -> Result<()> {
        match ctx.set_stop_loss(stop, StopUpdate::TightenOnly) {
            Ok(()) | Err(OrderRejection::WouldLoosen { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// `Some(true)` when fast crossed above slow on this bar, `Some(false)` below.
    fn crossover(&self) -> Result<Option<bool>> {
        let (Some(fast), Some(slow), Some(prev_fast), Some(prev_slow)) = (
            self.fast.get(0)?,
            self.slow.get(0)?,
            self.fast.get(1)?,
            self.slow.get(1)?,
        ) else {
            return Ok(None);
        };
        Ok(if prev_fast <= prev_slow && fast > slow {
            Some(true)
        } else if prev_fast >= prev_slow && fast < slow {
            Some(false)
        } else {
            None
        })
    }
}

impl Bot for AtrTrailBot {
    fn name(&self) -> &str {
        NAME
    }

    fn parameters(&self) -> ParameterMap {
        self.params.to_map()
    }

    fn lookback(&self) -> usize {
        // One extra bar to see the previous EMA values.
        self.fast
            .lookback()
            .max(self.slow.lookback())
            .max(self.chandelier.lookback())
            + 1
    }

    fn update_indicators(&mut self, bar: &Bar) {
        let hlc = Hlc::from(bar);
        self.fast.update(&bar.close);
        self.slow.update(&bar.close);
        self.atr.update(&hlc);
        self.chandelier.update(&hlc);
    }

    fn on_bar(&mut self, ctx: &mut BotContext<'_>) -> Result<()> {
        if self.fast.count() < 2 || self.slow.count() < 2 {
            return Ok(());
        }
        let (Some(levels), Some(atr)) = (self.chandelier.current(), self.atr.current()) else {
            return Ok(());
        };
        let close = ctx.bar()?.close;
        let cross = self.crossover()?;

        match (ctx.position_state(), ctx.position().map(|p| p.direction)) {
            (PositionState::NoPosition, _) => {
                let direction = match cross {
                    Some(true) => Direction::Long,
                    Some(false) if self.params.allow_short => Direction::Short,
                    _ => return Ok(()),
                };
                match ctx.try_open(direction) {
                    Ok(()) => {}
                    Err(reason @ (OrderRejection::InsufficientFunds { .. } | OrderRejection::AlreadyInPosition)) => {
                        debug!(%reason, ?direction, "Entry refused, staying flat");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
                let (stop, target) = match direction {
                    Direction::Long => (levels.long_stop, close + self.params.take_profit_atr * atr),
                    Direction::Short => (levels.short_stop, close - self.params.take_profit_atr * atr),
                };
                // A stop on the wrong side of the market would fire at once.
                let stop_valid = match direction {
                    Direction::Long => stop < close,
                    Direction::Short => stop > close,
                };
                if stop_valid {
                    ctx.set_stop_loss(stop, StopUpdate::Unspecified)?;
                }
                if self.params.take_profit_atr > 0.0 && target > 0.0 {
                    ctx.set_take_profit(target, StopUpdate::Unspecified)?;
                }
            }
            (PositionState::Open, Some(direction)) => {
                let reversed = matches!(
                    (direction, cross),
                    (Direction::Long, Some(false)) | (Direction::Short, Some(true))
                );
                if reversed {
                    ctx.try_close()?;
                    return Ok(());
                }
                let stop = match direction {
                    Direction::Long => levels.long_stop,
                    Direction::Short => levels.short_stop,
                };
                Self::trail_stop(ctx, stop)?;
            }
            _ => {}
        }
        Ok(())
    }
}
