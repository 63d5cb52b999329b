//! Chandelier Exit: ATR-based trailing stop levels.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::atr::Atr;
use crate::numeric::Numeric;
use crate::traits::{period_or_one, Hlc, Indicator};

/// Stop levels for each side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChandelierLevels<T> {
    /// Highest high over the period minus `multiplier * ATR`.
    pub long_stop: T,
    /// Lowest low over the period plus `multiplier * ATR`.
    pub short_stop: T,
}

#[derive(Debug, Clone)]
pub struct ChandelierExit<T: Numeric = f64> {
    period: usize,
    multiplier: T,
    atr: Atr<T>,
    highs: VecDeque<T>,
    lows: VecDeque<T>,
}

impl<T: Numeric> ChandelierExit<T> {
    pub fn new(period: usize, multiplier: T) -> Self {
        let period = period_or_one(period);
        Self {
            period,
            multiplier,
            atr: Atr::new(period),
            highs: VecDeque::with_capacity(period + 1),
            lows: VecDeque::with_capacity(period + 1),
        }
    }
}

fn push_window<T>(window: &mut VecDeque<T>, value: T, size: usize) {
    window.push_back(value);
    if window.len() > size {
        window.pop_front();
    }
}

impl<T: Numeric> Indicator for ChandelierExit<T> {
    type Input = Hlc<T>;
    type Output = ChandelierLevels<T>;

    fn name(&self) -> String {
        format!("Chandelier({}, {:?})", self.period, self.multiplier)
    }

    fn lookback(&self) -> usize {
        self.atr.lookback()
    }

    fn next(&mut self, input: &Hlc<T>) -> Option<ChandelierLevels<T>> {
        push_window(&mut self.highs, input.high, self.period);
        push_window(&mut self.lows, input.low, self.period);
        let atr = self.atr.next(input)?;

        let highest = self.highs.iter().copied().reduce(T::max_of)?;
        let lowest = self.lows.iter().copied().reduce(T::min_of)?;
        let offset = self.multiplier * atr;
        Some(ChandelierLevels {
            long_stop: highest - offset,
            short_stop: lowest + offset,
        })
    }

    fn reset(&mut self) {
        self.atr.reset();
        self.highs.clear();
        self.lows.clear();
    }
}
