//! Simple moving average.

use std::collections::VecDeque;

use crate::numeric::Numeric;
use crate::traits::{period_or_one, Indicator};

/// Arithmetic mean of the last `period` inputs.
#[derive(Debug, Clone)]
pub struct Sma<T: Numeric = f64> {
    period: usize,
    window: VecDeque<T>,
    sum: T,
}

impl<T: Numeric> Sma<T> {
    /// A period of zero is treated as one.
    pub fn new(period: usize) -> Self {
        let period = period_or_one(period);
        Self {
            period,
            window: VecDeque::with_capacity(period + 1),
            sum: T::zero(),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl<T: Numeric> Indicator for Sma<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> String {
        format!("SMA({})", self.period)
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn next(&mut self, input: &T) -> Option<T> {
        self.window.push_back(*input);
        self.sum = self.sum + *input;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum = self.sum - old;
            }
        }
        (self.window.len() == self.period).then(|| self.sum / T::from_usize(self.period))
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = T::zero();
    }
}
