//! Exponential moving average, seeded with the simple average of the first
//! `period` inputs.

use crate::numeric::Numeric;
use crate::traits::{period_or_one, Indicator};

#[derive(Debug, Clone)]
pub struct Ema<T: Numeric = f64> {
    period: usize,
    alpha: T,
    seen: usize,
    seed_sum: T,
    value: Option<T>,
}

impl<T: Numeric> Ema<T> {
    pub fn new(period: usize) -> Self {
        let period = period_or_one(period);
        Self {
            period,
            alpha: T::from_usize(2) / T::from_usize(period + 1),
            seen: 0,
            seed_sum: T::zero(),
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl<T: Numeric> Indicator for Ema<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> String {
        format!("EMA({})", self.period)
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn next(&mut self, input: &T) -> Option<T> {
        let x = *input;
        self.value = match self.value {
            Some(prev) => Some(prev + self.alpha * (x - prev)),
            None => {
                self.seen += 1;
                self.seed_sum = self.seed_sum + x;
                (self.seen == self.period).then(|| self.seed_sum / T::from_usize(self.period))
            }
        };
        self.value
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.seed_sum = T::zero();
        self.value = None;
    }
}
