//! Indicator trait and common inputs.

use market_core::Bar;

use crate::numeric::Numeric;

/// One incremental step function over a stream of inputs.
///
/// `next` sees the current input only; anything older it needs is kept in the
/// indicator's own state. An indicator therefore cannot read a future value, and
/// an output already produced never changes when later inputs arrive.
pub trait Indicator {
    type Input;
    type Output: Copy;

    /// Display name including parameters, e.g. `ATR(14)`.
    fn name(&self) -> String;

    /// Past inputs needed beyond the current one before the first defined output.
    fn lookback(&self) -> usize;

    /// Consume the next input. `None` while warming up.
    fn next(&mut self, input: &Self::Input) -> Option<Self::Output>;

    /// Forget all state.
    fn reset(&mut self);

    /// Inputs required for the first defined output.
    fn warmup_bars(&self) -> usize {
        self.lookback() + 1
    }
}

/// High, low and close of one bar in the indicator's value type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hlc<T> {
    pub high: T,
    pub low: T,
    pub close: T,
}

impl<T: Numeric> Hlc<T> {
    pub fn new(high: T, low: T, close: T) -> Self {
        Self { high, low, close }
    }

    /// True range against the previous close; high - low when there is none.
    pub fn true_range(&self, prev_close: Option<T>) -> T {
        let hl = self.high - self.low;
        match prev_close {
            Some(pc) => hl
                .max_of((self.high - pc).abs())
                .max_of((self.low - pc).abs()),
            None => hl,
        }
    }
}

impl Hlc<f64> {
    pub fn from_bar(bar: &Bar) -> Self {
        Self::new(bar.high, bar.low, bar.close)
    }
}

impl From<&Bar> for Hlc<f64> {
    fn from(bar: &Bar) -> Self {
        Self::from_bar(bar)
    }
}

/// Validates a period parameter.
pub(crate) fn period_or_one(period: usize) -> usize {
    period.max(1)
}
