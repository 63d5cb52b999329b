//! An indicator bound to its output window.

use market_core::{DataSeries, Error, Result};

use crate::traits::Indicator;

/// Runs an indicator one input at a time and keeps its outputs in a
/// [`DataSeries`], `[0]` being the most recent.
///
/// Undefined outputs (during warm-up) are stored as `None`, so the window size
/// always matches the number of inputs seen, up to the retention budget.
#[derive(Debug, Clone)]
pub struct IndicatorSeries<I: Indicator + Clone> {
    indicator: I,
    outputs: DataSeries<Option<I::Output>>,
    revisable: bool,
    before_last: Option<I>,
}

impl<I: Indicator + Clone> IndicatorSeries<I> {
    /// Retains `lookback + 1` outputs.
    pub fn new(indicator: I) -> Self {
        let capacity = indicator.lookback() + 1;
        Self::with_capacity(indicator, capacity)
    }

    /// Retains at most `capacity` outputs.
    pub fn with_capacity(indicator: I, capacity: usize) -> Self {
        Self {
            indicator,
            outputs: DataSeries::with_capacity(capacity),
            revisable: false,
            before_last: None,
        }
    }

    /// Keep a snapshot of the indicator before each step so that [`revise`]
    /// can recompute the last output. Costs one indicator clone per update.
    ///
    /// [`revise`]: IndicatorSeries::revise
    pub fn with_revisions(mut self) -> Self {
        self.revisable = true;
        self
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn name(&self) -> String {
        self.indicator.name()
    }

    pub fn lookback(&self) -> usize {
        self.indicator.lookback()
    }

    /// Step with a new (closed) input and append the output.
    pub fn update(&mut self, input: &I::Input) -> Option<I::Output> {
        if self.revisable {
            self.before_last = Some(self.indicator.clone());
        }
        let value = self.indicator.next(input);
        self.outputs.add(value);
        value
    }

    /// Recompute the most recent output for a revised input (a forming bar).
    /// Fails with [`Error::EmptySeries`] unless built [`with_revisions`] and
    /// updated at least once.
    ///
    /// [`with_revisions`]: IndicatorSeries::with_revisions
    pub fn revise(&mut self, input: &I::Input) -> Result<Option<I::Output>> {
        let mut indicator = self.before_last.clone().ok_or(Error::EmptySeries)?;
        let value = indicator.next(input);
        self.outputs.update_last(value)?;
        self.indicator = indicator;
        Ok(value)
    }

    /// Output `back` steps behind the most recent one. Out of range is an error;
    /// a warm-up slot is `Ok(None)`.
    pub fn get(&self, back: usize) -> Result<Option<I::Output>> {
        self.outputs.value(back)
    }

    /// Most recent output, `None` when undefined or nothing computed yet.
    pub fn current(&self) -> Option<I::Output> {
        self.outputs.last().copied().flatten()
    }

    /// Whether the most recent output is defined.
    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    pub fn outputs(&self) -> &DataSeries<Option<I::Output>> {
        &self.outputs
    }

    /// Number of inputs seen.
    pub fn count(&self) -> usize {
        self.outputs.count()
    }

    pub fn reset(&mut self) {
        self.indicator.reset();
        self.outputs.clear();
        self.before_last = None;
    }
}

impl<I> IndicatorSeries<I>
where
    I: Indicator<Output = f64> + Clone,
{
    /// Most recent output with `NaN` for undefined.
    pub fn current_or_nan(&self) -> f64 {
        self.current().unwrap_or(f64::NAN)
    }
}
