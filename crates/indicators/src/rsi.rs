//! Relative Strength Index with Wilder smoothing.

use crate::numeric::Numeric;
use crate::traits::{period_or_one, Indicator};

#[derive(Debug, Clone)]
pub struct Rsi<T: Numeric = f64> {
    period: usize,
    prev: Option<T>,
    seen: usize,
    gain_sum: T,
    loss_sum: T,
    averages: Option<(T, T)>,
}

impl<T: Numeric> Rsi<T> {
    pub fn new(period: usize) -> Self {
        Self {
            period: period_or_one(period),
            prev: None,
            seen: 0,
            gain_sum: T::zero(),
            loss_sum: T::zero(),
            averages: None,
        }
    }

    fn value(avg_gain: T, avg_loss: T) -> T {
        let hundred = T::from_usize(100);
        if avg_loss == T::zero() {
            return hundred;
        }
        let rs = avg_gain / avg_loss;
        hundred - hundred / (T::one() + rs)
    }
}

impl<T: Numeric> Indicator for Rsi<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> String {
        format!("RSI({})", self.period)
    }

    /// One change needs two prices, so `period` changes need `period` past inputs.
    fn lookback(&self) -> usize {
        self.period
    }

    fn next(&mut self, input: &T) -> Option<T> {
        let price = *input;
        let prev = self.prev.replace(price)?;

        let change = price - prev;
        let (gain, loss) = if change > T::zero() {
            (change, T::zero())
        } else {
            (T::zero(), T::zero() - change)
        };

        let n = T::from_usize(self.period);
        let averages = match self.averages {
            Some((g, l)) => Some((
                (g * (n - T::one()) + gain) / n,
                (l * (n - T::one()) + loss) / n,
            )),
            None => {
                self.seen += 1;
                self.gain_sum = self.gain_sum + gain;
                self.loss_sum = self.loss_sum + loss;
                (self.seen == self.period).then(|| (self.gain_sum / n, self.loss_sum / n))
            }
        };
        self.averages = averages;
        averages.map(|(g, l)| Self::value(g, l))
    }

    fn reset(&mut self) {
        self.prev = None;
        self.seen = 0;
        self.gain_sum = T::zero();
        self.loss_sum = T::zero();
        self.averages = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_bounds() {
        let mut rsi = Rsi::<f64>::new(3);
        let rising: Vec<Option<f64>> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .iter()
            .map(|p| rsi.next(p))
            .collect();
        assert_eq!(&rising[..3], &[None, None, None]);
        assert_eq!(rising[3], Some(100.0));

        let mut rsi = Rsi::<f64>::new(2);
        rsi.next(&5.0);
        rsi.next(&4.0);
        assert_eq!(rsi.next(&3.0), Some(0.0));
    }

    #[test]
    fn test_rsi_mixed() {
        let mut rsi = Rsi::<f64>::new(2);
        rsi.next(&10.0);
        rsi.next(&12.0); // +2
        let v = rsi.next(&11.0).unwrap(); // -1: avg gain 1, avg loss 0.5
        assert!((v - (100.0 - 100.0 / 3.0)).abs() < 1e-12);
        assert_eq!(rsi.warmup_bars(), 3);
    }
}
