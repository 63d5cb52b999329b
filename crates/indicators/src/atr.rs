//! Average True Range with Wilder smoothing.
//!
//! The first true range is `high - low`. The first ATR is the simple average of
//! the first `period` true ranges; after that
//! `ATR = (prev_ATR * (period - 1) + TR) / period`.

use crate::numeric::Numeric;
use crate::traits::{period_or_one, Hlc, Indicator};

#[derive(Debug, Clone)]
pub struct Atr<T: Numeric = f64> {
    period: usize,
    prev_close: Option<T>,
    seen: usize,
    seed_sum: T,
    value: Option<T>,
}

impl<T: Numeric> Atr<T> {
    pub fn new(period: usize) -> Self {
        Self {
            period: period_or_one(period),
            prev_close: None,
            seen: 0,
            seed_sum: T::zero(),
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl<T: Numeric> Indicator for Atr<T> {
    type Input = Hlc<T>;
    type Output = T;

    fn name(&self) -> String {
        format!("ATR({})", self.period)
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn next(&mut self, input: &Hlc<T>) -> Option<T> {
        let tr = input.true_range(self.prev_close);
        self.prev_close = Some(input.close);

        let n = T::from_usize(self.period);
        self.value = match self.value {
            Some(prev) => Some((prev * (n - T::one()) + tr) / n),
            None => {
                self.seen += 1;
                self.seed_sum = self.seed_sum + tr;
                (self.seen == self.period).then(|| self.seed_sum / n)
            }
        };
        self.value
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.seen = 0;
        self.seed_sum = T::zero();
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    /// Twenty bars with a mix of inside bars, gaps up and gaps down.
    fn reference_bars() -> Vec<Hlc<f64>> {
        let raw: [(f64, f64, f64); 20] = [
            (48.70, 47.79, 48.16),
            (48.72, 48.14, 48.61),
            (48.90, 48.39, 48.75),
            (48.87, 48.37, 48.63),
            (48.82, 48.24, 48.74),
            (49.05, 48.64, 49.03),
            (49.20, 48.94, 49.07),
            (49.35, 48.86, 49.32),
            (49.92, 49.50, 49.91),
            (50.19, 49.87, 50.13),
            (50.12, 49.20, 49.53),
            (49.66, 48.90, 49.50),
            (49.88, 49.43, 49.75),
            (50.19, 49.73, 50.03),
            (50.36, 49.26, 50.31),
            (50.57, 50.09, 50.52),
            (50.65, 50.30, 50.41),
            (50.43, 49.21, 49.34),
            (49.63, 48.98, 49.37),
            (50.33, 49.61, 50.23),
        ];
        raw.iter().map(|&(h, l, c)| Hlc::new(h, l, c)).collect()
    }

    /// Straightforward batch evaluation used as the reference.
    fn reference_atr(bars: &[Hlc<f64>], period: usize) -> Vec<Option<f64>> {
        let mut tr = Vec::with_capacity(bars.len());
        for (i, bar) in bars.iter().enumerate() {
            let prev = if i == 0 { None } else { Some(bars[i - 1].close) };
            tr.push(bar.true_range(prev));
        }
        let mut out = vec![None; bars.len()];
        if bars.len() < period {
            return out;
        }
        let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
        out[period - 1] = Some(atr);
        for i in period..bars.len() {
            atr = (atr * (period as f64 - 1.0) + tr[i]) / period as f64;
            out[i] = Some(atr);
        }
        out
    }

    #[test]
    fn test_atr_matches_reference_at_bar_19() {
        let bars = reference_bars();
        let mut atr = Atr::<f64>::new(14);
        let outputs: Vec<Option<f64>> = bars.iter().map(|b| atr.next(b)).collect();
        let expected = reference_atr(&bars, 14);

        assert!(outputs[..13].iter().all(|v| v.is_none()));
        let got = outputs[19].unwrap();
        let want = expected[19].unwrap();
        assert!(((got - want) / want).abs() < 1e-9, "got {got}, want {want}");
        let hand_computed = 0.641_896_373_732_155_5;
        assert!(((got - hand_computed) / hand_computed).abs() < 1e-9, "got {got}");
    }

    #[test]
    fn test_atr_small_period() {
        let bars = [
            Hlc::new(102.0, 98.0, 101.0),
            Hlc::new(104.0, 99.0, 103.0),
            Hlc::new(106.0, 101.0, 105.0),
            Hlc::new(108.0, 103.0, 107.0),
        ];
        let mut atr = Atr::<f64>::new(3);
        assert_eq!(atr.next(&bars[0]), None);
        assert_eq!(atr.next(&bars[1]), None);
        let first = atr.next(&bars[2]).unwrap();
        assert!((first - 14.0 / 3.0).abs() < 1e-12);
        let second = atr.next(&bars[3]).unwrap();
        assert!((second - (first * 2.0 + 5.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_atr_in_decimal() {
        let d = |v: i64| Decimal::new(v, 0);
        let mut atr = Atr::<Decimal>::new(2);
        assert_eq!(atr.next(&Hlc::new(d(10), d(8), d(9))), None);
        // TR = max(3, |11 - 9|, |8 - 9|) = 3; ATR = (2 + 3) / 2
        assert_eq!(atr.next(&Hlc::new(d(11), d(8), d(10))), Some(Decimal::new(25, 1)));
    }
}
