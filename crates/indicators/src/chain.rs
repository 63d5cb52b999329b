//! Indicator composition.

use crate::traits::Indicator;

/// Feeds every defined output of `first` into `second`, e.g. an SMA of ATR.
///
/// Lookbacks add up: `second` only starts receiving inputs once `first` is warm.
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B> Chain<A, B>
where
    A: Indicator,
    B: Indicator<Input = A::Output>,
{
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }
}

impl<A, B> Indicator for Chain<A, B>
where
    A: Indicator,
    B: Indicator<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn name(&self) -> String {
        format!("{}[{}]", self.second.name(), self.first.name())
    }

    fn lookback(&self) -> usize {
        self.first.lookback() + self.second.lookback()
    }

    fn next(&mut self, input: &A::Input) -> Option<B::Output> {
        let upstream = self.first.next(input)?;
        self.second.next(&upstream)
    }

    fn reset(&mut self) {
        self.first.reset();
        self.second.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atr::Atr;
    use crate::sma::Sma;
    use crate::traits::Hlc;

    #[test]
    fn test_sma_of_atr_lookback_is_additive() {
        let mut chain = Chain::new(Atr::<f64>::new(3), Sma::<f64>::new(2));
        assert_eq!(chain.lookback(), 3);
        assert_eq!(chain.warmup_bars(), 4);
        assert_eq!(chain.name(), "SMA(2)[ATR(3)]");

        let bar = Hlc::new(11.0, 9.0, 10.0);
        let outputs: Vec<_> = (0..5).map(|_| chain.next(&bar)).collect();
        assert_eq!(&outputs[..3], &[None, None, None]);
        assert_eq!(outputs[3], Some(2.0));
        assert_eq!(outputs[4], Some(2.0));
    }
}
