//! Incremental technical indicators.
//!
//! Every indicator implements [`Indicator`]: one step per new input, no access
//! to future values, `None` until enough history has been seen. Indicators
//! compose with [`Chain`] (lookbacks add up) and are bound to an output window
//! with [`IndicatorSeries`].

pub mod atr;
pub mod chain;
pub mod chandelier;
pub mod ema;
pub mod numeric;
pub mod rsi;
pub mod series;
pub mod sma;
pub mod traits;

pub use atr::Atr;
pub use chain::Chain;
pub use chandelier::{ChandelierExit, ChandelierLevels};
pub use ema::Ema;
pub use numeric::Numeric;
pub use rsi::Rsi;
pub use series::IndicatorSeries;
pub use sma::Sma;
pub use traits::{Hlc, Indicator};
