//! Deterministic generated bars.
//!
//! Every bar is a pure function of the seed and its open time, so any chunk can
//! be produced independently and repeated fetches return identical data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use market_core::{Bar, TimeFrame};

use crate::cache_file::SourceId;
use crate::codec::to_ticks;
use crate::error::{HistoryError, Result};
use crate::source::{FetchRequest, HistoricalSource};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    id: SourceId,
    seed: u64,
    base_price: f64,
    /// Relative size of per-bar noise.
    volatility: f64,
    listed_from: Option<DateTime<Utc>>,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            id: SourceId::new("synthetic"),
            seed,
            base_price: 100.0,
            volatility: 0.004,
            listed_from: None,
        }
    }

    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = price;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    /// No data exists before `t`.
    pub fn with_listing_date(mut self, t: DateTime<Utc>) -> Self {
        self.listed_from = Some(t);
        self
    }

    fn rng_at(&self, t: DateTime<Utc>) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ (to_ticks(t) as u64).rotate_left(17))
    }

    /// Price at `t`: slow cycles plus per-instant noise.
    pub fn price_at(&self, t: DateTime<Utc>) -> f64 {
        let days = t.timestamp() as f64 / SECONDS_PER_DAY;
        let phase = (self.seed % 360) as f64;
        let cycle = 0.12 * ((days / 90.0 + phase) * std::f64::consts::TAU).sin()
            + 0.04 * ((days / 7.0 + phase / 3.0) * std::f64::consts::TAU).sin()
            + 0.01 * ((days + phase / 7.0) * std::f64::consts::TAU).sin();
        let noise: f64 = self.rng_at(t).gen_range(-1.0..1.0);
        self.base_price * (cycle + self.volatility * noise).exp()
    }

    pub fn bar_at(&self, t: DateTime<Utc>, timeframe: TimeFrame) -> Bar {
        let open = self.price_at(t - timeframe.step());
        let close = self.price_at(t);
        let mut rng = self.rng_at(t);
        // First draw is the close noise.
        let _: f64 = rng.gen();
        let wick_up: f64 = rng.gen_range(0.0..1.0) * self.volatility;
        let wick_down: f64 = rng.gen_range(0.0..1.0) * self.volatility;
        let volume: f64 = 1_000.0 * (1.0 + rng.gen_range(0.0..1.0));
        Bar::new(
            t,
            open,
            open.max(close) * (1.0 + wick_up),
            open.min(close) * (1.0 - wick_down),
            close,
            volume,
        )
    }
}

#[async_trait]
impl HistoricalSource<Bar> for SyntheticSource {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>> {
        let timeframe = request.timeframe;
        if timeframe.is_tick() {
            return Err(HistoryError::Source {
                message: "synthetic source only produces bars".to_string(),
                status: None,
            });
        }

        let mut t = timeframe.period_start(request.start);
        if t < request.start {
            t = timeframe.next_period_start(t);
        }
        if let Some(listed) = self.listed_from {
            t = t.max(timeframe.period_start(listed));
        }

        let mut bars = Vec::new();
        while t <= request.end {
            bars.push(self.bar_at(t, timeframe));
            t += timeframe.step();
        }
        Ok(bars)
    }
}
