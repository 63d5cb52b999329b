//! Bar (OHLCV) and tick records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of record stored in a series or cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Bar,
    Tick,
}

/// A time-stamped record that can live in a [`MarketSeries`](crate::MarketSeries).
pub trait SeriesItem: Clone + Send + Sync + 'static {
    const KIND: ItemKind;

    /// Time the record belongs to (bar open time or tick time).
    fn time(&self) -> DateTime<Utc>;
}

/// One OHLCV sample for a fixed interval.
///
/// `high >= max(open, close)` and `low <= min(open, close)` are expected but not
/// enforced: external sources occasionally violate them and consumers must cope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Start of the bar interval (UTC).
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Whether the OHLC values are internally consistent.
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }

    /// True range against the previous close; plain high-low when there is none.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        match prev_close {
            Some(pc) => hl.max((self.high - pc).abs()).max((self.low - pc).abs()),
            None => hl,
        }
    }

    /// Fold a newer price into a forming bar.
    pub fn merge_price(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }
}

impl SeriesItem for Bar {
    const KIND: ItemKind = ItemKind::Bar;

    fn time(&self) -> DateTime<Utc> {
        self.open_time
    }
}

/// A quote update. Either side may be `NaN` when only one side changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    pub fn new(time: DateTime<Utc>, bid: f64, ask: f64) -> Self {
        Self { time, bid, ask }
    }

    /// Mid price, or whichever side is known.
    pub fn mid(&self) -> Option<f64> {
        match (self.bid.is_nan(), self.ask.is_nan()) {
            (false, false) => Some((self.bid + self.ask) / 2.0),
            (false, true) => Some(self.bid),
            (true, false) => Some(self.ask),
            (true, true) => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        if self.bid.is_nan() || self.ask.is_nan() {
            None
        } else {
            Some(self.ask - self.bid)
        }
    }
}

impl SeriesItem for Tick {
    const KIND: ItemKind = ItemKind::Tick;

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}
