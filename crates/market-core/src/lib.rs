//! Core market data types for the trading lab.
//!
//! This crate provides:
//! - Time frames and calendar chunk rules
//! - Bar and tick records
//! - Windowed data series indexed back from the most recent value
//! - Market series with gap bookkeeping and change notifications
//! - Cancellation and environment configuration shared by the other crates

pub mod bar;
pub mod cancel;
pub mod config;
pub mod data_series;
pub mod error;
pub mod market_series;
pub mod range_set;
pub mod shared;
pub mod timeframe;

pub use bar::{Bar, ItemKind, SeriesItem, Tick};
pub use cancel::CancelToken;
pub use config::HistoryConfig;
pub use data_series::DataSeries;
pub use error::{Error, Result};
pub use market_series::{ImportSummary, MarketSeries, SeriesEvent, SeriesKey};
pub use range_set::{RangeSet, TimeRange};
pub use shared::{SeriesRegistry, SharedSeries};
pub use timeframe::{ChunkGranularity, TimeFrame, TimeFrameUnit, TIME_RESOLUTION_NANOS};
