//! Error types for the market data core.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Index {index} out of range for series holding {len} values")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Series is empty")]
    EmptySeries,

    #[error("Invalid time frame: {0}")]
    InvalidTimeFrame(String),

    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Batch is not sorted by time at position {position}")]
    UnsortedBatch { position: usize },

    #[error("Live update at {time} is older than the last item at {last}")]
    StaleUpdate {
        time: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
