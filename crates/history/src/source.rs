//! Contract for remote historical data sources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use market_core::{SeriesItem, TimeFrame};

use crate::cache_file::SourceId;
use crate::error::Result;

#[cfg(test)]
use mockall::automock;

/// One retrieval request, `[start, end]` inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Sources that page backwards keep going until at least this many items
    /// were returned or the range is exhausted.
    pub min_items: usize,
}

/// A broker or exchange endpoint returning historical items.
///
/// Implementations return items sorted by time within the requested range, and
/// an error (never an empty list) when the request itself failed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HistoricalSource<T: SeriesItem>: Send + Sync {
    /// Identity used to key the on-disk cache.
    fn id(&self) -> SourceId;

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<T>>;
}
