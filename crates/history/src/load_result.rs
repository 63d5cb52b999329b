//! Outcomes of retrieval attempts.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where the data for a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrigin {
    /// Already in the in-memory series and fresh.
    AlreadyLoaded,
    /// Read from the on-disk cache.
    Cache,
    /// Fetched from the remote source.
    Remote,
    /// Nothing could be obtained without contacting the source (cache-only mode).
    Unavailable,
}

/// Result of retrieving one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataLoadResult {
    pub requested_start: DateTime<Utc>,
    pub requested_end: DateTime<Utc>,
    pub available_start: Option<DateTime<Utc>>,
    pub available_end: Option<DateTime<Utc>>,
    /// Items in the requested range after the load.
    pub count: usize,
    pub origin: LoadOrigin,
    /// The available range does not reach the end of the requested range.
    pub partial: bool,
    pub faulted: bool,
    pub fault: Option<String>,
}

impl DataLoadResult {
    pub fn new(requested_start: DateTime<Utc>, requested_end: DateTime<Utc>, origin: LoadOrigin) -> Self {
        Self {
            requested_start,
            requested_end,
            available_start: None,
            available_end: None,
            count: 0,
            origin,
            partial: false,
            faulted: false,
            fault: None,
        }
    }

    pub fn with_available(mut self, start: DateTime<Utc>, end: DateTime<Utc>, count: usize) -> Self {
        self.available_start = Some(start);
        self.available_end = Some(end);
        self.partial = end < self.requested_end;
        self.count = count;
        self
    }

    pub fn faulted(mut self, message: impl Into<String>) -> Self {
        self.faulted = true;
        self.fault = Some(message.into());
        self
    }

    pub fn is_available(&self) -> bool {
        self.available_start.is_some() && !self.faulted
    }
}

/// Result of a whole backward walk.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalSummary {
    pub series: String,
    pub chunks: usize,
    pub already_loaded: usize,
    pub from_cache: usize,
    pub fetched: usize,
    pub unavailable: usize,
    /// The walk stopped after too many consecutive empty chunks.
    pub gave_up: bool,
    pub data_start: Option<DateTime<Utc>>,
    pub data_end: Option<DateTime<Utc>>,
    /// Items between the requested start and the walk boundary.
    pub count: usize,
}

impl RetrievalSummary {
    pub(crate) fn record(&mut self, result: &DataLoadResult) {
        self.chunks += 1;
        match result.origin {
            LoadOrigin::AlreadyLoaded => self.already_loaded += 1,
            LoadOrigin::Cache => self.from_cache += 1,
            LoadOrigin::Remote => self.fetched += 1,
            LoadOrigin::Unavailable => self.unavailable += 1,
        }
    }
}
