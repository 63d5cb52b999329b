//! Historical market data: chunked on-disk cache and cache-first retrieval.
//!
//! This crate provides:
//! - A binary cache file per calendar chunk with backups and staleness rules
//! - An explicitly owned registry handing out one cache file per chunk key
//! - The remote source contract and two bundled sources
//! - A provider that fills market series from memory, disk or the source

pub mod cache_file;
pub mod clock;
pub mod codec;
pub mod error;
pub mod load_result;
pub mod provider;
pub mod source;
pub mod sources;

pub use cache_file::{CacheContents, CacheFile, CacheKey, CacheRegistry, SourceId};
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{CacheHeader, CacheRecord};
pub use error::{HistoryError, Result};
pub use load_result::{DataLoadResult, LoadOrigin, RetrievalSummary};
pub use provider::{DataRequest, HistoricalDataProvider, ProviderMode};
pub use source::{FetchRequest, HistoricalSource};
pub use sources::{RestSource, SyntheticSource};
