//! Error types for historical data retrieval.
//!
//! Errors are `Clone` because concurrent callers waiting on the same
//! retrieval job all receive the job's outcome.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use market_core::ItemKind;

#[derive(Error, Debug, Clone)]
pub enum HistoryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("HTTP request error: {0}")]
    Http(Arc<reqwest::Error>),

    #[error("Corrupt cache file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Cache file {path} holds {found:?} records, expected {expected:?}")]
    KindMismatch {
        path: PathBuf,
        expected: ItemKind,
        found: ItemKind,
    },

    #[error("Source error: {message}")]
    Source { message: String, status: Option<u16> },

    #[error("Retrieval of {series} faulted at chunk {chunk}: {message}")]
    SourceFault {
        series: String,
        chunk: String,
        message: String,
    },

    #[error("Retrieval cancelled")]
    Cancelled,

    #[error(transparent)]
    Market(#[from] market_core::Error),
}

impl HistoryError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        HistoryError::Io {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, HistoryError::Cancelled)
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Json(Arc::new(err))
    }
}

impl From<reqwest::Error> for HistoryError {
    fn from(err: reqwest::Error) -> Self {
        HistoryError::Http(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, HistoryError>;
