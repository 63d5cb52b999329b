//! Environment configuration for historical data retrieval.

use chrono::Duration;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::{Error, Result};

const DEFAULT_CACHE_DIR: &str = "./cache";

/// Settings shared by the cache and the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Root directory of the on-disk chunk cache.
    pub cache_dir: PathBuf,
    /// Overrides the per-time-frame staleness limit when set.
    pub max_out_of_date_secs: Option<i64>,
    /// Never contact the remote source.
    pub cache_only: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_out_of_date_secs: None,
            cache_only: false,
        }
    }
}

impl HistoryConfig {
    /// Load configuration from environment variables (and a `.env` file if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let max_out_of_date_secs = match env::var("TRADELAB_MAX_OUT_OF_DATE_SECS") {
            Ok(s) => Some(s.trim().parse::<i64>().map_err(|_| Error::Config {
                message: format!("TRADELAB_MAX_OUT_OF_DATE_SECS is not a number: {}", s),
            })?),
            Err(_) => None,
        };

        let cache_only = match env::var("TRADELAB_CACHE_ONLY") {
            Ok(s) => parse_flag(&s).ok_or_else(|| Error::Config {
                message: format!("TRADELAB_CACHE_ONLY is not a boolean: {}", s),
            })?,
            Err(_) => false,
        };

        Ok(Self {
            cache_dir: env::var("TRADELAB_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR)),
            max_out_of_date_secs,
            cache_only,
        })
    }

    pub fn max_out_of_date(&self) -> Option<Duration> {
        self.max_out_of_date_secs.map(Duration::seconds)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
