//! Generic JSON-over-HTTP bar endpoint.
//!
//! `GET {base_url}/bars?symbol=..&timeframe=..&start=..&end=..&limit=..` with a
//! percent-encoded query and `start`/`end` in epoch milliseconds, answering a
//! JSON array of `{"t": <ms>, "o": .., "h": .., "l": .., "c": .., "v": ..}` sorted by time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use market_core::{Bar, TimeFrame};

use crate::cache_file::SourceId;
use crate::error::{HistoryError, Result};
use crate::source::{FetchRequest, HistoricalSource};

#[derive(Debug, Clone, Deserialize)]
struct RestBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

impl RestBar {
    fn into_bar(self) -> Option<Bar> {
        let time = DateTime::from_timestamp_millis(self.t)?;
        Some(Bar::new(time, self.o, self.h, self.l, self.c, self.v))
    }
}

#[derive(Debug, Clone)]
pub struct RestSource {
    id: SourceId,
    base_url: String,
    http_client: reqwest::Client,
    page_limit: usize,
}

impl RestSource {
    /// Maximum attempts per page.
    const MAX_RETRIES: u32 = 3;
    pub const DEFAULT_PAGE_LIMIT: usize = 1_000;

    pub fn new(id: SourceId, base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .connect_timeout(StdDuration::from_secs(10))
            .build()?;
        Ok(Self {
            id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            page_limit: Self::DEFAULT_PAGE_LIMIT,
        })
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    fn bars_url(&self) -> String {
        format!("{}/bars", self.base_url)
    }

    /// Query pairs for one page; the client percent-encodes them.
    fn page_query(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", symbol.to_string()),
            ("timeframe", timeframe.to_string()),
            ("start", start.timestamp_millis().to_string()),
            ("end", end.timestamp_millis().to_string()),
            ("limit", self.page_limit.to_string()),
        ]
    }

    /// GET with retry and exponential backoff on 429 and 5xx responses.
    async fn get_with_retry(&self, query: &[(&'static str, String)]) -> Result<reqwest::Response> {
        let url = self.bars_url();
        let mut last_error = None;

        for attempt in 0..Self::MAX_RETRIES {
            match self.http_client.get(&url).query(query).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response)
                    if response.status().as_u16() == 429 || response.status().is_server_error() =>
                {
                    let status = response.status();
                    let rate_limited = status.as_u16() == 429;
                    warn!(
                        attempt = attempt + 1,
                        status = %status,
                        url = %url,
                        rate_limited,
                        "Retryable source error, backing off"
                    );
                    last_error = Some(HistoryError::Source {
                        message: format!("{}: {}", if rate_limited { "Rate limited" } else { "Server error" }, status),
                        status: Some(status.as_u16()),
                    });
                    if attempt + 1 < Self::MAX_RETRIES {
                        let base = if rate_limited { 2_000 } else { 500 };
                        tokio::time::sleep(StdDuration::from_millis(base * 2u64.pow(attempt))).await;
                    }
                    continue;
                }
                Ok(response) => {
                    return Err(HistoryError::Source {
                        message: format!("Source error: {}", response.status()),
                        status: Some(response.status().as_u16()),
                    });
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, url = %url, "Request failed, backing off");
                    last_error = Some(HistoryError::from(e));
                }
            }

            if attempt + 1 < Self::MAX_RETRIES {
                tokio::time::sleep(StdDuration::from_millis(500 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_error.unwrap_or(HistoryError::Source {
            message: "Max retries exceeded".to_string(),
            status: None,
        }))
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let mut bars: Vec<Bar> = Vec::new();
        let mut cursor = start;
        let mut pages = 0u32;

        while cursor <= end {
            let query = self.page_query(symbol, timeframe, cursor, end);
            let page: Vec<RestBar> = self.get_with_retry(&query).await?.json().await?;
            pages += 1;

            let received = page.len();
            let page_bars = parse_page(page, cursor, end);
            let Some(last) = page_bars.last().map(|b| b.open_time) else {
                break;
            };
            bars.extend(page_bars);

            if received < self.page_limit {
                break;
            }
            cursor = last + timeframe.step();
        }

        debug!(symbol, timeframe = %timeframe, count = bars.len(), pages, "Fetched bars");
        Ok(bars)
    }
}

/// Range to fetch before `request.start` when only `have` items came back.
fn rewind_range(request: &FetchRequest, have: usize) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let missing = request.min_items.checked_sub(have).filter(|m| *m > 0)?;
    let missing = i32::try_from(missing).unwrap_or(i32::MAX);
    let end = request.start - request.timeframe.step();
    let start = request
        .start
        .checked_sub_signed(request.timeframe.approximate_span() * missing)?;
    Some((start, end))
}

/// Bars inside `[start, end]`, dropping entries with unrepresentable times.
fn parse_page(page: Vec<RestBar>, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar> {
    page.into_iter()
        .filter_map(RestBar::into_bar)
        .filter(|b| start <= b.open_time && b.open_time <= end)
        .collect()
}

#[async_trait]
impl HistoricalSource<Bar> for RestSource {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>> {
        if request.timeframe.is_tick() {
            return Err(HistoryError::Source {
                message: "bars endpoint does not serve ticks".to_string(),
                status: None,
            });
        }

        let mut bars = self
            .fetch_range(&request.symbol, request.timeframe, request.start, request.end)
            .await?;

        // Rewind once when the range was too thin.
        if let Some((rewind_start, rewind_end)) = rewind_range(request, bars.len()) {
            debug!(
                symbol = %request.symbol,
                have = bars.len(),
                min_items = request.min_items,
                from = %rewind_start,
                "Rewinding for more items"
            );
            let mut earlier = self
                .fetch_range(&request.symbol, request.timeframe, rewind_start, rewind_end)
                .await?;
            earlier.append(&mut bars);
            bars = earlier;
        }

        Ok(bars)
    }
}
