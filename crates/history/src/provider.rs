//! Cache-first historical data retrieval.
//!
//! [`HistoricalDataProvider::get_data`] walks backwards one calendar chunk at a
//! time from a mode-dependent boundary towards the requested start. Each chunk
//! is served from the in-memory series when it is already there and fresh, then
//! from the on-disk cache, and only then from the remote source, whose result is
//! written back to the cache before being merged into the series.
//!
//! Retrieval for one series is serialized by the series' data lock, and
//! identical concurrent requests share a single in-flight job.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use market_core::{
    CancelToken, HistoryConfig, SeriesItem, SeriesKey, SeriesRegistry, SharedSeries, TimeFrame,
};

use crate::cache_file::{CacheKey, CacheRegistry, SourceId};
use crate::clock::{Clock, SystemClock};
use crate::codec::CacheRecord;
use crate::error::{HistoryError, Result};
use crate::load_result::{DataLoadResult, LoadOrigin, RetrievalSummary};
use crate::source::{FetchRequest, HistoricalSource};

/// How far the backward walk starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Bounded by the backtest's configured end.
    Backtest { end: DateTime<Utc> },
    /// Bounded by the requested end when `cache_only`, otherwise by now.
    Live { cache_only: bool },
}

/// Parameters of one [`HistoricalDataProvider::get_data`] call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataRequest {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Keep walking past `start` until this many items precede the boundary.
    pub desired_bars: Option<usize>,
    /// Ignore memory and disk, always fetch.
    pub force: bool,
}

impl DataRequest {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            desired_bars: None,
            force: false,
        }
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_desired_bars(mut self, bars: usize) -> Self {
        self.desired_bars = Some(bars);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JobKey {
    series: SeriesKey,
    request: DataRequest,
}

type Job = Shared<BoxFuture<'static, Result<RetrievalSummary>>>;

pub struct HistoricalDataProvider<T: CacheRecord> {
    source: Arc<dyn HistoricalSource<T>>,
    source_id: SourceId,
    cache: Arc<CacheRegistry<T>>,
    series: Arc<SeriesRegistry<T>>,
    mode: ProviderMode,
    max_out_of_date: Option<Duration>,
    clock: Arc<dyn Clock>,
    jobs: DashMap<JobKey, Job>,
    remote_fetches: AtomicUsize,
}

impl<T: CacheRecord> HistoricalDataProvider<T> {
    pub fn new(
        source: Arc<dyn HistoricalSource<T>>,
        cache: Arc<CacheRegistry<T>>,
        mode: ProviderMode,
    ) -> Self {
        Self {
            source_id: source.id(),
            source,
            cache,
            series: Arc::new(SeriesRegistry::new()),
            mode,
            max_out_of_date: None,
            clock: Arc::new(SystemClock),
            jobs: DashMap::new(),
            remote_fetches: AtomicUsize::new(0),
        }
    }

    /// Provider over a cache rooted at the configured directory. A cache-only
    /// configuration turns live mode into cache-only live mode.
    pub fn from_config(
        source: Arc<dyn HistoricalSource<T>>,
        config: &HistoryConfig,
        mode: ProviderMode,
    ) -> Self {
        let mode = match mode {
            ProviderMode::Live { cache_only } => ProviderMode::Live {
                cache_only: cache_only || config.cache_only,
            },
            other => other,
        };
        let mut provider = Self::new(source, Arc::new(CacheRegistry::new(&config.cache_dir)), mode);
        provider.max_out_of_date = config.max_out_of_date();
        provider
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_out_of_date(mut self, max_out_of_date: Duration) -> Self {
        self.max_out_of_date = Some(max_out_of_date);
        self
    }

    /// Share a series registry with other components (simulations, other providers).
    pub fn with_series_registry(mut self, series: Arc<SeriesRegistry<T>>) -> Self {
        self.series = series;
        self
    }

    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn cache(&self) -> &Arc<CacheRegistry<T>> {
        &self.cache
    }

    pub fn series_registry(&self) -> &Arc<SeriesRegistry<T>> {
        &self.series
    }

    /// Number of requests sent to the remote source so far.
    pub fn remote_fetches(&self) -> usize {
        self.remote_fetches.load(Ordering::Relaxed)
    }

    pub fn series(&self, symbol: &str, timeframe: TimeFrame) -> Arc<SharedSeries<T>> {
        self.series.get_or_create(symbol, timeframe)
    }

    fn cache_only(&self) -> bool {
        matches!(self.mode, ProviderMode::Live { cache_only: true })
    }

    fn max_out_of_date_for(&self, timeframe: TimeFrame) -> Duration {
        self.max_out_of_date
            .unwrap_or_else(|| timeframe.default_max_out_of_date())
    }

    fn boundary(&self, request: &DataRequest, timeframe: TimeFrame, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.mode {
            ProviderMode::Backtest { end } => end.min(now),
            ProviderMode::Live { cache_only: true } => request.end.unwrap_or(now).min(now),
            ProviderMode::Live { cache_only: false } => now + timeframe.step(),
        }
    }

    /// Make sure `[start, end]` of `symbol`/`timeframe` is loaded and return the series.
    pub async fn ensure_data_available(
        self: &Arc<Self>,
        symbol: &str,
        timeframe: TimeFrame,
        request: DataRequest,
        cancel: &CancelToken,
    ) -> Result<(Arc<SharedSeries<T>>, RetrievalSummary)> {
        let series = self.series(symbol, timeframe);
        let summary = self.get_data(&series, request, cancel).await?;
        Ok((series, summary))
    }

    /// Walk backwards chunk by chunk until `request` is satisfied.
    ///
    /// Concurrent calls with the same series and request await the same job, run
    /// under the first caller's cancellation token.
    pub async fn get_data(
        self: &Arc<Self>,
        series: &Arc<SharedSeries<T>>,
        request: DataRequest,
        cancel: &CancelToken,
    ) -> Result<RetrievalSummary> {
        let key = JobKey {
            series: series.key().clone(),
            request: request.clone(),
        };

        let job = match self.jobs.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(series = %key.series, "Joining in-flight retrieval");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let provider = Arc::clone(self);
                let series = Arc::clone(series);
                let cancel = cancel.clone();
                let job = async move { provider.walk(&series, request, &cancel).await }
                    .boxed()
                    .shared();
                entry.insert(job.clone());
                job
            }
        };

        let result = job.clone().await;
        self.jobs.remove_if(&key, |_, j| j.ptr_eq(&job));
        result
    }

    async fn walk(
        &self,
        series: &SharedSeries<T>,
        request: DataRequest,
        cancel: &CancelToken,
    ) -> Result<RetrievalSummary> {
        let _guard = tokio::select! {
            guard = series.data_lock() => guard,
            _ = cancel.cancelled() => return Err(HistoryError::Cancelled),
        };

        let key = series.key().clone();
        let timeframe = key.timeframe;
        let granularity = timeframe.chunk_granularity();
        let now = self.clock.now();
        let boundary = self.boundary(&request, timeframe, now);
        let give_up = timeframe.give_up_span();

        info!(
            series = %key,
            start = %request.start,
            boundary = %boundary,
            desired_bars = ?request.desired_bars,
            force = request.force,
            "Retrieving history"
        );

        let mut summary = RetrievalSummary {
            series: key.to_string(),
            ..Default::default()
        };
        let mut chunk_start = granularity.chunk_start(boundary);
        let mut empty_span = Duration::zero();

        loop {
            if cancel.is_cancelled() {
                return Err(HistoryError::Cancelled);
            }

            if chunk_start <= now {
                // Past the requested start, ask the source for what is still missing.
                let min_items = match request.desired_bars {
                    Some(n) if chunk_start <= request.start => {
                        n.saturating_sub(series.read().await.count_between(chunk_start, boundary))
                    }
                    _ => 0,
                };
                let result = self
                    .get_data_for_chunk(series, chunk_start, request.force, min_items, cancel)
                    .await?;
                if result.faulted {
                    let message = result.fault.unwrap_or_default();
                    error!(series = %key, chunk = %chunk_start, error = %message, "Chunk retrieval faulted");
                    return Err(HistoryError::SourceFault {
                        series: key.to_string(),
                        chunk: chunk_start.to_rfc3339(),
                        message,
                    });
                }
                summary.record(&result);

                if result.count == 0 {
                    empty_span = empty_span + (granularity.chunk_end(chunk_start) - chunk_start);
                    if empty_span >= give_up {
                        info!(
                            series = %key,
                            chunk = %chunk_start,
                            empty_days = empty_span.num_days(),
                            "No data for too long, giving up"
                        );
                        summary.gave_up = true;
                        break;
                    }
                } else {
                    empty_span = Duration::zero();
                }
            }

            if chunk_start <= request.start {
                let enough = match request.desired_bars {
                    None => true,
                    Some(n) => series.read().await.count_between(chunk_start, boundary) >= n,
                };
                if enough {
                    break;
                }
            }
            chunk_start = granularity.previous(chunk_start);
        }

        let data = series.read().await;
        summary.data_start = data.data_start();
        summary.data_end = data.data_end();
        summary.count = data.count_between(request.start, boundary);
        drop(data);

        info!(
            series = %key,
            chunks = summary.chunks,
            fetched = summary.fetched,
            from_cache = summary.from_cache,
            count = summary.count,
            gave_up = summary.gave_up,
            "History retrieved"
        );
        Ok(summary)
    }

    /// Load the chunk starting at (or containing) `chunk_start` into `series`.
    ///
    /// Callers hold the series' data lock. Source failures are reported as a
    /// faulted result; cancellation and local I/O failures as errors.
    /// `min_items` is forwarded to the source, which may rewind before the
    /// chunk to reach it; only items inside the chunk are kept.
    pub async fn get_data_for_chunk(
        &self,
        series: &SharedSeries<T>,
        chunk_start: DateTime<Utc>,
        force: bool,
        min_items: usize,
        cancel: &CancelToken,
    ) -> Result<DataLoadResult> {
        let key = series.key();
        let timeframe = key.timeframe;
        let cache_key = CacheKey::for_time(self.source_id.clone(), &key.symbol, timeframe, chunk_start);
        let chunk_start = cache_key.chunk_start;
        let now = self.clock.now();
        let fetch_end = cache_key.last_item_time().min(now);
        let max_out_of_date = self.max_out_of_date_for(timeframe);

        if !force {
            let data = series.read().await;
            if let Some(data_end) = data.data_end() {
                let covered_end = data_end.min(fetch_end);
                let fresh = data_end >= fetch_end || now - data_end < max_out_of_date;
                if covered_end >= chunk_start && fresh && data.covers(chunk_start, covered_end) {
                    debug!(series = %key, chunk = %chunk_start, "Chunk already loaded");
                    let count = data.count_between(chunk_start, covered_end);
                    return Ok(DataLoadResult::new(chunk_start, fetch_end, LoadOrigin::AlreadyLoaded)
                        .with_available(chunk_start, covered_end, count));
                }
            }
        }

        let file = self.cache.get(cache_key);
        if !force || self.cache_only() {
            if let Some(contents) = file.load().await? {
                let usable = contents.header.start_date <= chunk_start
                    && (self.cache_only() || contents.is_fresh(now, max_out_of_date));
                if usable {
                    let (start, end) = (contents.header.start_date, contents.header.end_date);
                    let count = contents.items.len();
                    series.write().await.import(start, end, contents.items)?;
                    debug!(series = %key, chunk = %chunk_start, count, "Loaded chunk from cache");
                    return Ok(DataLoadResult::new(chunk_start, fetch_end, LoadOrigin::Cache)
                        .with_available(start, end, count));
                }
                debug!(series = %key, chunk = %chunk_start, "Cached chunk is stale");
            }
        }

        if self.cache_only() {
            debug!(series = %key, chunk = %chunk_start, "Chunk not cached, cache-only mode");
            return Ok(DataLoadResult::new(chunk_start, fetch_end, LoadOrigin::Unavailable));
        }

        let fetch = FetchRequest {
            symbol: key.symbol.clone(),
            timeframe,
            start: chunk_start,
            end: fetch_end,
            min_items,
        };
        self.remote_fetches.fetch_add(1, Ordering::Relaxed);

        let fetched = tokio::select! {
            result = self.source.fetch(&fetch) => result,
            _ = cancel.cancelled() => {
                warn!(series = %key, chunk = %chunk_start, "Chunk retrieval abandoned");
                return Err(HistoryError::Cancelled);
            }
        };

        let mut items = match fetched {
            Ok(items) => items,
            Err(e) => {
                warn!(series = %key, chunk = %chunk_start, error = %e, "Source fetch failed");
                return Ok(DataLoadResult::new(chunk_start, fetch_end, LoadOrigin::Remote)
                    .faulted(e.to_string()));
            }
        };
        items.retain(|i| chunk_start <= i.time() && i.time() <= fetch_end);
        items.sort_by_key(|i| i.time());
        items.dedup_by_key(|i| i.time());
        let count = items.len();

        file.save(chunk_start, fetch_end, items.clone(), now).await?;
        series.write().await.import(chunk_start, fetch_end, items)?;

        info!(series = %key, chunk = %chunk_start, count, "Fetched chunk from source");
        Ok(DataLoadResult::new(chunk_start, fetch_end, LoadOrigin::Remote)
            .with_available(chunk_start, fetch_end, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::source::MockHistoricalSource;
    use crate::sources::synthetic::SyntheticSource;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use market_core::Bar;
    use std::time::Duration as StdDuration;

    fn at(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap()
    }

    fn hourly(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar> {
        let mut out = Vec::new();
        let mut t = start;
        while t <= end {
            out.push(Bar::new(t, 1.0, 2.0, 0.5, 1.5, 1.0));
            t += Duration::hours(1);
        }
        out
    }

    fn mock_source(fetches: usize) -> MockHistoricalSource<Bar> {
        let mut source = MockHistoricalSource::<Bar>::new();
        source.expect_id().return_const(SourceId::new("mock"));
        source
            .expect_fetch()
            .times(fetches)
            .returning(|req| Ok(hourly(req.start, req.end)));
        source
    }

    fn provider(
        source: impl HistoricalSource<Bar> + 'static,
        root: &std::path::Path,
        now: DateTime<Utc>,
        mode: ProviderMode,
    ) -> Arc<HistoricalDataProvider<Bar>> {
        Arc::new(
            HistoricalDataProvider::new(Arc::new(source), Arc::new(CacheRegistry::new(root)), mode)
                .with_clock(Arc::new(FixedClock(now))),
        )
    }

    #[tokio::test]
    async fn test_second_call_does_not_fetch_again() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(2024, 3, 1);
        let p = provider(mock_source(1), dir.path(), now, ProviderMode::Backtest { end: at(2024, 2, 1) });
        let cancel = CancelToken::new();

        let (series, first) = p
            .ensure_data_available("BTCUSD", TimeFrame::H1, DataRequest::new(at(2024, 1, 10)), &cancel)
            .await
            .unwrap();
        assert_eq!(first.fetched, 1);
        assert_eq!(series.read().await.data_start(), Some(at(2024, 1, 1)));

        let second = p
            .get_data(&series, DataRequest::new(at(2024, 1, 10)), &cancel)
            .await
            .unwrap();
        assert_eq!(second.fetched, 0);
        assert_eq!(second.already_loaded, 1);
        assert_eq!(p.remote_fetches(), 1);
        assert_eq!(first.count, second.count);
    }

    #[tokio::test]
    async fn test_fresh_cache_is_used_across_providers() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(2024, 3, 1);
        let mode = ProviderMode::Backtest { end: at(2024, 2, 1) };
        let cancel = CancelToken::new();
        let request = DataRequest::new(at(2024, 1, 10));

        let first = provider(mock_source(1), dir.path(), now, mode);
        first
            .ensure_data_available("X", TimeFrame::H1, request.clone(), &cancel)
            .await
            .unwrap();

        let second = provider(mock_source(0), dir.path(), now + Duration::hours(1), mode);
        let (series, summary) = second
            .ensure_data_available("X", TimeFrame::H1, request, &cancel)
            .await
            .unwrap();
        assert_eq!(summary.from_cache, 1);
        assert_eq!(series.read().await.len(), hourly(at(2024, 1, 1), now).len());
    }

    #[tokio::test]
    async fn test_stale_cache_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(2024, 3, 1);
        let mode = ProviderMode::Live { cache_only: false };
        let cancel = CancelToken::new();
        let request = DataRequest::new(at(2024, 2, 20));

        provider(mock_source(1), dir.path(), now, mode)
            .ensure_data_available("X", TimeFrame::H1, request.clone(), &cancel)
            .await
            .unwrap();

        // Hourly data goes stale after 12 hours.
        let later = provider(mock_source(1), dir.path(), now + Duration::hours(13), mode);
        let (_, summary) = later
            .ensure_data_available("X", TimeFrame::H1, request, &cancel)
            .await
            .unwrap();
        assert_eq!(summary.fetched, 1);
    }

    #[tokio::test]
    async fn test_walk_gives_up_before_listing() {
        let dir = tempfile::tempdir().unwrap();
        let source = SyntheticSource::new(7).with_listing_date(at(2023, 6, 1));
        let p = provider(source, dir.path(), at(2024, 3, 1), ProviderMode::Backtest { end: at(2024, 3, 1) });

        let (series, summary) = p
            .ensure_data_available("X", TimeFrame::H1, DataRequest::new(at(2015, 1, 1)), &CancelToken::new())
            .await
            .unwrap();
        assert!(summary.gave_up);
        assert_eq!(p.remote_fetches(), 3);
        assert_eq!(series.read().await.first().map(|b| b.open_time), Some(at(2023, 6, 1)));
    }

    #[tokio::test]
    async fn test_desired_bars_extend_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(2024, 1, 3) + Duration::hours(12);
        let p = provider(SyntheticSource::new(1), dir.path(), now, ProviderMode::Backtest { end: now });

        let request = DataRequest::new(at(2024, 1, 3)).with_desired_bars(3 * 24 * 60);
        let (series, summary) = p
            .ensure_data_available("X", TimeFrame::M1, request, &CancelToken::new())
            .await
            .unwrap();
        assert!(summary.chunks >= 3);
        assert!(series.read().await.count_between(at(2023, 1, 1), now) >= 3 * 24 * 60);
    }

    #[tokio::test]
    async fn test_desired_bars_request_the_shortfall() {
        let dir = tempfile::tempdir().unwrap();
        let requested = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut source = MockHistoricalSource::<Bar>::new();
        source.expect_id().return_const(SourceId::new("mock"));
        let seen = requested.clone();
        source.expect_fetch().times(3).returning(move |req| {
            seen.lock().unwrap().push(req.min_items);
            let minutes = (req.end - req.start).num_minutes();
            Ok((0..=minutes)
                .map(|m| Bar::new(req.start + Duration::minutes(m), 1.0, 2.0, 0.5, 1.5, 1.0))
                .collect())
        });

        let now = at(2024, 1, 3) + Duration::hours(12);
        let p = provider(source, dir.path(), now, ProviderMode::Backtest { end: now });
        let request = DataRequest::new(at(2024, 1, 2) + Duration::hours(12)).with_desired_bars(3000);
        let (series, _) = p
            .ensure_data_available("X", TimeFrame::M1, request, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(series.read().await.count_between(at(2024, 1, 1), now), 2 * 1440 + 721);

        // The chunk after the requested start needs no minimum; earlier ones
        // ask for what the walk still lacks.
        assert_eq!(*requested.lock().unwrap(), vec![0, 3000 - 721, 3000 - 721 - 1440]);
    }

    #[tokio::test]
    async fn test_source_fault_aborts_walk() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockHistoricalSource::<Bar>::new();
        source.expect_id().return_const(SourceId::new("mock"));
        let mut calls = 0;
        source.expect_fetch().times(2).returning(move |req| {
            calls += 1;
            if calls == 1 {
                Ok(hourly(req.start, req.end))
            } else {
                Err(HistoryError::Source {
                    message: "rate limited".to_string(),
                    status: Some(429),
                })
            }
        });

        let p = provider(source, dir.path(), at(2024, 3, 1), ProviderMode::Backtest { end: at(2024, 3, 1) });
        let err = p
            .ensure_data_available("X", TimeFrame::H1, DataRequest::new(at(2020, 1, 1)), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::SourceFault { .. }));
    }

    #[tokio::test]
    async fn test_cache_only_never_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(2024, 3, 1);
        let p = provider(mock_source(0), dir.path(), now, ProviderMode::Live { cache_only: true });
        let (series, summary) = p
            .ensure_data_available(
                "X",
                TimeFrame::H1,
                DataRequest::new(at(2024, 2, 1)).with_end(now),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.unavailable, summary.chunks);
        assert!(series.read().await.is_empty());
    }

    /// Counts fetches and takes a while to answer.
    struct SlowSource {
        delay: StdDuration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HistoricalSource<Bar> for SlowSource {
        fn id(&self) -> SourceId {
            SourceId::new("slow")
        }

        async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(hourly(request.start, request.end))
        }
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_share_one_job() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let source = SlowSource {
            delay: StdDuration::from_millis(50),
            calls: calls.clone(),
        };
        let now = at(2024, 3, 1);
        let p = provider(source, dir.path(), now, ProviderMode::Backtest { end: now });
        let series = p.series("X", TimeFrame::H1);
        let cancel = CancelToken::new();
        let request = DataRequest::new(at(2024, 2, 1));

        let (a, b) = tokio::join!(
            p.get_data(&series, request.clone(), &cancel),
            p.get_data(&series, request.clone(), &cancel)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_abandons_fetch_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let source = SlowSource {
            delay: StdDuration::from_secs(30),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let now = at(2024, 3, 1);
        let p = provider(source, dir.path(), now, ProviderMode::Backtest { end: now });
        let cancel = CancelToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = p
            .ensure_data_available("X", TimeFrame::H1, DataRequest::new(at(2024, 2, 1)), &cancel)
            .await;
        assert!(matches!(result, Err(HistoryError::Cancelled)));

        let file = p.cache().get_cache_file(p.source_id(), "X", TimeFrame::H1, now);
        assert!(!file.partial_path().exists());
        assert!(!file.final_path().exists());
    }
}
