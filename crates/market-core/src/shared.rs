//! Shared, lock-protected market series and their registry.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bar::SeriesItem;
use crate::market_series::{MarketSeries, SeriesKey};
use crate::timeframe::TimeFrame;

/// A [`MarketSeries`] shared between retrieval tasks and simulations.
///
/// Readers and writers go through the `RwLock`. Retrieval for the series is
/// additionally serialized by the data lock, held for the whole of a fetch so
/// that two callers never retrieve the same chunk twice.
#[derive(Debug)]
pub struct SharedSeries<T: SeriesItem> {
    key: SeriesKey,
    data: RwLock<MarketSeries<T>>,
    data_lock: Mutex<()>,
}

impl<T: SeriesItem> SharedSeries<T> {
    pub fn new(key: SeriesKey) -> Self {
        Self {
            data: RwLock::new(MarketSeries::new(key.clone())),
            key,
            data_lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, MarketSeries<T>> {
        self.data.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, MarketSeries<T>> {
        self.data.write().await
    }

    /// Exclusive retrieval lock.
    pub async fn data_lock(&self) -> MutexGuard<'_, ()> {
        self.data_lock.lock().await
    }
}

/// One [`SharedSeries`] per (symbol, time frame), created on first access and
/// kept for the registry's lifetime.
#[derive(Debug)]
pub struct SeriesRegistry<T: SeriesItem> {
    series: DashMap<SeriesKey, Arc<SharedSeries<T>>>,
}

impl<T: SeriesItem> Default for SeriesRegistry<T> {
    fn default() -> Self {
        Self {
            series: DashMap::new(),
        }
    }
}

impl<T: SeriesItem> SeriesRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, symbol: &str, timeframe: TimeFrame) -> Arc<SharedSeries<T>> {
        let key = SeriesKey::new(symbol, timeframe);
        self.series
            .entry(key.clone())
            .or_insert_with(|| Arc::new(SharedSeries::new(key)))
            .clone()
    }

    pub fn get(&self, key: &SeriesKey) -> Option<Arc<SharedSeries<T>>> {
        self.series.get(key).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn keys(&self) -> Vec<SeriesKey> {
        self.series.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;

    #[test]
    fn test_registry_returns_same_series() {
        let registry: SeriesRegistry<Bar> = SeriesRegistry::new();
        let a = registry.get_or_create("BTCUSD", TimeFrame::H1);
        let b = registry.get_or_create("BTCUSD", TimeFrame::H1);
        let c = registry.get_or_create("BTCUSD", TimeFrame::M1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
        assert!(registry
            .get(&SeriesKey::new("BTCUSD", TimeFrame::M1))
            .is_some());
    }

    #[test]
    fn test_writes_are_visible_to_readers() {
        let series: SharedSeries<Bar> = SharedSeries::new(SeriesKey::new("X", TimeFrame::H1));
        let t = chrono::Utc::now();
        tokio_test::block_on(async {
            series
                .write()
                .await
                .update_live(Bar::new(t, 1.0, 1.0, 1.0, 1.0, 0.0))
                .unwrap();
            assert_eq!(series.read().await.len(), 1);
            assert_eq!(series.read().await.data_end(), Some(t));
        });
    }

    #[tokio::test]
    async fn test_data_lock_serializes() {
        let series: Arc<SharedSeries<Bar>> =
            Arc::new(SharedSeries::new(SeriesKey::new("X", TimeFrame::H1)));
        let guard = series.data_lock().await;
        let other = series.clone();
        let handle = tokio::spawn(async move {
            let _g = other.data_lock().await;
        });
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        drop(guard);
        handle.await.unwrap();
    }
}
