//! Calendar-chunked on-disk cache of bars or ticks.
//!
//! One file holds one calendar chunk of one series (an hour of ticks, a day of
//! minute bars, a year of hourly bars). A chunk whose data reaches the end of
//! its calendar period is saved as `.dat`; anything shorter is provisional and
//! saved as `.part.dat`.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use dashmap::DashMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use market_core::{ChunkGranularity, TimeFrame};

use crate::codec::{self, CacheHeader, CacheRecord};
use crate::error::{HistoryError, Result};

/// Number of numbered `.old` backups kept per file.
pub const MAX_BACKUPS: usize = 3;

const FINAL_EXTENSION: &str = "dat";
const PARTIAL_EXTENSION: &str = "part.dat";

/// Identity of a data source, used as the first path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    pub name: String,
    pub subtype: Option<String>,
}

impl SourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subtype: None,
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// `name` or `name (subtype)`.
    pub fn dir_name(&self) -> String {
        match &self.subtype {
            Some(sub) => format!("{} ({})", self.name, sub),
            None => self.name.clone(),
        }
    }
}

/// Key of one cache chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: SourceId,
    pub symbol: String,
    pub timeframe: TimeFrame,
    /// Start of the calendar chunk.
    pub chunk_start: DateTime<Utc>,
}

impl CacheKey {
    /// Key of the chunk containing `t`.
    pub fn for_time(
        source: SourceId,
        symbol: impl Into<String>,
        timeframe: TimeFrame,
        t: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            symbol: symbol.into(),
            timeframe,
            chunk_start: timeframe.chunk_granularity().chunk_start(t),
        }
    }

    pub fn granularity(&self) -> ChunkGranularity {
        self.timeframe.chunk_granularity()
    }

    /// Exclusive end of the chunk.
    pub fn chunk_end(&self) -> DateTime<Utc> {
        self.granularity().chunk_end(self.chunk_start)
    }

    /// Time of the last item the chunk can hold.
    pub fn last_item_time(&self) -> DateTime<Utc> {
        self.chunk_end() - self.timeframe.step()
    }

    /// `{year}`, `{year}/{month}/{day}` or `{year}/{month}/{day}/{hour}`.
    pub fn calendar_path(&self) -> PathBuf {
        let t = self.chunk_start;
        let mut path = PathBuf::from(format!("{:04}", t.year()));
        match self.granularity() {
            ChunkGranularity::Year => {}
            ChunkGranularity::Day => {
                path.push(format!("{:02}", t.month()));
                path.push(format!("{:02}", t.day()));
            }
            ChunkGranularity::Hour => {
                path.push(format!("{:02}", t.month()));
                path.push(format!("{:02}", t.day()));
                path.push(format!("{:02}", t.hour()));
            }
        }
        path
    }

    /// Path relative to the cache root, without extension.
    pub fn relative_stem(&self) -> PathBuf {
        let mut path = PathBuf::from(self.source.dir_name());
        path.push(&self.symbol);
        path.push(self.timeframe.name());
        path.push(self.calendar_path());
        path
    }
}

/// Loaded content of a cache file.
#[derive(Debug, Clone)]
pub struct CacheContents<T> {
    pub header: CacheHeader,
    pub items: Vec<T>,
    /// Loaded from (or saved as) a `.part.dat` file.
    pub provisional: bool,
}

impl<T> CacheContents<T> {
    /// Usable without re-fetching: complete chunks always are, provisional ones
    /// while their end is younger than `max_out_of_date`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_out_of_date: Duration) -> bool {
        !self.provisional || now - self.header.end_date < max_out_of_date
    }
}

/// One chunk on disk plus its in-memory copy once loaded.
#[derive(Debug)]
pub struct CacheFile<T> {
    key: CacheKey,
    stem: PathBuf,
    contents: RwLock<Option<CacheContents<T>>>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

impl<T: CacheRecord> CacheFile<T> {
    pub fn new(root: &Path, key: CacheKey) -> Self {
        Self {
            stem: root.join(key.relative_stem()),
            key,
            contents: RwLock::new(None),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn final_path(&self) -> PathBuf {
        with_suffix(&self.stem, &format!(".{}", FINAL_EXTENSION))
    }

    pub fn partial_path(&self) -> PathBuf {
        with_suffix(&self.stem, &format!(".{}", PARTIAL_EXTENSION))
    }

    /// Backup `n` (1 = newest) of `path`.
    pub fn backup_path(path: &Path, n: usize) -> PathBuf {
        with_suffix(path, &format!(".{}.old", n))
    }

    pub async fn is_loaded(&self) -> bool {
        self.contents.read().await.is_some()
    }

    /// Contents from memory, or from disk on first access. `Ok(None)` when
    /// neither the final nor the provisional file exists.
    pub async fn load(&self) -> Result<Option<CacheContents<T>>> {
        if let Some(contents) = self.contents.read().await.as_ref() {
            return Ok(Some(contents.clone()));
        }

        let mut slot = self.contents.write().await;
        if let Some(contents) = slot.as_ref() {
            return Ok(Some(contents.clone()));
        }

        for (path, provisional) in [(self.final_path(), false), (self.partial_path(), true)] {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(HistoryError::io(&path, e)),
            };
            let (header, items) = codec::decode::<T>(&path, &bytes)?;
            debug!(
                path = %path.display(),
                count = items.len(),
                provisional,
                "Loaded cache file"
            );
            let contents = CacheContents {
                header,
                items,
                provisional,
            };
            *slot = Some(contents.clone());
            return Ok(Some(contents));
        }

        Ok(None)
    }

    /// Write `items` covering `[start, end]`, rotating the previous file into
    /// numbered backups. The write goes to a temporary file renamed into place.
    pub async fn save(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        items: Vec<T>,
        saved_at: DateTime<Utc>,
    ) -> Result<()> {
        let complete = start <= self.key.chunk_start && end >= self.key.last_item_time();
        let path = if complete {
            self.final_path()
        } else {
            self.partial_path()
        };

        let header = CacheHeader {
            start_date: start,
            end_date: end,
            kind: T::KIND,
            count: items.len(),
            saved_at,
        };
        let bytes = codec::encode(&header, &items)?;

        let mut slot = self.contents.write().await;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| HistoryError::io(dir, e))?;
        }
        rotate_backups(&path).await?;

        let tmp = with_suffix(&path, ".tmp");
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| HistoryError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| HistoryError::io(&path, e))?;

        if complete {
            let partial = self.partial_path();
            if exists(&partial).await {
                if let Err(e) = fs::remove_file(&partial).await {
                    warn!(path = %partial.display(), error = %e, "Failed to remove provisional file");
                }
            }
        }

        debug!(
            path = %path.display(),
            count = header.count,
            complete,
            "Saved cache file"
        );

        *slot = Some(CacheContents {
            header,
            items,
            provisional: !complete,
        });
        Ok(())
    }

    /// Drop the in-memory copy; the next `load` reads the disk again.
    pub async fn unload(&self) {
        *self.contents.write().await = None;
    }
}

/// Shift `path.1.old .. path.{MAX-1}.old` up by one and move `path` to `.1.old`.
async fn rotate_backups(path: &Path) -> Result<()> {
    if !exists(path).await {
        return Ok(());
    }
    for n in (1..MAX_BACKUPS).rev() {
        let from = with_suffix(path, &format!(".{}.old", n));
        if exists(&from).await {
            let to = with_suffix(path, &format!(".{}.old", n + 1));
            fs::rename(&from, &to)
                .await
                .map_err(|e| HistoryError::io(&to, e))?;
        }
    }
    let newest = with_suffix(path, ".1.old");
    fs::rename(path, &newest)
        .await
        .map_err(|e| HistoryError::io(&newest, e))?;
    Ok(())
}

/// Process-lifetime index of cache files, one instance per key.
///
/// Owned explicitly and shared by handle; files are never evicted, but their
/// contents are only read from disk when first needed.
#[derive(Debug)]
pub struct CacheRegistry<T> {
    root: PathBuf,
    files: DashMap<CacheKey, Arc<CacheFile<T>>>,
}

impl<T: CacheRecord> CacheRegistry<T> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The cache file for the chunk containing `t`.
    pub fn get_cache_file(
        &self,
        source: &SourceId,
        symbol: &str,
        timeframe: TimeFrame,
        t: DateTime<Utc>,
    ) -> Arc<CacheFile<T>> {
        self.get(CacheKey::for_time(source.clone(), symbol, timeframe, t))
    }

    pub fn get(&self, key: CacheKey) -> Arc<CacheFile<T>> {
        self.files
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CacheFile::new(&self.root, key)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use market_core::{Bar, Tick};

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn hourly_bars(start: DateTime<Utc>, n: i64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let p = 100.0 + i as f64;
                Bar::new(start + Duration::hours(i), p, p + 1.0, p - 1.0, p + 0.5, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_paths_follow_calendar_rules() {
        let source = SourceId::new("phemex").with_subtype("spot");
        let t = at(2024, 3, 5, 13) + Duration::minutes(7);

        let hourly = CacheKey::for_time(source.clone(), "BTCUSD", TimeFrame::H1, t);
        assert_eq!(hourly.relative_stem(), PathBuf::from("phemex (spot)/BTCUSD/h1/2024"));

        let minute = CacheKey::for_time(source.clone(), "BTCUSD", TimeFrame::M1, t);
        assert_eq!(minute.relative_stem(), PathBuf::from("phemex (spot)/BTCUSD/m1/2024/03/05"));

        let tick = CacheKey::for_time(SourceId::new("ctrader"), "EURUSD", TimeFrame::T1, t);
        assert_eq!(tick.relative_stem(), PathBuf::from("ctrader/EURUSD/t1/2024/03/05/13"));
        assert_eq!(tick.chunk_start, at(2024, 3, 5, 13));
        assert_eq!(tick.chunk_end(), at(2024, 3, 5, 14));
    }

    #[test]
    fn test_registry_identity() {
        let dir = tempfile::tempdir().unwrap();
        let registry: CacheRegistry<Bar> = CacheRegistry::new(dir.path());
        let source = SourceId::new("test");
        let a = registry.get_cache_file(&source, "X", TimeFrame::H1, at(2024, 2, 1, 0));
        let b = registry.get_cache_file(&source, "X", TimeFrame::H1, at(2024, 11, 30, 23));
        let c = registry.get_cache_file(&source, "X", TimeFrame::H1, at(2023, 6, 1, 0));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let registry: CacheRegistry<Bar> = CacheRegistry::new(dir.path());
        let file = registry.get_cache_file(&SourceId::new("s"), "X", TimeFrame::H1, at(2024, 1, 1, 0));
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceId::new("s");
        let start = at(2024, 1, 1, 0);
        let bars = hourly_bars(start, 50);
        let end = bars[49].open_time;

        {
            let registry: CacheRegistry<Bar> = CacheRegistry::new(dir.path());
            let file = registry.get_cache_file(&source, "X", TimeFrame::H1, start);
            file.save(start, end, bars.clone(), at(2024, 1, 3, 0)).await.unwrap();
            assert!(file.partial_path().exists());
            assert!(!file.final_path().exists());
        }

        // A fresh registry has nothing in memory and must read the disk.
        let registry: CacheRegistry<Bar> = CacheRegistry::new(dir.path());
        let file = registry.get_cache_file(&source, "X", TimeFrame::H1, start);
        assert!(!file.is_loaded().await);
        let contents = file.load().await.unwrap().unwrap();
        assert!(contents.provisional);
        assert_eq!(contents.header.start_date, start);
        assert_eq!(contents.header.end_date, end);
        assert_eq!(contents.items, bars);
    }

    #[tokio::test]
    async fn test_complete_chunk_is_final_and_replaces_partial() {
        let dir = tempfile::tempdir().unwrap();
        let registry: CacheRegistry<Tick> = CacheRegistry::new(dir.path());
        let file = registry.get_cache_file(&SourceId::new("s"), "EURUSD", TimeFrame::T1, at(2024, 1, 1, 5));
        let chunk = at(2024, 1, 1, 5);
        let ticks = vec![Tick::new(chunk + Duration::seconds(1), 1.1, 1.2)];

        file.save(chunk, chunk + Duration::minutes(30), ticks.clone(), chunk)
            .await
            .unwrap();
        assert!(file.partial_path().exists());

        let last = file.key().last_item_time();
        file.save(chunk, last, ticks, chunk).await.unwrap();
        assert!(file.final_path().exists());
        assert!(!file.partial_path().exists());
        assert!(!file.load().await.unwrap().unwrap().provisional);
    }

    #[tokio::test]
    async fn test_rotation_keeps_three_backups() {
        let dir = tempfile::tempdir().unwrap();
        let registry: CacheRegistry<Bar> = CacheRegistry::new(dir.path());
        let start = at(2020, 1, 1, 0);
        let file = registry.get_cache_file(&SourceId::new("s"), "X", TimeFrame::H1, start);
        let end = file.key().last_item_time();

        for n in 1..=5 {
            file.save(start, end, hourly_bars(start, n), start).await.unwrap();
        }

        let final_path = file.final_path();
        for n in 1..=MAX_BACKUPS {
            assert!(CacheFile::<Bar>::backup_path(&final_path, n).exists(), "backup {n}");
        }
        assert!(!CacheFile::<Bar>::backup_path(&final_path, MAX_BACKUPS + 1).exists());

        // Backup 1 is the previous save (four bars).
        let bytes = std::fs::read(CacheFile::<Bar>::backup_path(&final_path, 1)).unwrap();
        let (header, _): (_, Vec<Bar>) = codec::decode(&final_path, &bytes).unwrap();
        assert_eq!(header.count, 4);
    }

    #[test]
    fn test_staleness() {
        let start = at(2024, 1, 1, 0);
        let contents: CacheContents<Bar> = CacheContents {
            header: CacheHeader {
                start_date: start,
                end_date: start + Duration::hours(10),
                kind: market_core::ItemKind::Bar,
                count: 0,
                saved_at: start,
            },
            items: vec![],
            provisional: true,
        };
        let max = TimeFrame::H1.default_max_out_of_date();
        assert!(contents.is_fresh(start + Duration::hours(21), max));
        assert!(!contents.is_fresh(start + Duration::hours(23), max));

        let complete = CacheContents {
            provisional: false,
            ..contents
        };
        assert!(complete.is_fresh(start + Duration::days(400), max));
    }
}
