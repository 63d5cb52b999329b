//! Binary layout of cache files.
//!
//! ```text
//! u32 LE       header length N
//! N bytes      JSON header {startDate, endDate, kind, count, savedAt}
//! records      fixed width, little endian
//!   bar:  i64 time, f64 open, f64 high, f64 low, f64 close, f64 volume
//!   tick: i64 time, f64 bid, f64 ask
//! ```
//!
//! Times are counts of 100 ns ticks since the Unix epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use market_core::{Bar, ItemKind, SeriesItem, Tick};

use crate::error::{HistoryError, Result};

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

pub fn to_ticks(t: DateTime<Utc>) -> i64 {
    t.timestamp() * TICKS_PER_SECOND + i64::from(t.timestamp_subsec_nanos()) / NANOS_PER_TICK
}

pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    DateTime::from_timestamp(secs, nanos as u32)
}

/// JSON header preceding the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHeader {
    /// First time covered (inclusive).
    pub start_date: DateTime<Utc>,
    /// Last time covered (inclusive).
    pub end_date: DateTime<Utc>,
    pub kind: ItemKind,
    pub count: usize,
    pub saved_at: DateTime<Utc>,
}

/// A record type with a fixed-width binary encoding.
pub trait CacheRecord: SeriesItem + Copy {
    const SIZE: usize;

    fn encode(&self, out: &mut Vec<u8>);

    /// `bytes` is exactly `SIZE` long.
    fn decode(bytes: &[u8]) -> Option<Self>;
}

fn read_i64(bytes: &[u8], at: usize) -> Option<i64> {
    bytes
        .get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(i64::from_le_bytes)
}

fn read_f64(bytes: &[u8], at: usize) -> Option<f64> {
    bytes
        .get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(f64::from_le_bytes)
}

impl CacheRecord for Bar {
    const SIZE: usize = 48;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&to_ticks(self.open_time).to_le_bytes());
        for v in [self.open, self.high, self.low, self.close, self.volume] {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Some(Bar::new(
            from_ticks(read_i64(bytes, 0)?)?,
            read_f64(bytes, 8)?,
            read_f64(bytes, 16)?,
            read_f64(bytes, 24)?,
            read_f64(bytes, 32)?,
            read_f64(bytes, 40)?,
        ))
    }
}

impl CacheRecord for Tick {
    const SIZE: usize = 24;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&to_ticks(self.time).to_le_bytes());
        out.extend_from_slice(&self.bid.to_le_bytes());
        out.extend_from_slice(&self.ask.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Some(Tick::new(
            from_ticks(read_i64(bytes, 0)?)?,
            read_f64(bytes, 8)?,
            read_f64(bytes, 16)?,
        ))
    }
}

pub fn encode<T: CacheRecord>(header: &CacheHeader, items: &[T]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(header)?;
    let mut out = Vec::with_capacity(4 + json.len() + items.len() * T::SIZE);
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&json);
    for item in items {
        item.encode(&mut out);
    }
    Ok(out)
}

pub fn decode<T: CacheRecord>(path: &Path, bytes: &[u8]) -> Result<(CacheHeader, Vec<T>)> {
    let corrupt = |message: &str| HistoryError::Corrupt {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let len_bytes: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| corrupt("missing header length"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_bytes = bytes
        .get(4..4 + header_len)
        .ok_or_else(|| corrupt("truncated header"))?;
    let header: CacheHeader = serde_json::from_slice(header_bytes)?;

    if header.kind != T::KIND {
        return Err(HistoryError::KindMismatch {
            path: path.to_path_buf(),
            expected: T::KIND,
            found: header.kind,
        });
    }

    let body = &bytes[4 + header_len..];
    if body.len() != header.count * T::SIZE {
        return Err(corrupt(&format!(
            "expected {} records, found {} bytes",
            header.count,
            body.len()
        )));
    }

    let items = body
        .chunks_exact(T::SIZE)
        .map(|chunk| T::decode(chunk).ok_or_else(|| corrupt("invalid record time")))
        .collect::<Result<Vec<T>>>()?;

    Ok((header, items))
}
