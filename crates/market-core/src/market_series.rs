//! In-memory historical data for one (symbol, time frame) pair.
//!
//! A [`MarketSeries`] covers the contiguous range `[data_start, data_end]`
//! (inclusive item times). Newly retrieved chunks are merged in by
//! [`MarketSeries::import`]:
//!
//! - items before the current start are prepended, items after the current end
//!   are appended, items already covered are never duplicated;
//! - a chunk that does not touch the covered range still extends coverage, but
//!   the hole in between is recorded as a gap;
//! - a chunk landing on a recorded gap fills it, trims or erases the gap and
//!   records the filled span as an anti-gap.
//!
//! Every merge broadcasts a [`SeriesEvent`] so indicator warm-up and strategies
//! can react to backward or forward extensions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bar::SeriesItem;
use crate::range_set::{RangeSet, TimeRange};
use crate::timeframe::TimeFrame;
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 256;

/// Identity of a market series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: TimeFrame,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: TimeFrame) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.symbol, self.timeframe)
    }
}

/// Notification raised after data lands in a series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesEvent {
    /// Coverage grew towards the past.
    ExtendedBackward {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: usize,
    },
    /// Coverage grew towards the present.
    ExtendedForward {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: usize,
    },
    /// A previously recorded gap received data.
    GapFilled {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: usize,
    },
    /// The live (most recent) item was replaced or appended.
    BarUpdated { time: DateTime<Utc> },
}

/// What one [`MarketSeries::import`] call changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub prepended: usize,
    pub appended: usize,
    pub filled: usize,
    pub gap_created: Option<TimeRange>,
    pub gaps_erased: usize,
}

impl ImportSummary {
    pub fn added(&self) -> usize {
        self.prepended + self.appended + self.filled
    }
}

/// Append-ordered bars or ticks for one symbol and time frame.
#[derive(Debug)]
pub struct MarketSeries<T: SeriesItem> {
    key: SeriesKey,
    items: VecDeque<T>,
    data_start: Option<DateTime<Utc>>,
    data_end: Option<DateTime<Utc>>,
    gaps: RangeSet,
    anti_gaps: RangeSet,
    events: broadcast::Sender<SeriesEvent>,
}

impl<T: SeriesItem> MarketSeries<T> {
    pub fn new(key: SeriesKey) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            key,
            items: VecDeque::new(),
            data_start: None,
            data_end: None,
            gaps: RangeSet::new(),
            anti_gaps: RangeSet::new(),
            events,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.key.timeframe
    }

    pub fn data_start(&self) -> Option<DateTime<Utc>> {
        self.data_start
    }

    pub fn data_end(&self) -> Option<DateTime<Utc>> {
        self.data_end
    }

    pub fn gaps(&self) -> &RangeSet {
        &self.gaps
    }

    /// Spans confirmed filled after having been gaps. New gaps are never recorded
    /// over them.
    pub fn anti_gaps(&self) -> &RangeSet {
        &self.anti_gaps
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeriesEvent> {
        self.events.subscribe()
    }

    /// Whether `[start, end]` is inside the covered range with no gap in it.
    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        match (self.data_start, self.data_end) {
            (Some(ds), Some(de)) => ds <= start && end <= de && !self.gaps.overlaps(start, end),
            _ => false,
        }
    }

    /// Position of the first item at or after `t`.
    pub fn lower_bound(&self, t: DateTime<Utc>) -> usize {
        self.items.partition_point(|i| i.time() < t)
    }

    /// Index of the item at exactly `t`.
    pub fn index_of(&self, t: DateTime<Utc>) -> Option<usize> {
        let pos = self.lower_bound(t);
        self.items
            .get(pos)
            .filter(|i| i.time() == t)
            .map(|_| pos)
    }

    /// Items with `start <= time <= end`.
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> impl Iterator<Item = &T> {
        let from = self.lower_bound(start);
        let to = self.items.partition_point(|i| i.time() <= end).max(from);
        self.items.range(from..to)
    }

    pub fn count_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        let from = self.lower_bound(start);
        let to = self.items.partition_point(|i| i.time() <= end);
        to.saturating_sub(from)
    }

    /// Merge a sorted batch retrieved for `[start, end]` into the series.
    ///
    /// Items outside `[start, end]` are ignored, and so are items for times the
    /// series already holds.
    pub fn import(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batch: Vec<T>,
    ) -> Result<ImportSummary> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        let batch = normalize_batch(batch, start, end)?;
        let step = self.key.timeframe.step();
        let mut summary = ImportSummary::default();

        let (ds, de) = match (self.data_start, self.data_end) {
            (Some(ds), Some(de)) => (ds, de),
            _ => {
                summary.appended = batch.len();
                self.items.extend(batch);
                self.data_start = Some(start);
                self.data_end = Some(end);
                self.notify(SeriesEvent::ExtendedForward {
                    start,
                    end,
                    count: summary.appended,
                });
                return Ok(summary);
            }
        };

        let mut head = batch;
        let tail_from = head.partition_point(|i| i.time() <= de);
        let tail = head.split_off(tail_from);
        let interior_from = head.partition_point(|i| i.time() < ds);
        let interior = head.split_off(interior_from);

        let touched_gaps = self.gaps.overlaps(start, end);

        if start <= ds {
            summary.prepended = head.len();
            for item in head.into_iter().rev() {
                self.items.push_front(item);
            }
            if end + step < ds {
                summary.gap_created = self.add_gap(end + step, ds - step);
            }
            self.data_start = Some(start);
            self.notify(SeriesEvent::ExtendedBackward {
                start,
                end: ds,
                count: summary.prepended,
            });
        }

        if end >= de {
            summary.appended = tail.len();
            self.items.extend(tail);
            if start > de + step {
                summary.gap_created = self.add_gap(de + step, start - step);
            }
            self.data_end = Some(end);
            self.notify(SeriesEvent::ExtendedForward {
                start: de,
                end,
                count: summary.appended,
            });
        }

        for item in interior {
            if self.gaps.contains(item.time()) && self.insert_sorted(item) {
                summary.filled += 1;
            }
        }

        if touched_gaps {
            summary.gaps_erased = self.gaps.remove(start, end, step);
            self.anti_gaps.insert(start.max(ds), end.min(de), step);
            self.notify(SeriesEvent::GapFilled {
                start,
                end,
                count: summary.filled,
            });
        }

        debug!(
            series = %self.key,
            prepended = summary.prepended,
            appended = summary.appended,
            filled = summary.filled,
            gaps = self.gaps.len(),
            "Imported batch"
        );

        Ok(summary)
    }

    /// Replace the most recent item when it has the same time, otherwise append.
    pub fn update_live(&mut self, item: T) -> Result<()> {
        let t = item.time();
        match self.items.back_mut() {
            Some(last) if last.time() == t => *last = item,
            Some(last) if last.time() > t => {
                return Err(Error::StaleUpdate {
                    time: t,
                    last: last.time(),
                })
            }
            _ => {
                self.items.push_back(item);
                if self.data_start.is_none() {
                    self.data_start = Some(t);
                }
                self.data_end = Some(self.data_end.map_or(t, |de| de.max(t)));
            }
        }
        self.notify(SeriesEvent::BarUpdated { time: t });
        Ok(())
    }

    fn add_gap(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<TimeRange> {
        if start > end {
            return None;
        }
        let step = self.key.timeframe.step();
        self.gaps.insert(start, end, step);
        let filled: Vec<TimeRange> = self
            .anti_gaps
            .iter()
            .filter(|r| r.overlaps(start, end))
            .collect();
        for r in filled {
            self.gaps.remove(r.start, r.end, step);
        }
        debug!(series = %self.key, gap_start = %start, gap_end = %end, "Recorded gap");
        Some(TimeRange::new(start, end))
    }

    fn insert_sorted(&mut self, item: T) -> bool {
        let t = item.time();
        let pos = self.lower_bound(t);
        if self.items.get(pos).is_some_and(|i| i.time() == t) {
            return false;
        }
        self.items.insert(pos, item);
        true
    }

    fn notify(&self, event: SeriesEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Drop items outside the range and collapse duplicate times (last one wins).
fn normalize_batch<T: SeriesItem>(
    batch: Vec<T>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<T>> {
    let mut out: Vec<T> = Vec::with_capacity(batch.len());
    for (position, item) in batch.into_iter().enumerate() {
        let t = item.time();
        match out.last() {
            Some(prev) if prev.time() > t => return Err(Error::UnsortedBatch { position }),
            Some(prev) if prev.time() == t => {
                out.pop();
            }
            _ => {}
        }
        out.push(item);
    }
    out.retain(|i| start <= i.time() && i.time() <= end);
    Ok(out)
}
