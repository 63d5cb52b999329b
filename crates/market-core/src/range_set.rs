//! Sorted, non-overlapping sets of inclusive time ranges.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= end && start <= self.end
    }
}

/// Ranges are kept disjoint: inserting a range that overlaps or touches existing
/// ones replaces them all with their union.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSet {
    ranges: BTreeMap<DateTime<Utc>, DateTime<Utc>>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `[start, end]`. Ranges closer than `step` to it are merged in.
    pub fn insert(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) {
        if start > end {
            return;
        }
        let mut merged_start = start;
        let mut merged_end = end;

        let absorbed: Vec<DateTime<Utc>> = self
            .ranges
            .iter()
            .filter(|(s, e)| **s <= end + step && start <= **e + step)
            .map(|(s, _)| *s)
            .collect();

        for s in absorbed {
            if let Some(e) = self.ranges.remove(&s) {
                merged_start = merged_start.min(s);
                merged_end = merged_end.max(e);
            }
        }

        self.ranges.insert(merged_start, merged_end);
    }

    /// Remove `[start, end]`, trimming partially covered ranges so that what
    /// remains starts or ends one `step` away from the removed span.
    pub fn remove(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> usize {
        if start > end {
            return 0;
        }
        let hit: Vec<(DateTime<Utc>, DateTime<Utc>)> = self
            .ranges
            .iter()
            .filter(|(s, e)| **s <= end && start <= **e)
            .map(|(s, e)| (*s, *e))
            .collect();

        let mut erased = 0;
        for (s, e) in hit {
            self.ranges.remove(&s);
            if s < start {
                self.ranges.insert(s, start - step);
            }
            if e > end {
                self.ranges.insert(end + step, e);
            }
            if s >= start && e <= end {
                erased += 1;
            }
        }
        erased
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.ranges
            .range(..=t)
            .next_back()
            .map(|(_, e)| t <= *e)
            .unwrap_or(false)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.ranges.iter().any(|(s, e)| *s <= end && start <= *e)
    }

    pub fn iter(&self) -> impl Iterator<Item = TimeRange> + '_ {
        self.ranges.iter().map(|(s, e)| TimeRange::new(*s, *e))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
