//! Sampling periods for bar and tick series.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Resolution of on-disk timestamps (100 ns), also the step used between
/// consecutive tick times when reasoning about ranges.
pub const TIME_RESOLUTION_NANOS: i64 = 100;

/// Base unit of a time frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrameUnit {
    Tick,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeFrameUnit {
    fn prefix(&self) -> char {
        match self {
            TimeFrameUnit::Tick => 't',
            TimeFrameUnit::Second => 's',
            TimeFrameUnit::Minute => 'm',
            TimeFrameUnit::Hour => 'h',
            TimeFrameUnit::Day => 'd',
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            't' => Some(TimeFrameUnit::Tick),
            's' => Some(TimeFrameUnit::Second),
            'm' => Some(TimeFrameUnit::Minute),
            'h' => Some(TimeFrameUnit::Hour),
            'd' => Some(TimeFrameUnit::Day),
            _ => None,
        }
    }

    /// Span of one unit, `None` for ticks.
    pub fn base_span(&self) -> Option<Duration> {
        match self {
            TimeFrameUnit::Tick => None,
            TimeFrameUnit::Second => Some(Duration::seconds(1)),
            TimeFrameUnit::Minute => Some(Duration::minutes(1)),
            TimeFrameUnit::Hour => Some(Duration::hours(1)),
            TimeFrameUnit::Day => Some(Duration::days(1)),
        }
    }
}

/// Calendar unit that on-disk cache chunks are cut along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkGranularity {
    Hour,
    Day,
    Year,
}

impl ChunkGranularity {
    /// Start of the chunk containing `t`.
    pub fn chunk_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ChunkGranularity::Hour => floor_to(t, 3_600),
            ChunkGranularity::Day => floor_to(t, 86_400),
            ChunkGranularity::Year => year_start(t.year()),
        }
    }

    /// Exclusive end of the chunk starting at `start`.
    pub fn chunk_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ChunkGranularity::Hour => start + Duration::hours(1),
            ChunkGranularity::Day => start + Duration::days(1),
            ChunkGranularity::Year => year_start(start.year() + 1),
        }
    }

    /// Start of the chunk immediately before the one starting at `start`.
    pub fn previous(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ChunkGranularity::Hour => start - Duration::hours(1),
            ChunkGranularity::Day => start - Duration::days(1),
            ChunkGranularity::Year => year_start(start.year() - 1),
        }
    }
}

fn floor_to(t: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    let ts = t.timestamp().div_euclid(seconds) * seconds;
    DateTime::from_timestamp(ts, 0).unwrap_or(t)
}

fn year_start(year: i32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Sampling period of a series, e.g. `m5` (five minutes) or `t1` (ticks).
///
/// Compared by value. The canonical name is the unit prefix followed by the
/// multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeFrame {
    unit: TimeFrameUnit,
    multiplier: u32,
}

impl TimeFrame {
    pub const T1: TimeFrame = TimeFrame { unit: TimeFrameUnit::Tick, multiplier: 1 };
    pub const S1: TimeFrame = TimeFrame { unit: TimeFrameUnit::Second, multiplier: 1 };
    pub const M1: TimeFrame = TimeFrame { unit: TimeFrameUnit::Minute, multiplier: 1 };
    pub const M5: TimeFrame = TimeFrame { unit: TimeFrameUnit::Minute, multiplier: 5 };
    pub const M15: TimeFrame = TimeFrame { unit: TimeFrameUnit::Minute, multiplier: 15 };
    pub const H1: TimeFrame = TimeFrame { unit: TimeFrameUnit::Hour, multiplier: 1 };
    pub const H4: TimeFrame = TimeFrame { unit: TimeFrameUnit::Hour, multiplier: 4 };
    pub const D1: TimeFrame = TimeFrame { unit: TimeFrameUnit::Day, multiplier: 1 };

    /// Create a time frame. Ticks only exist with a multiplier of one.
    pub fn new(unit: TimeFrameUnit, multiplier: u32) -> Result<Self> {
        if multiplier == 0 {
            return Err(Error::InvalidTimeFrame(format!(
                "multiplier must be positive for {:?}",
                unit
            )));
        }
        if unit == TimeFrameUnit::Tick && multiplier != 1 {
            return Err(Error::InvalidTimeFrame(
                "tick time frames cannot be aggregated".to_string(),
            ));
        }
        Ok(Self { unit, multiplier })
    }

    pub fn unit(&self) -> TimeFrameUnit {
        self.unit
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn is_tick(&self) -> bool {
        self.unit == TimeFrameUnit::Tick
    }

    /// Canonical name, e.g. `h1`.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Exact span of one bar; `None` for ticks.
    pub fn span(&self) -> Option<Duration> {
        self.unit
            .base_span()
            .map(|base| base * self.multiplier as i32)
    }

    /// Span used for bar-count estimates. Ticks are approximated as one per second.
    pub fn approximate_span(&self) -> Duration {
        self.span().unwrap_or_else(|| Duration::seconds(1))
    }

    /// Distance between two consecutive item times in a contiguous series.
    pub fn step(&self) -> Duration {
        self.span()
            .unwrap_or_else(|| Duration::nanoseconds(TIME_RESOLUTION_NANOS))
    }

    /// Round `t` down to the start of the period containing it.
    pub fn period_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        match self.span() {
            Some(span) => floor_to(t, span.num_seconds()),
            None => t,
        }
    }

    /// Start of the period after the one containing `t`.
    pub fn next_period_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.period_start(t) + self.step()
    }

    /// Approximate number of bars between two instants (negative when `end < start`).
    pub fn bars_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
        let span = self.approximate_span().num_milliseconds().max(1);
        (end - start).num_milliseconds() / span
    }

    /// Calendar granularity of cache chunks for this time frame.
    pub fn chunk_granularity(&self) -> ChunkGranularity {
        match self.unit {
            TimeFrameUnit::Tick | TimeFrameUnit::Second => ChunkGranularity::Hour,
            TimeFrameUnit::Minute => ChunkGranularity::Day,
            TimeFrameUnit::Hour | TimeFrameUnit::Day => ChunkGranularity::Year,
        }
    }

    /// How old the end of retrieved data may be before it is re-fetched.
    pub fn default_max_out_of_date(&self) -> Duration {
        match self.unit {
            TimeFrameUnit::Tick | TimeFrameUnit::Second => Duration::hours(1),
            TimeFrameUnit::Minute => Duration::hours(24),
            TimeFrameUnit::Hour => Duration::hours(12),
            TimeFrameUnit::Day => Duration::hours(24),
        }
    }

    /// Span of consecutive empty chunks after which a backward walk stops probing.
    pub fn give_up_span(&self) -> Duration {
        match self.unit {
            TimeFrameUnit::Tick | TimeFrameUnit::Second => Duration::days(1),
            TimeFrameUnit::Minute => Duration::days(5),
            TimeFrameUnit::Hour | TimeFrameUnit::Day => Duration::days(365),
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.unit.prefix(), self.multiplier)
    }
}

impl FromStr for TimeFrame {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let unit = chars
            .next()
            .and_then(TimeFrameUnit::from_prefix)
            .ok_or_else(|| Error::InvalidTimeFrame(s.to_string()))?;
        let rest = chars.as_str();
        let multiplier = if rest.is_empty() {
            1
        } else {
            rest.parse::<u32>()
                .map_err(|_| Error::InvalidTimeFrame(s.to_string()))?
        };
        TimeFrame::new(unit, multiplier)
    }
}

impl TryFrom<String> for TimeFrame {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeFrame> for String {
    fn from(tf: TimeFrame) -> Self {
        tf.to_string()
    }
}
