//! Append-only windowed series indexed backwards from the most recent value.

use std::collections::VecDeque;
use std::ops::Index;

use crate::{Error, Result};

/// An append-only sequence with a cursor at the most recent value.
///
/// `get(0)` is the most recent value, `get(1)` the one before it, and so on.
/// With a memory budget (`with_capacity`) the oldest value is evicted on append
/// once the budget is full; `count()` keeps counting every value ever appended.
///
/// Not synchronized: one writer and one reader per instance, callers serialize.
#[derive(Debug, Clone)]
pub struct DataSeries<T> {
    values: VecDeque<T>,
    capacity: Option<usize>,
    total: usize,
}

impl<T> Default for DataSeries<T> {
    fn default() -> Self {
        Self {
            values: VecDeque::new(),
            capacity: None,
            total: 0,
        }
    }
}

impl<T> DataSeries<T> {
    /// Unbounded series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Series that retains at most `capacity` values (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
            total: 0,
        }
    }

    /// Append a value and advance the cursor.
    pub fn add(&mut self, value: T) {
        if let Some(cap) = self.capacity {
            if self.values.len() == cap {
                self.values.pop_front();
            }
        }
        self.values.push_back(value);
        self.total += 1;
    }

    /// Replace the most recent value (a forming bar).
    pub fn update_last(&mut self, value: T) -> Result<()> {
        match self.values.back_mut() {
            Some(last) => {
                *last = value;
                Ok(())
            }
            None => Err(Error::EmptySeries),
        }
    }

    /// Value `back` steps behind the cursor (0 = most recent).
    pub fn get(&self, back: usize) -> Result<&T> {
        let len = self.values.len();
        if back >= len {
            return Err(Error::IndexOutOfRange { index: back, len });
        }
        Ok(&self.values[len - 1 - back])
    }

    /// Value at an absolute position counted from the first value ever appended.
    pub fn at(&self, index: usize) -> Result<&T> {
        let first = self.first_retained_index();
        if index < first || index >= self.total {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.total,
            });
        }
        Ok(&self.values[index - first])
    }

    pub fn last(&self) -> Option<&T> {
        self.values.back()
    }

    /// Number of values currently retained.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values ever appended.
    pub fn count(&self) -> usize {
        self.total
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Absolute index of the oldest retained value.
    pub fn first_retained_index(&self) -> usize {
        self.total - self.values.len()
    }

    /// Retained values, most recent first.
    pub fn iter_recent(&self) -> impl Iterator<Item = &T> {
        self.values.iter().rev()
    }

    /// Retained values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.total = 0;
    }
}

impl<T: Copy> DataSeries<T> {
    /// Copy of the value `back` steps behind the cursor.
    pub fn value(&self, back: usize) -> Result<T> {
        self.get(back).copied()
    }
}

impl<T> Index<usize> for DataSeries<T> {
    type Output = T;

    /// Panics when out of range, like slice indexing. Use [`DataSeries::get`] to
    /// handle the error.
    fn index(&self, back: usize) -> &T {
        match self.get(back) {
            Ok(v) => v,
            Err(e) => panic!("{}", e),
        }
    }
}

impl<T> FromIterator<T> for DataSeries<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut series = DataSeries::new();
        for v in iter {
            series.add(v);
        }
        series
    }
}
