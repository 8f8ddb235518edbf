use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt};

/// Range where the lower bound is inclusive and the upper bound is exclusive
/// or unbounded.
#[derive(Copy, Clone, Serialize, Deserialize)]
pub struct Range<T>(T, Option<T>);

impl<T> Range<T>
where
    T: Ord,
{
    pub fn new(from: T, to: Option<T>) -> Self {
        if let Some(ref to) = to {
            if from >= *to {
                panic!("ranges must go from low to high")
            }
        }
        Range(from, to)
    }

    pub fn contains(&self, val: &T) -> bool {
        if let Some(end) = &self.1 {
            val >= &self.0 && val < end
        } else {
            val >= &self.0
        }
    }
}

impl<T> fmt::Display for Range<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(end) = &self.1 {
            write!(f, "{} - {}", self.0, end)
        } else {
            write!(f, "{}+", self.0)
        }
    }
}

/// An ordered list of ranges used to bucket a quantity for display.
#[derive(Clone, Serialize, Deserialize)]
pub struct RangeSet<T> {
    ranges: Vec<Range<T>>,
}

impl<T> RangeSet<T> {
    pub fn new(ranges: Vec<Range<T>>) -> Self {
        Self { ranges }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<T>> + '_ {
        self.ranges.iter()
    }
}

impl<T> RangeSet<T>
where
    T: Ord + Copy,
{
    /// Consecutive buckets starting at the given lower bounds; the last
    /// bucket is unbounded above.
    pub fn from_bounds(bounds: impl IntoIterator<Item = T>) -> Self {
        let bounds: Vec<T> = bounds.into_iter().collect();
        let mut ranges = Vec::with_capacity(bounds.len());
        for pair in bounds.windows(2) {
            ranges.push(Range::new(pair[0], Some(pair[1])));
        }
        if let Some(last) = bounds.last() {
            ranges.push(Range::new(*last, None));
        }
        Self { ranges }
    }
}

impl<T> RangeSet<T>
where
    T: Ord,
{
    /// Bucket values, counting missing values in a separate slot.
    pub fn bucket_values<I, B>(self, values: I) -> RangeSetCounts<T>
    where
        I: Iterator<Item = Option<B>>,
        B: Borrow<T>,
    {
        let mut counts = vec![0usize; self.ranges.len()];
        let mut missing = 0;
        for value in values {
            match value {
                Some(value) => {
                    for (idx, bucket) in self.ranges.iter().enumerate() {
                        if bucket.contains(value.borrow()) {
                            counts[idx] += 1;
                        }
                    }
                }
                None => missing += 1,
            }
        }
        RangeSetCounts {
            set: self,
            counts,
            missing,
        }
    }
}

/// A range set with values bucketed, and bucket sizes recorded.
pub struct RangeSetCounts<T> {
    set: RangeSet<T>,
    counts: Vec<usize>,
    missing: usize,
}

impl<T> RangeSetCounts<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&Range<T>, usize)> {
        self.set.iter().zip_eq(self.counts.iter().copied())
    }

    pub fn missing(&self) -> usize {
        self.missing
    }
}
