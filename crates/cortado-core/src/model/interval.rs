// ── Time ranges ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open instant interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Strict overlap; ranges that merely touch do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl From<cortado_calendar::types::BusyInterval> for TimeRange {
    fn from(interval: cortado_calendar::types::BusyInterval) -> Self {
        Self {
            start: interval.start,
            end: interval.end,
        }
    }
}

/// Collapse overlapping or touching ranges into a minimal sorted set.
///
/// The calendar service may report one meeting per attendee; merging
/// keeps busy annotation linear in the slot count.
pub fn merge_ranges(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    ranges.sort_by_key(|r| r.start);

    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}
