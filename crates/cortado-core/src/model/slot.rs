// ── Slots ──
//
// Slots are derived, never persisted: recomputed per query from the
// rules, the busy cache, and the ledger, then discarded.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;
use super::interval::TimeRange;

/// Fixed length of every bookable slot.
pub const SLOT_MINUTES: i64 = 60;

/// The slot length as a `chrono::Duration`.
pub fn slot_duration() -> Duration {
    Duration::minutes(SLOT_MINUTES)
}

/// Availability state of a derived slot.
///
/// Annotation precedence: `Past`, then `Reserved` (our own ledger, which
/// also wins over the mirror of our own event on the external calendar),
/// then `Busy` (external), else `Open`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlotStatus {
    /// Bookable.
    Open,
    /// Blocked by an external calendar busy interval.
    Busy,
    /// Held by a Pending or Confirmed booking.
    Reserved,
    /// Start instant already elapsed; kept for audit queries only.
    Past,
}

/// A concrete 60-minute candidate interval for one mentor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub mentor_id: UserId,
    pub start: DateTime<Utc>,
    pub status: SlotStatus,
}

impl Slot {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + slot_duration()
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end())
    }

    pub fn bookable(&self) -> bool {
        matches!(self.status, SlotStatus::Open)
    }
}

/// Result of an availability query: the annotated slots plus the
/// provenance of the busy data they were adjusted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotListing {
    pub mentor_id: UserId,
    pub slots: Vec<Slot>,
    /// `true` when the busy adjustment came from the cache because the
    /// calendar service was unreachable.
    pub stale: bool,
    /// When the busy intervals were last fetched, if ever.
    pub synced_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn slot_end_is_sixty_minutes_after_start() {
        let slot = Slot {
            mentor_id: UserId::from("m-1"),
            start: Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
            status: SlotStatus::Open,
        };
        assert_eq!(slot.end(), Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap());
        assert!(slot.bookable());
    }

    #[test]
    fn only_open_slots_are_bookable() {
        let base = Slot {
            mentor_id: UserId::from("m-1"),
            start: Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
            status: SlotStatus::Open,
        };
        for status in [SlotStatus::Busy, SlotStatus::Reserved, SlotStatus::Past] {
            let slot = Slot { status, ..base.clone() };
            assert!(!slot.bookable(), "{status} must not be bookable");
        }
    }

    #[test]
    fn status_round_trips_strum() {
        assert_eq!(SlotStatus::Busy.to_string(), "busy");
        assert_eq!("reserved".parse::<SlotStatus>().unwrap(), SlotStatus::Reserved);
    }
}
