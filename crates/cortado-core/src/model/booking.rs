// ── Bookings ──

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BookingId, SettlementId, UserId};
use super::interval::TimeRange;

/// Lifecycle state of a booking.
///
/// `Pending → Confirmed → Completed`, with `Cancelled` reachable from the
/// two active states. `Completed` and `Cancelled` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingState {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingState {
    /// Active bookings hold their slot against other reservations.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Legal state-machine edges. Completion from `Pending` covers a
    /// booking whose slot elapsed before the calendar ever acknowledged
    /// it; the reservation was never rolled back, so the session counts.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending | Self::Confirmed, Self::Completed | Self::Cancelled)
        )
    }
}

/// Refund outcome of a cancellation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefundOutcome {
    FullRefund,
    NoRefund,
}

/// Audit record attached when a booking is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub at: DateTime<Utc>,
    pub by: UserId,
    pub reason: Option<String>,
    pub refund: RefundOutcome,
    /// The policy rule that produced the outcome.
    pub policy_reason: String,
}

/// A reservation of one mentor slot.
///
/// Immutable once terminal, except for the settlement linkage written
/// when a completed booking is swept into a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub mentor_id: UserId,
    pub requester_id: UserId,
    pub slot_start: DateTime<Utc>,
    pub duration_minutes: i64,
    /// Message from the requester, carried onto the calendar event.
    pub message: Option<String>,
    /// Price captured at reservation time, smallest currency unit.
    pub price: u64,
    pub state: BookingState,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Event id on the mentor's external calendar, once placed.
    pub calendar_event_id: Option<String>,
    pub cancellation: Option<CancellationRecord>,
    pub settlement_id: Option<SettlementId>,
}

impl Booking {
    pub fn slot_end(&self) -> DateTime<Utc> {
        self.slot_start + Duration::minutes(self.duration_minutes)
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.slot_start, self.slot_end())
    }

    /// Only the requester and the mentor are parties to a booking.
    pub fn is_party(&self, user: &UserId) -> bool {
        user == &self.mentor_id || user == &self.requester_id
    }
}

/// What a cancellation returned to the caller: the terminal booking and
/// the refund assessment that was committed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub booking: Booking,
    pub refund: RefundOutcome,
    pub reason: &'static str,
}
