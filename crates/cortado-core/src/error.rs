// ── Core error types ──
//
// Caller-facing errors from cortado-core. Booking conflicts are typed so
// the API layer can tell "re-query availability" (SlotUnavailable,
// ConcurrentReservationConflict) apart from validation problems. Calendar
// transport failures stay internal where the stale cache covers them and
// surface only as `AvailabilityUnknown` / `Calendar`.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::{BookingId, BookingState, SettlementId, UserId};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulingError {
    // ── Mentors & rules ──────────────────────────────────────────────
    #[error("Mentor not found: {0}")]
    MentorNotFound(UserId),

    #[error("Mentor is deactivated: {0}")]
    MentorInactive(UserId),

    /// Rule-set validation failed; nothing was written.
    #[error("Invalid rule set: {reason}")]
    InvalidRuleSet { reason: String },

    #[error("Invalid price: must be positive, in the currency's smallest unit")]
    InvalidPrice,

    // ── Booking ──────────────────────────────────────────────────────
    /// The slot is not an open candidate: off the rule grid, externally
    /// busy, or already held. Re-query availability before retrying.
    #[error("Slot {start} for mentor {mentor_id} is not available")]
    SlotUnavailable {
        mentor_id: UserId,
        start: DateTime<Utc>,
    },

    #[error("Slot {start} has already started")]
    SlotInPast { start: DateTime<Utc> },

    /// The atomic reservation primitive lost a race: the slot looked open
    /// when this request consulted the view, but another reservation
    /// committed first. Refresh availability before retrying.
    #[error("Reservation race lost for slot {start} of mentor {mentor_id}")]
    ConcurrentReservationConflict {
        mentor_id: UserId,
        start: DateTime<Utc>,
    },

    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    #[error("User {actor} is not a party to booking {booking_id}")]
    NotBookingParty { booking_id: BookingId, actor: UserId },

    #[error("Booking {booking_id} cannot move from {from} to {to}")]
    InvalidTransition {
        booking_id: BookingId,
        from: BookingState,
        to: BookingState,
    },

    // ── Calendar ─────────────────────────────────────────────────────
    /// Fail-closed: the calendar is unreachable and no busy intervals
    /// were ever cached for this mentor, so no availability can be
    /// asserted.
    #[error("Availability unknown for mentor {mentor_id}: calendar unreachable and nothing cached")]
    AvailabilityUnknown {
        mentor_id: UserId,
        #[source]
        source: cortado_calendar::Error,
    },

    /// Calendar failure on a path with no cache to degrade to
    /// (e.g. validating a token at link time).
    #[error("Calendar error: {0}")]
    Calendar(#[from] cortado_calendar::Error),

    // ── Settlement ───────────────────────────────────────────────────
    #[error("Invalid settlement period: {start} must precede {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },

    /// A different settlement period already covers part of this range;
    /// the exact same period is returned as success instead.
    #[error("A settlement for mentor {mentor_id} already overlaps {start}..{end}")]
    SettlementAlreadyExists {
        mentor_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Settlement not found: {0}")]
    SettlementNotFound(SettlementId),
}

impl SchedulingError {
    /// Returns `true` when the caller should refresh availability and may
    /// then retry the reservation.
    pub fn is_availability_conflict(&self) -> bool {
        matches!(
            self,
            Self::SlotUnavailable { .. } | Self::ConcurrentReservationConflict { .. }
        )
    }
}
