// ── Scheduling events ──

use serde::Serialize;

use crate::model::{Booking, RefundOutcome, Settlement, UserId};

/// Notification broadcast by the [`Scheduler`](crate::Scheduler) after a
/// state change has committed.
///
/// Receivers observe facts, not requests: by the time an event arrives
/// the ledger already reflects it. Delivery is lossy under backpressure
/// (`tokio::sync::broadcast` semantics), so consumers needing a complete
/// picture should read the stores directly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SchedulingEvent {
    SlotReserved { booking: Booking },
    BookingConfirmed { booking: Booking },
    BookingCompleted { booking: Booking },
    BookingCancelled { booking: Booking, refund: RefundOutcome },
    SettlementCreated { settlement: Settlement },
    SettlementProcessed { settlement: Settlement },
    RulesUpdated { mentor_id: UserId },
    CalendarLinked { mentor_id: UserId },
}

impl SchedulingEvent {
    /// Stable lowercase name of the event variant, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SlotReserved { .. } => "slot_reserved",
            Self::BookingConfirmed { .. } => "booking_confirmed",
            Self::BookingCompleted { .. } => "booking_completed",
            Self::BookingCancelled { .. } => "booking_cancelled",
            Self::SettlementCreated { .. } => "settlement_created",
            Self::SettlementProcessed { .. } => "settlement_processed",
            Self::RulesUpdated { .. } => "rules_updated",
            Self::CalendarLinked { .. } => "calendar_linked",
        }
    }
}
