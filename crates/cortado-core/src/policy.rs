// ── Cancellation policy ──
//
// Pure refund arithmetic. The ledger decides whether a booking may be
// cancelled at all; this module only answers what the money does.

use chrono::{DateTime, Duration, Utc};

use crate::model::RefundOutcome;

/// Cut-off ahead of the slot start below which a cancellation forfeits
/// the payment.
pub fn default_window() -> Duration {
    Duration::hours(24)
}

/// Outcome of assessing one cancellation against the refund window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub refund: RefundOutcome,
    /// Short human-readable justification, recorded on the booking.
    pub reason: &'static str,
}

/// Assesses a cancellation taken at `cancel_at` for a slot starting at
/// `slot_start`.
///
/// A lead time of exactly `window` still refunds in full; anything
/// shorter, including cancellations after the slot started, forfeits
/// the payment.
pub fn assess(slot_start: DateTime<Utc>, cancel_at: DateTime<Utc>, window: Duration) -> Assessment {
    let lead = slot_start - cancel_at;
    if lead >= window {
        Assessment {
            refund: RefundOutcome::FullRefund,
            reason: "cancelled at or before the refund cutoff",
        }
    } else {
        Assessment {
            refund: RefundOutcome::NoRefund,
            reason: "cancelled inside the refund cutoff",
        }
    }
}
