// ── Mentor record ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;
use super::rule::AvailabilityRule;

/// A mentor offering paid 1:1 sessions.
///
/// Records are never deleted; deactivation stops new bookings while the
/// history (bookings, settlements) stays queryable. The external
/// calendar token is deliberately not here: the synchronizer owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mentor {
    pub id: UserId,
    pub display_name: String,
    pub headline: Option<String>,
    /// Session price in the currency's smallest unit.
    pub price: u64,
    /// Recurring weekly availability, canonically sorted.
    pub rules: Vec<AvailabilityRule>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
