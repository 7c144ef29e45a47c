// ── Domain model ──
//
// Canonical types for the scheduling engine. Slots are derived values,
// rebuilt on every query; bookings and settlements are the persisted
// records. All instants are UTC.

pub mod booking;
pub mod ids;
pub mod interval;
pub mod mentor;
pub mod rule;
pub mod settlement;
pub mod slot;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use cortado_core::model::*` gives you everything.

// Identity
pub use ids::{BookingId, SettlementId, UserId};

// Intervals
pub use interval::{TimeRange, merge_ranges};

// Availability
pub use mentor::Mentor;
pub use rule::{AvailabilityRule, validate_rule_set};
pub use slot::{SLOT_MINUTES, Slot, SlotListing, SlotStatus, slot_duration};

// Bookings
pub use booking::{Booking, BookingState, CancelOutcome, CancellationRecord, RefundOutcome};

// Settlements
pub use settlement::{Settlement, SettlementStatus, platform_fee};
