//! Scheduling engine between `cortado-calendar` and API consumers.
//!
//! This crate owns the business logic and domain model for the cortado
//! consultation marketplace:
//!
//! - **[`Scheduler`]** — Central facade managing the full lifecycle:
//!   mentor registration and availability rules, slot listings, atomic
//!   reservation, cancellation with refund assessment, and periodic
//!   settlement. [`start()`](Scheduler::start) spawns the background
//!   maintenance tasks (completion sweep, calendar confirmation retry);
//!   [`shutdown()`](Scheduler::shutdown) winds them down.
//!
//! - **[`BookingLedger`]** — Authoritative booking store. One lock per
//!   mentor; the write section is the atomic check-and-insert that keeps
//!   any 60-minute interval booked at most once.
//!
//! - **[`expand`]** — Pure, lazy expansion of recurring weekly rules into
//!   concrete candidate slots for a date range.
//!
//! - **[`CalendarSynchronizer`]** — Busy/free reconciliation with the
//!   external calendar, caching per mentor and degrading to the stale
//!   cache when the service is unreachable.
//!
//! - **[`policy`]** — Pure cancellation assessment against the refund
//!   window boundary.
//!
//! - **Domain model** ([`model`]) — Canonical types (`Mentor`,
//!   `AvailabilityRule`, `Slot`, `Booking`, `Settlement`) with opaque
//!   [`UserId`] identifiers from the identity layer.

pub mod config;
pub mod error;
pub mod events;
pub mod expand;
pub mod model;
pub mod policy;
pub mod scheduler;
pub mod store;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConfirmationPolicy, SchedulerConfig};
pub use error::SchedulingError;
pub use events::SchedulingEvent;
pub use expand::{SlotIter, expand};
pub use scheduler::{ReserveRequest, Scheduler};
pub use store::{BookingLedger, MentorDirectory, ReservationRequest, SettlementBook};
pub use sync::{BusyView, CalendarSynchronizer};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AvailabilityRule,
    Booking,
    BookingId,
    BookingState,
    CancelOutcome,
    CancellationRecord,
    Mentor,
    RefundOutcome,
    Settlement,
    SettlementId,
    SettlementStatus,
    Slot,
    SlotListing,
    SlotStatus,
    TimeRange,
    UserId,
};
