// ── In-memory stores ──
//
// Concurrent maps at the top, one async lock per mentor underneath.
// Reads take cheap snapshots; every mutation that must be atomic runs
// inside a single write-guard section.

pub mod directory;
pub mod ledger;
pub mod settlements;

pub use directory::MentorDirectory;
pub use ledger::{BookingLedger, ReservationRequest};
pub use settlements::SettlementBook;
