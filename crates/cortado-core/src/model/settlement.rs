// ── Settlements ──

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BookingId, SettlementId, UserId};

/// Payout status of a settlement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettlementStatus {
    /// Recorded, awaiting payout.
    Pending,
    /// Payout executed; the record is frozen.
    Processed,
}

/// Periodic fee-adjusted payout record for one mentor.
///
/// Created at most once per mentor and period `[period_start,
/// period_end)`; amounts never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub mentor_id: UserId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Sum of included booking prices, smallest currency unit.
    pub gross: u64,
    /// Platform share of `gross`.
    pub fee: u64,
    /// `gross - fee`, owed to the mentor.
    pub net: u64,
    pub status: SettlementStatus,
    /// Completed bookings folded into this settlement, by slot order.
    pub booking_ids: Vec<BookingId>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Platform fee share of a gross amount, round-half-up on the smallest
/// currency unit.
pub fn platform_fee(gross: u64, percent: u8) -> u64 {
    (gross.saturating_mul(u64::from(percent)) + 50) / 100
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn twenty_percent_of_round_gross() {
        let gross = 600_000;
        let fee = platform_fee(gross, 20);
        assert_eq!(fee, 120_000);
        assert_eq!(gross - fee, 480_000);
    }

    #[test]
    fn fractional_fee_rounds_half_up() {
        // 20% of 450,001 is 90,000.2 -> 90,000.
        assert_eq!(platform_fee(450_001, 20), 90_000);
        // 20% of 450,003 is 90,000.6 -> 90,001.
        assert_eq!(platform_fee(450_003, 20), 90_001);
        // An exact half rounds up: 25% of 2 is 0.5 -> 1.
        assert_eq!(platform_fee(2, 25), 1);
    }

    #[test]
    fn zero_gross_zero_fee() {
        assert_eq!(platform_fee(0, 20), 0);
    }

    #[test]
    fn full_percent_never_exceeds_gross() {
        assert_eq!(platform_fee(12_345, 100), 12_345);
    }
}
