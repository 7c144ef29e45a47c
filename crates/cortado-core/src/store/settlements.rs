// ── Settlement book ──
//
// Periodic payouts per mentor. The period map and the settlement records
// share one `RwLock` per mentor, so "has this period been settled"
// and "record the new settlement" are a single atomic step; rerunning a
// settlement can therefore only ever find (and return) the first run's
// record.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::SchedulingError;
use crate::model::{Settlement, SettlementId, SettlementStatus, TimeRange, UserId, platform_fee};

use super::ledger::BookingLedger;

#[derive(Debug, Default)]
struct MentorSettlements {
    /// Period start -> settlement id. Periods never overlap.
    periods: BTreeMap<NaiveDate, SettlementId>,
    settlements: HashMap<SettlementId, Settlement>,
}

/// Store of per-mentor settlement runs.
#[derive(Debug, Default)]
pub struct SettlementBook {
    books: DashMap<UserId, Arc<RwLock<MentorSettlements>>>,
    index: DashMap<SettlementId, UserId>,
}

impl SettlementBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settles `[period_start, period_end)` for one mentor.
    ///
    /// Folds every completed, not yet settled booking of the period into
    /// a new settlement, stamps those bookings, and returns it with
    /// `true`. Rerunning the exact period returns the original record
    /// unchanged with `false`; a period that overlaps a different
    /// settled one is refused.
    pub async fn run_settlement(
        &self,
        mentor_id: &UserId,
        period_start: NaiveDate,
        period_end: NaiveDate,
        ledger: &BookingLedger,
        fee_percent: u8,
        now: DateTime<Utc>,
    ) -> Result<(Settlement, bool), SchedulingError> {
        if period_start >= period_end {
            return Err(SchedulingError::InvalidPeriod {
                start: period_start,
                end: period_end,
            });
        }

        let book = self.book(mentor_id);
        let mut guard = book.write().await;

        // The latest period starting before ours is the only candidate
        // for an overlap.
        if let Some((_, id)) = guard.periods.range(..period_end).next_back() {
            if let Some(existing) = guard.settlements.get(id) {
                if existing.period_start == period_start && existing.period_end == period_end {
                    return Ok((existing.clone(), false));
                }
                if existing.period_end > period_start {
                    return Err(SchedulingError::SettlementAlreadyExists {
                        mentor_id: mentor_id.clone(),
                        start: existing.period_start,
                        end: existing.period_end,
                    });
                }
            }
        }

        let period = TimeRange::new(
            period_start.and_time(NaiveTime::MIN).and_utc(),
            period_end.and_time(NaiveTime::MIN).and_utc(),
        );
        let bookings = ledger.settleable_in(mentor_id, period).await;
        let booking_ids: Vec<_> = bookings.iter().map(|booking| booking.id).collect();
        let gross: u64 = bookings.iter().map(|booking| booking.price).sum();
        let fee = platform_fee(gross, fee_percent);

        let settlement = Settlement {
            id: SettlementId::mint(),
            mentor_id: mentor_id.clone(),
            period_start,
            period_end,
            gross,
            fee,
            net: gross.saturating_sub(fee),
            status: SettlementStatus::Pending,
            booking_ids: booking_ids.clone(),
            created_at: now,
            processed_at: None,
        };
        guard.periods.insert(period_start, settlement.id);
        guard
            .settlements
            .insert(settlement.id, settlement.clone());
        self.index.insert(settlement.id, mentor_id.clone());
        ledger
            .link_settlement(mentor_id, &booking_ids, settlement.id)
            .await;

        info!(settlement_id = %settlement.id, mentor_id = %mentor_id,
              bookings = booking_ids.len(), gross, fee = settlement.fee,
              "settlement recorded");
        Ok((settlement, true))
    }

    /// Marks a settlement as paid out. Reprocessing returns the frozen
    /// record with `false` and keeps the original timestamp.
    pub async fn mark_processed(
        &self,
        id: SettlementId,
        now: DateTime<Utc>,
    ) -> Result<(Settlement, bool), SchedulingError> {
        let book = self.book_of(id)?;
        let mut guard = book.write().await;
        let settlement = guard
            .settlements
            .get_mut(&id)
            .ok_or(SchedulingError::SettlementNotFound(id))?;

        if settlement.status == SettlementStatus::Processed {
            return Ok((settlement.clone(), false));
        }
        settlement.status = SettlementStatus::Processed;
        settlement.processed_at = Some(now);
        Ok((settlement.clone(), true))
    }

    pub async fn settlement(&self, id: SettlementId) -> Option<Settlement> {
        let book = self.book_of(id).ok()?;
        let guard = book.read().await;
        guard.settlements.get(&id).cloned()
    }

    /// The settlement covering exactly `[period_start, period_end)`, if
    /// that period has been run.
    pub async fn for_period(
        &self,
        mentor_id: &UserId,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Option<Settlement> {
        let book = self.books.get(mentor_id).map(|entry| entry.value().clone())?;
        let guard = book.read().await;
        let id = guard.periods.get(&period_start)?;
        guard
            .settlements
            .get(id)
            .filter(|settlement| settlement.period_end == period_end)
            .cloned()
    }

    /// Every settlement for one mentor, by period order.
    pub async fn for_mentor(&self, mentor_id: &UserId) -> Vec<Settlement> {
        let Some(book) = self.books.get(mentor_id).map(|entry| entry.value().clone()) else {
            return Vec::new();
        };
        let guard = book.read().await;
        guard
            .periods
            .values()
            .filter_map(|id| guard.settlements.get(id).cloned())
            .collect()
    }

    fn book(&self, mentor_id: &UserId) -> Arc<RwLock<MentorSettlements>> {
        self.books
            .entry(mentor_id.clone())
            .or_default()
            .value()
            .clone()
    }

    fn book_of(&self, id: SettlementId) -> Result<Arc<RwLock<MentorSettlements>>, SchedulingError> {
        let mentor_id = self
            .index
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(SchedulingError::SettlementNotFound(id))?;
        self.books
            .get(&mentor_id)
            .map(|entry| entry.value().clone())
            .ok_or(SchedulingError::SettlementNotFound(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    use crate::store::ledger::ReservationRequest;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(slot_start: DateTime<Utc>, price: u64) -> ReservationRequest {
        ReservationRequest {
            mentor_id: UserId::from("mentor-1"),
            requester_id: UserId::from("requester-1"),
            slot_start,
            price,
            message: None,
        }
    }

    /// Three completed 50,000 bookings on 2026-03-02.
    async fn ledger_with_completed() -> BookingLedger {
        let ledger = BookingLedger::new();
        let first = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        for hour in 0..3 {
            ledger
                .reserve(request(first + Duration::hours(hour), 50_000), now())
                .await
                .unwrap();
        }
        ledger.sweep_completions(first + Duration::hours(4)).await;
        ledger
    }

    #[tokio::test]
    async fn settles_completed_bookings_with_the_platform_fee() {
        let ledger = ledger_with_completed().await;
        let book = SettlementBook::new();
        let mentor = UserId::from("mentor-1");

        let (settlement, created) = book
            .run_settlement(&mentor, date(2026, 3, 1), date(2026, 3, 31), &ledger, 20, now())
            .await
            .unwrap();

        assert!(created);
        assert_eq!(settlement.gross, 150_000);
        assert_eq!(settlement.fee, 30_000);
        assert_eq!(settlement.net, 120_000);
        assert_eq!(settlement.status, SettlementStatus::Pending);
        assert_eq!(settlement.booking_ids.len(), 3);

        // Every folded booking carries the settlement id.
        for id in &settlement.booking_ids {
            assert_eq!(
                ledger.booking(*id).await.unwrap().settlement_id,
                Some(settlement.id)
            );
        }
    }

    #[tokio::test]
    async fn rerunning_the_same_period_returns_the_original_unchanged() {
        let ledger = ledger_with_completed().await;
        let book = SettlementBook::new();
        let mentor = UserId::from("mentor-1");

        let (first, _) = book
            .run_settlement(&mentor, date(2026, 3, 1), date(2026, 3, 31), &ledger, 20, now())
            .await
            .unwrap();

        // A booking completing after the run does not reopen it.
        let late_slot = Utc.with_ymd_and_hms(2026, 3, 9, 9, 0, 0).unwrap();
        ledger.reserve(request(late_slot, 99_000), now()).await.unwrap();
        ledger
            .sweep_completions(late_slot + Duration::hours(2))
            .await;

        let (second, created) = book
            .run_settlement(&mentor, date(2026, 3, 1), date(2026, 3, 31), &ledger, 20, now())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.gross, 150_000);
    }

    #[tokio::test]
    async fn overlapping_period_is_refused_but_adjacent_is_fine() {
        let ledger = ledger_with_completed().await;
        let book = SettlementBook::new();
        let mentor = UserId::from("mentor-1");

        book.run_settlement(&mentor, date(2026, 3, 1), date(2026, 3, 31), &ledger, 20, now())
            .await
            .unwrap();

        let err = book
            .run_settlement(&mentor, date(2026, 3, 15), date(2026, 4, 15), &ledger, 20, now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::SettlementAlreadyExists { .. }));

        // Half-open periods may touch.
        book.run_settlement(&mentor, date(2026, 3, 31), date(2026, 4, 30), &ledger, 20, now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn inverted_or_empty_period_is_refused() {
        let ledger = BookingLedger::new();
        let book = SettlementBook::new();
        let mentor = UserId::from("mentor-1");

        for (start, end) in [
            (date(2026, 3, 31), date(2026, 3, 1)),
            (date(2026, 3, 1), date(2026, 3, 1)),
        ] {
            let err = book
                .run_settlement(&mentor, start, end, &ledger, 20, now())
                .await
                .unwrap_err();
            assert!(matches!(err, SchedulingError::InvalidPeriod { .. }));
        }
    }

    #[tokio::test]
    async fn a_quiet_period_settles_to_zero() {
        let ledger = BookingLedger::new();
        let book = SettlementBook::new();
        let mentor = UserId::from("mentor-1");

        let (settlement, created) = book
            .run_settlement(&mentor, date(2026, 3, 1), date(2026, 3, 31), &ledger, 20, now())
            .await
            .unwrap();
        assert!(created);
        assert_eq!(settlement.gross, 0);
        assert_eq!(settlement.net, 0);
        assert!(settlement.booking_ids.is_empty());
    }

    #[tokio::test]
    async fn fee_rounds_half_up_on_the_period_total() {
        let ledger = BookingLedger::new();
        let slot = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        ledger.reserve(request(slot, 450_001), now()).await.unwrap();
        ledger.sweep_completions(slot + Duration::hours(2)).await;

        let book = SettlementBook::new();
        let (settlement, _) = book
            .run_settlement(
                &UserId::from("mentor-1"),
                date(2026, 3, 1),
                date(2026, 3, 31),
                &ledger,
                20,
                now(),
            )
            .await
            .unwrap();
        assert_eq!(settlement.fee, 90_000);
        assert_eq!(settlement.net, 360_001);
    }

    #[tokio::test]
    async fn mark_processed_freezes_the_record() {
        let ledger = ledger_with_completed().await;
        let book = SettlementBook::new();
        let mentor = UserId::from("mentor-1");
        let (settlement, _) = book
            .run_settlement(&mentor, date(2026, 3, 1), date(2026, 3, 31), &ledger, 20, now())
            .await
            .unwrap();

        let paid_at = now() + Duration::days(3);
        let (processed, changed) = book.mark_processed(settlement.id, paid_at).await.unwrap();
        assert!(changed);
        assert_eq!(processed.status, SettlementStatus::Processed);
        assert_eq!(processed.processed_at, Some(paid_at));

        let (again, changed) = book
            .mark_processed(settlement.id, paid_at + Duration::days(1))
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(again.processed_at, Some(paid_at));
    }

    #[tokio::test]
    async fn unknown_settlement_is_an_error() {
        let book = SettlementBook::new();
        let err = book.mark_processed(SettlementId::mint(), now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::SettlementNotFound(_)));
    }

    #[tokio::test]
    async fn mentor_settlements_come_back_in_period_order() {
        let ledger = ledger_with_completed().await;
        let book = SettlementBook::new();
        let mentor = UserId::from("mentor-1");

        book.run_settlement(&mentor, date(2026, 4, 1), date(2026, 4, 30), &ledger, 20, now())
            .await
            .unwrap();
        book.run_settlement(&mentor, date(2026, 3, 1), date(2026, 3, 31), &ledger, 20, now())
            .await
            .unwrap();

        let all = book.for_mentor(&mentor).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].period_start, date(2026, 3, 1));
        assert_eq!(all[1].period_start, date(2026, 4, 1));
    }

    #[tokio::test]
    async fn period_lookup_needs_the_exact_bounds() {
        let ledger = ledger_with_completed().await;
        let book = SettlementBook::new();
        let mentor = UserId::from("mentor-1");
        let (settlement, _) = book
            .run_settlement(&mentor, date(2026, 3, 1), date(2026, 3, 31), &ledger, 20, now())
            .await
            .unwrap();

        let found = book
            .for_period(&mentor, date(2026, 3, 1), date(2026, 3, 31))
            .await;
        assert_eq!(found.map(|s| s.id), Some(settlement.id));
        assert!(
            book.for_period(&mentor, date(2026, 3, 1), date(2026, 4, 1))
                .await
                .is_none()
        );
        assert!(
            book.for_period(&mentor, date(2026, 3, 2), date(2026, 3, 31))
                .await
                .is_none()
        );
    }
}
