// ── Booking ledger ──
//
// Authoritative store for bookings and the single place where double
// booking is prevented. Bookings are sharded per mentor behind one
// `RwLock` each; the conflict check and the insert of a new booking run
// inside the same write-guard section, so at most one of any number of
// racing reservations for an hour can commit.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SchedulingError;
use crate::model::{
    Booking, BookingId, BookingState, CancellationRecord, SLOT_MINUTES, SettlementId, TimeRange,
    UserId, slot_duration,
};

/// Inputs to [`BookingLedger::reserve`].
///
/// The price is captured here rather than read from the mentor profile so
/// a later price change never rewrites history.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub mentor_id: UserId,
    pub requester_id: UserId,
    pub slot_start: DateTime<Utc>,
    pub price: u64,
    pub message: Option<String>,
}

#[derive(Debug, Default)]
struct MentorBook {
    /// Start time -> booking id, active (pending or confirmed) bookings
    /// only. Keys never overlap by less than a slot length.
    active: BTreeMap<DateTime<Utc>, BookingId>,
    /// Full history for this mentor, terminal states included.
    bookings: HashMap<BookingId, Booking>,
}

impl MentorBook {
    /// Any active booking whose hour intersects a slot starting at
    /// `start`.
    fn overlapping(&self, start: DateTime<Utc>) -> Option<BookingId> {
        self.active
            .range((
                Bound::Excluded(start - slot_duration()),
                Bound::Excluded(start + slot_duration()),
            ))
            .map(|(_, id)| *id)
            .next()
    }
}

/// Concurrent booking store, sharded per mentor.
#[derive(Debug, Default)]
pub struct BookingLedger {
    books: DashMap<UserId, Arc<RwLock<MentorBook>>>,
    /// Booking id -> owning mentor, so lookups skip the scan.
    index: DashMap<BookingId, UserId>,
}

impl BookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically reserves a slot, admitting at most one booking per
    /// mentor-hour.
    ///
    /// The overlap check and the insert share one write-guard section:
    /// of N concurrent calls for the same slot exactly one returns the
    /// new [`BookingState::Pending`] booking and the rest get
    /// [`SchedulingError::ConcurrentReservationConflict`].
    pub async fn reserve(
        &self,
        request: ReservationRequest,
        now: DateTime<Utc>,
    ) -> Result<Booking, SchedulingError> {
        if request.slot_start < now {
            return Err(SchedulingError::SlotInPast {
                start: request.slot_start,
            });
        }

        let book = self.book(&request.mentor_id);
        let mut guard = book.write().await;

        if guard.overlapping(request.slot_start).is_some() {
            return Err(SchedulingError::ConcurrentReservationConflict {
                mentor_id: request.mentor_id,
                start: request.slot_start,
            });
        }

        let booking = Booking {
            id: BookingId::mint(),
            mentor_id: request.mentor_id,
            requester_id: request.requester_id,
            slot_start: request.slot_start,
            duration_minutes: SLOT_MINUTES,
            message: request.message,
            price: request.price,
            state: BookingState::Pending,
            created_at: now,
            confirmed_at: None,
            completed_at: None,
            calendar_event_id: None,
            cancellation: None,
            settlement_id: None,
        };
        guard.active.insert(booking.slot_start, booking.id);
        guard.bookings.insert(booking.id, booking.clone());
        self.index.insert(booking.id, booking.mentor_id.clone());
        debug!(booking_id = %booking.id, mentor_id = %booking.mentor_id,
               start = %booking.slot_start, "slot reserved");
        Ok(booking)
    }

    /// Moves a pending booking to confirmed, recording the calendar hold
    /// if one was created. Confirming an already confirmed booking is a
    /// no-op returning the stored record.
    pub async fn confirm(
        &self,
        id: BookingId,
        calendar_event_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Booking, SchedulingError> {
        let book = self.book_of(id)?;
        let mut guard = book.write().await;
        let booking = guard
            .bookings
            .get_mut(&id)
            .ok_or(SchedulingError::BookingNotFound(id))?;

        if booking.state == BookingState::Confirmed {
            return Ok(booking.clone());
        }
        if !booking.state.can_advance_to(BookingState::Confirmed) {
            return Err(SchedulingError::InvalidTransition {
                booking_id: id,
                from: booking.state,
                to: BookingState::Confirmed,
            });
        }
        booking.state = BookingState::Confirmed;
        booking.confirmed_at = Some(now);
        booking.calendar_event_id = calendar_event_id;
        Ok(booking.clone())
    }

    /// Cancels an active booking on behalf of `record.by`, which must be
    /// one of the two parties. The hour frees up immediately.
    pub async fn cancel(
        &self,
        id: BookingId,
        record: CancellationRecord,
    ) -> Result<Booking, SchedulingError> {
        let book = self.book_of(id)?;
        let mut guard = book.write().await;
        let MentorBook { active, bookings } = &mut *guard;
        let booking = bookings
            .get_mut(&id)
            .ok_or(SchedulingError::BookingNotFound(id))?;

        if !booking.is_party(&record.by) {
            return Err(SchedulingError::NotBookingParty {
                booking_id: id,
                actor: record.by,
            });
        }
        if !booking.state.can_advance_to(BookingState::Cancelled) {
            return Err(SchedulingError::InvalidTransition {
                booking_id: id,
                from: booking.state,
                to: BookingState::Cancelled,
            });
        }
        active.remove(&booking.slot_start);
        booking.state = BookingState::Cancelled;
        booking.cancellation = Some(record);
        Ok(booking.clone())
    }

    /// Completes every active booking whose hour has fully elapsed and
    /// returns them. Already completed bookings are left alone, so the
    /// sweep is safe to run on any cadence.
    pub async fn sweep_completions(&self, now: DateTime<Utc>) -> Vec<Booking> {
        let mut completed = Vec::new();
        for book in self.all_books() {
            let mut guard = book.write().await;
            let MentorBook { active, bookings } = &mut *guard;
            let elapsed: Vec<DateTime<Utc>> = active
                .range(..=now)
                .filter(|(_, id)| {
                    bookings
                        .get(id)
                        .is_some_and(|booking| booking.slot_end() <= now)
                })
                .map(|(start, _)| *start)
                .collect();
            for start in elapsed {
                let Some(id) = active.remove(&start) else {
                    continue;
                };
                if let Some(booking) = bookings.get_mut(&id) {
                    booking.state = BookingState::Completed;
                    booking.completed_at = Some(now);
                    completed.push(booking.clone());
                }
            }
        }
        completed.sort_by_key(|booking| booking.slot_start);
        completed
    }

    /// Bookings still waiting on a calendar hold, oldest slot first.
    pub async fn pending_for_confirmation(&self) -> Vec<Booking> {
        let mut pending = Vec::new();
        for book in self.all_books() {
            let guard = book.read().await;
            pending.extend(
                guard
                    .bookings
                    .values()
                    .filter(|booking| booking.state == BookingState::Pending)
                    .cloned(),
            );
        }
        pending.sort_by_key(|booking| booking.slot_start);
        pending
    }

    /// True when an active booking intersects a slot starting at `start`.
    pub async fn has_active_overlap(&self, mentor_id: &UserId, start: DateTime<Utc>) -> bool {
        let Some(book) = self.existing_book(mentor_id) else {
            return false;
        };
        let guard = book.read().await;
        guard.overlapping(start).is_some()
    }

    /// Starts of active bookings inside `range`, for annotating listings.
    pub async fn active_starts(&self, mentor_id: &UserId, range: TimeRange) -> Vec<DateTime<Utc>> {
        let Some(book) = self.existing_book(mentor_id) else {
            return Vec::new();
        };
        let guard = book.read().await;
        guard
            .active
            .range(range.start..range.end)
            .map(|(start, _)| *start)
            .collect()
    }

    pub async fn booking(&self, id: BookingId) -> Option<Booking> {
        let book = self.book_of(id).ok()?;
        let guard = book.read().await;
        guard.bookings.get(&id).cloned()
    }

    /// Like [`booking`](Self::booking) but mapping absence to an error.
    pub async fn require(&self, id: BookingId) -> Result<Booking, SchedulingError> {
        self.booking(id)
            .await
            .ok_or(SchedulingError::BookingNotFound(id))
    }

    /// Every booking for one mentor, all states, by slot order.
    pub async fn for_mentor(&self, mentor_id: &UserId) -> Vec<Booking> {
        let Some(book) = self.existing_book(mentor_id) else {
            return Vec::new();
        };
        let guard = book.read().await;
        let mut bookings: Vec<Booking> = guard.bookings.values().cloned().collect();
        bookings.sort_by_key(|booking| booking.slot_start);
        bookings
    }

    /// Every booking made by one requester, across mentors, by slot order.
    pub async fn for_requester(&self, requester_id: &UserId) -> Vec<Booking> {
        let mut bookings = Vec::new();
        for book in self.all_books() {
            let guard = book.read().await;
            bookings.extend(
                guard
                    .bookings
                    .values()
                    .filter(|booking| booking.requester_id == *requester_id)
                    .cloned(),
            );
        }
        bookings.sort_by_key(|booking| booking.slot_start);
        bookings
    }

    /// Completed, not yet settled bookings whose slot starts inside
    /// `period`, by slot order. The settlement layer folds these into a
    /// payout.
    pub async fn settleable_in(&self, mentor_id: &UserId, period: TimeRange) -> Vec<Booking> {
        let Some(book) = self.existing_book(mentor_id) else {
            return Vec::new();
        };
        let guard = book.read().await;
        let mut bookings: Vec<Booking> = guard
            .bookings
            .values()
            .filter(|booking| {
                booking.state == BookingState::Completed
                    && booking.settlement_id.is_none()
                    && period.contains(booking.slot_start)
            })
            .cloned()
            .collect();
        bookings.sort_by_key(|booking| booking.slot_start);
        bookings
    }

    /// Stamps `settlement` onto the given bookings in one guard section.
    pub async fn link_settlement(
        &self,
        mentor_id: &UserId,
        ids: &[BookingId],
        settlement: SettlementId,
    ) {
        let Some(book) = self.existing_book(mentor_id) else {
            return;
        };
        let mut guard = book.write().await;
        for id in ids {
            if let Some(booking) = guard.bookings.get_mut(id) {
                booking.settlement_id = Some(settlement);
            }
        }
    }

    fn book(&self, mentor_id: &UserId) -> Arc<RwLock<MentorBook>> {
        self.books
            .entry(mentor_id.clone())
            .or_default()
            .value()
            .clone()
    }

    fn existing_book(&self, mentor_id: &UserId) -> Option<Arc<RwLock<MentorBook>>> {
        self.books.get(mentor_id).map(|entry| entry.value().clone())
    }

    fn book_of(&self, id: BookingId) -> Result<Arc<RwLock<MentorBook>>, SchedulingError> {
        let mentor_id = self
            .index
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(SchedulingError::BookingNotFound(id))?;
        self.existing_book(&mentor_id)
            .ok_or(SchedulingError::BookingNotFound(id))
    }

    /// Clones out the shard handles so no `DashMap` guard is ever held
    /// across an await.
    fn all_books(&self) -> Vec<Arc<RwLock<MentorBook>>> {
        self.books
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
