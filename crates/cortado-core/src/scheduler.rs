// ── Scheduler abstraction ──
//
// Full lifecycle management for the consultation marketplace.
// Handles mentor registration, slot listings, atomic reservation,
// confirmation against the external calendar, cancellation with refund
// assessment, and periodic settlement.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cortado_calendar::CalendarClient;
use cortado_calendar::types::EventDraft;
use secrecy::SecretString;

use crate::config::{ConfirmationPolicy, SchedulerConfig};
use crate::error::SchedulingError;
use crate::events::SchedulingEvent;
use crate::expand::expand;
use crate::model::{
    AvailabilityRule, Booking, BookingId, CancelOutcome, CancellationRecord, Mentor, Settlement,
    SettlementId, Slot, SlotListing, SlotStatus, TimeRange, UserId, slot_duration,
};
use crate::policy;
use crate::store::{BookingLedger, MentorDirectory, ReservationRequest, SettlementBook};
use crate::sync::{CalendarSynchronizer, annotate_busy};

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Requests ─────────────────────────────────────────────────────

/// A requester's ask for one specific slot.
///
/// The price is not part of the request; it is read from the mentor
/// profile at reservation time and frozen onto the booking.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub mentor_id: UserId,
    pub requester_id: UserId,
    pub slot_start: DateTime<Utc>,
    pub message: Option<String>,
}

// ── Scheduler ────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SchedulerInner>`. Owns the mentor
/// directory, the booking ledger, the settlement book, and the calendar
/// synchronizer; [`start()`](Self::start) spawns the background
/// maintenance tasks (completion sweep, calendar confirmation retry).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    directory: MentorDirectory,
    ledger: BookingLedger,
    settlements: SettlementBook,
    sync: CalendarSynchronizer,
    event_tx: broadcast::Sender<Arc<SchedulingEvent>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a new Scheduler from configuration and a calendar client.
    /// Does NOT spawn background tasks -- call [`start()`](Self::start)
    /// for those.
    pub fn new(config: SchedulerConfig, calendar: CalendarClient) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let sync = CalendarSynchronizer::new(calendar, config.busy_window());
        Self {
            inner: Arc::new(SchedulerInner {
                directory: MentorDirectory::new(),
                ledger: BookingLedger::new(),
                settlements: SettlementBook::new(),
                sync,
                config,
                event_tx,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn directory(&self) -> &MentorDirectory {
        &self.inner.directory
    }

    pub fn ledger(&self) -> &BookingLedger {
        &self.inner.ledger
    }

    pub fn settlements(&self) -> &SettlementBook {
        &self.inner.settlements
    }

    /// Subscribe to scheduling events. Slow receivers lag and lose the
    /// oldest events rather than blocking the engine.
    pub fn events(&self) -> broadcast::Receiver<Arc<SchedulingEvent>> {
        self.inner.event_tx.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the background maintenance tasks. Calling twice is a no-op.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            return;
        }

        let sweep_period = self.inner.config.completion_sweep_interval();
        if !sweep_period.is_zero() {
            handles.push(tokio::spawn(completion_sweep_task(
                self.clone(),
                sweep_period,
                self.inner.cancel.child_token(),
            )));
        }

        let retry_period = self.inner.config.confirmation_retry_interval();
        if !retry_period.is_zero() {
            handles.push(tokio::spawn(confirmation_retry_task(
                self.clone(),
                retry_period,
                self.inner.cancel.child_token(),
            )));
        }
        info!("scheduler background tasks started");
    }

    /// Cancel and join the background tasks.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("scheduler stopped");
    }

    // ── Mentors & rules ──────────────────────────────────────────

    /// Register a mentor (or refresh the profile of an existing one).
    pub fn register_mentor(
        &self,
        id: UserId,
        display_name: impl Into<String>,
        headline: Option<String>,
        price: u64,
    ) -> Result<Arc<Mentor>, SchedulingError> {
        self.inner
            .directory
            .register(id, display_name, headline, price, Utc::now())
    }

    /// Atomically replace a mentor's weekly availability rules.
    pub fn set_rules(
        &self,
        mentor_id: &UserId,
        rules: Vec<AvailabilityRule>,
    ) -> Result<Arc<Mentor>, SchedulingError> {
        let mentor = self.inner.directory.set_rules(mentor_id, rules)?;
        self.emit(SchedulingEvent::RulesUpdated {
            mentor_id: mentor_id.clone(),
        });
        Ok(mentor)
    }

    pub fn rules(&self, mentor_id: &UserId) -> Result<Vec<AvailabilityRule>, SchedulingError> {
        self.inner.directory.rules(mentor_id)
    }

    /// Change a mentor's session price. Future reservations only;
    /// existing bookings keep the price they were made at.
    pub fn set_price(
        &self,
        mentor_id: &UserId,
        price: u64,
    ) -> Result<Arc<Mentor>, SchedulingError> {
        self.inner.directory.set_price(mentor_id, price)
    }

    // ── Calendar link ────────────────────────────────────────────

    /// Link a mentor's external calendar. The token is probed before it
    /// is stored; a rejected token leaves the mentor unlinked.
    pub async fn link_calendar(
        &self,
        mentor_id: &UserId,
        token: SecretString,
    ) -> Result<(), SchedulingError> {
        self.inner.directory.require(mentor_id)?;
        self.inner.sync.link(mentor_id, token, Utc::now()).await?;
        self.emit(SchedulingEvent::CalendarLinked {
            mentor_id: mentor_id.clone(),
        });
        Ok(())
    }

    /// Drop a mentor's calendar link. Returns whether one existed.
    pub fn unlink_calendar(&self, mentor_id: &UserId) -> bool {
        self.inner.sync.unlink(mentor_id)
    }

    // ── Listings ─────────────────────────────────────────────────

    /// The mentor's slots inside `range`, annotated with reservation and
    /// external-calendar state.
    ///
    /// The listing is served even when the calendar is unreachable, as
    /// long as a previously fetched busy window exists; the `stale` flag
    /// on the result says so.
    pub async fn available_slots(
        &self,
        mentor_id: &UserId,
        range: TimeRange,
    ) -> Result<SlotListing, SchedulingError> {
        self.list_slots(mentor_id, range, Utc::now()).await
    }

    async fn list_slots(
        &self,
        mentor_id: &UserId,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<SlotListing, SchedulingError> {
        let mentor = self.inner.directory.require(mentor_id)?;
        let view = self.inner.sync.refresh(mentor_id, now).await?;

        let mut slots: Vec<Slot> = expand(mentor_id.clone(), &mentor.rules, range, now).collect();
        let reserved = self.inner.ledger.active_starts(mentor_id, range).await;
        for slot in &mut slots {
            if slot.status == SlotStatus::Open && reserved.contains(&slot.start) {
                slot.status = SlotStatus::Reserved;
            }
        }
        annotate_busy(&mut slots, &view.intervals);

        Ok(SlotListing {
            mentor_id: mentor_id.clone(),
            slots,
            stale: view.stale,
            synced_at: view.synced_at,
        })
    }

    // ── Reservation ──────────────────────────────────────────────

    /// Reserve a slot and drive its confirmation.
    ///
    /// The returned booking is [`Confirmed`](crate::BookingState::Confirmed)
    /// when the calendar hold (or the immediate policy) went through, and
    /// still [`Pending`](crate::BookingState::Pending) when the calendar
    /// did not answer in time; the background retry task finishes the
    /// job.
    pub async fn reserve(&self, request: ReserveRequest) -> Result<Booking, SchedulingError> {
        self.reserve_at(request, Utc::now()).await
    }

    async fn reserve_at(
        &self,
        request: ReserveRequest,
        now: DateTime<Utc>,
    ) -> Result<Booking, SchedulingError> {
        let mentor = self.inner.directory.require(&request.mentor_id)?;
        if !mentor.active {
            return Err(SchedulingError::MentorInactive(request.mentor_id));
        }
        if request.slot_start < now {
            return Err(SchedulingError::SlotInPast {
                start: request.slot_start,
            });
        }

        // The requested instant must be a slot the rules actually produce.
        let day_start = request
            .slot_start
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        let day = TimeRange::new(day_start, day_start + chrono::Duration::days(1));
        let on_grid = expand(request.mentor_id.clone(), &mentor.rules, day, now)
            .any(|slot| slot.start == request.slot_start && slot.status == SlotStatus::Open);
        if !on_grid {
            return Err(SchedulingError::SlotUnavailable {
                mentor_id: request.mentor_id,
                start: request.slot_start,
            });
        }

        // External calendar must not already occupy the hour.
        let view = self
            .inner
            .sync
            .cached_or_refresh(&request.mentor_id, now)
            .await?;
        let hour = TimeRange::new(request.slot_start, request.slot_start + slot_duration());
        if view.overlaps(hour) {
            return Err(SchedulingError::SlotUnavailable {
                mentor_id: request.mentor_id,
                start: request.slot_start,
            });
        }

        // A slot visibly held by someone else is unavailable, not a race.
        if self
            .inner
            .ledger
            .has_active_overlap(&request.mentor_id, request.slot_start)
            .await
        {
            return Err(SchedulingError::SlotUnavailable {
                mentor_id: request.mentor_id,
                start: request.slot_start,
            });
        }

        let booking = self
            .inner
            .ledger
            .reserve(
                ReservationRequest {
                    mentor_id: request.mentor_id.clone(),
                    requester_id: request.requester_id,
                    slot_start: request.slot_start,
                    price: mentor.price,
                    message: request.message,
                },
                now,
            )
            .await?;
        self.emit(SchedulingEvent::SlotReserved {
            booking: booking.clone(),
        });

        let confirmed = match self.inner.config.confirmation {
            ConfirmationPolicy::Immediate => self.confirm_directly(&booking, now).await,
            ConfirmationPolicy::Calendar => {
                if self.inner.sync.is_linked(&booking.mentor_id) {
                    match tokio::time::timeout(
                        self.inner.config.confirmation_timeout(),
                        self.try_confirm(&booking, now),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(booking_id = %booking.id,
                                  "confirmation timed out, booking stays pending");
                            None
                        }
                    }
                } else {
                    // Nothing to hold; confirm on the spot.
                    self.confirm_directly(&booking, now).await
                }
            }
        };
        Ok(confirmed.unwrap_or(booking))
    }

    /// Confirm without touching the calendar (immediate policy or
    /// unlinked mentor).
    async fn confirm_directly(&self, booking: &Booking, now: DateTime<Utc>) -> Option<Booking> {
        match self.inner.ledger.confirm(booking.id, None, now).await {
            Ok(confirmed) => {
                self.emit(SchedulingEvent::BookingConfirmed {
                    booking: confirmed.clone(),
                });
                Some(confirmed)
            }
            Err(err) => {
                warn!(booking_id = %booking.id, error = %err, "confirmation dropped");
                None
            }
        }
    }

    /// Place the calendar hold and confirm the booking. `None` leaves the
    /// booking pending for the retry task.
    async fn try_confirm(&self, booking: &Booking, now: DateTime<Utc>) -> Option<Booking> {
        let draft = event_draft(booking);
        match self.inner.sync.create_event(&booking.mentor_id, &draft).await {
            Ok(event_id) => {
                let hold = event_id.clone();
                match self.inner.ledger.confirm(booking.id, event_id, now).await {
                    Ok(confirmed) => {
                        self.emit(SchedulingEvent::BookingConfirmed {
                            booking: confirmed.clone(),
                        });
                        Some(confirmed)
                    }
                    Err(err) => {
                        // Usually a cancellation that won the race; take
                        // the orphaned hold back off the calendar.
                        if let Some(hold) = hold {
                            self.inner.sync.delete_event(&booking.mentor_id, &hold).await;
                        }
                        warn!(booking_id = %booking.id, error = %err, "confirmation dropped");
                        None
                    }
                }
            }
            Err(err) => {
                warn!(booking_id = %booking.id, error = %err,
                      "calendar hold failed, booking stays pending");
                None
            }
        }
    }

    // ── Cancellation ─────────────────────────────────────────────

    /// Cancel a booking on behalf of one of its parties, assessing the
    /// refund against the cancellation window.
    pub async fn cancel(
        &self,
        booking_id: BookingId,
        actor: &UserId,
        reason: Option<String>,
    ) -> Result<CancelOutcome, SchedulingError> {
        self.cancel_at(booking_id, actor, reason, Utc::now()).await
    }

    async fn cancel_at(
        &self,
        booking_id: BookingId,
        actor: &UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CancelOutcome, SchedulingError> {
        let booking = self.inner.ledger.require(booking_id).await?;
        let assessment = policy::assess(
            booking.slot_start,
            now,
            self.inner.config.cancellation_window(),
        );

        let cancelled = self
            .inner
            .ledger
            .cancel(
                booking_id,
                CancellationRecord {
                    at: now,
                    by: actor.clone(),
                    reason,
                    refund: assessment.refund,
                    policy_reason: assessment.reason.to_owned(),
                },
            )
            .await?;

        if let Some(event_id) = cancelled.calendar_event_id.as_deref() {
            self.inner
                .sync
                .delete_event(&cancelled.mentor_id, event_id)
                .await;
        }
        info!(booking_id = %booking_id, refund = ?assessment.refund, "booking cancelled");
        self.emit(SchedulingEvent::BookingCancelled {
            booking: cancelled.clone(),
            refund: assessment.refund,
        });
        Ok(CancelOutcome {
            booking: cancelled,
            refund: assessment.refund,
            reason: assessment.reason,
        })
    }

    pub async fn booking(&self, id: BookingId) -> Option<Booking> {
        self.inner.ledger.booking(id).await
    }

    /// Every booking held against a mentor, ordered by slot start.
    pub async fn bookings_for_mentor(&self, mentor_id: &UserId) -> Vec<Booking> {
        self.inner.ledger.for_mentor(mentor_id).await
    }

    /// Every booking a requester has made, ordered by slot start.
    pub async fn bookings_for_requester(&self, requester_id: &UserId) -> Vec<Booking> {
        self.inner.ledger.for_requester(requester_id).await
    }

    // ── Maintenance passes ───────────────────────────────────────

    /// Complete every booking whose hour has elapsed. Runs on a timer
    /// once [`start()`](Self::start) is called, and before every
    /// settlement.
    pub async fn run_completion_sweep(&self, now: DateTime<Utc>) -> Vec<Booking> {
        let completed = self.inner.ledger.sweep_completions(now).await;
        for booking in &completed {
            debug!(booking_id = %booking.id, "booking completed");
            self.emit(SchedulingEvent::BookingCompleted {
                booking: booking.clone(),
            });
        }
        completed
    }

    /// Re-drive the calendar confirmation of pending bookings, holds
    /// placed concurrently. Returns how many confirmed.
    pub async fn run_confirmation_pass(&self, now: DateTime<Utc>) -> usize {
        let pending = self.inner.ledger.pending_for_confirmation().await;
        let results = join_all(
            pending
                .iter()
                .map(|booking| self.try_confirm(booking, now)),
        )
        .await;
        results.into_iter().flatten().count()
    }

    // ── Settlement ───────────────────────────────────────────────

    /// Settle `[period_start, period_end)` for one mentor. Idempotent:
    /// rerunning the same period returns the original settlement.
    pub async fn run_settlement(
        &self,
        mentor_id: &UserId,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Settlement, SchedulingError> {
        self.settle_at(mentor_id, period_start, period_end, Utc::now())
            .await
    }

    async fn settle_at(
        &self,
        mentor_id: &UserId,
        period_start: NaiveDate,
        period_end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Settlement, SchedulingError> {
        self.inner.directory.require(mentor_id)?;
        // Fold in bookings that elapsed since the last sweep tick.
        self.run_completion_sweep(now).await;

        let (settlement, created) = self
            .inner
            .settlements
            .run_settlement(
                mentor_id,
                period_start,
                period_end,
                &self.inner.ledger,
                self.inner.config.platform_fee_percent,
                now,
            )
            .await?;
        if created {
            self.emit(SchedulingEvent::SettlementCreated {
                settlement: settlement.clone(),
            });
        }
        Ok(settlement)
    }

    /// Record the payout of a settlement. Idempotent.
    pub async fn mark_settlement_processed(
        &self,
        id: SettlementId,
    ) -> Result<Settlement, SchedulingError> {
        let (settlement, changed) = self.inner.settlements.mark_processed(id, Utc::now()).await?;
        if changed {
            self.emit(SchedulingEvent::SettlementProcessed {
                settlement: settlement.clone(),
            });
        }
        Ok(settlement)
    }

    /// The settlement recorded for exactly this period, if any.
    pub async fn settlement(
        &self,
        mentor_id: &UserId,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Option<Settlement> {
        self.inner
            .settlements
            .for_period(mentor_id, period_start, period_end)
            .await
    }

    fn emit(&self, event: SchedulingEvent) {
        debug!(kind = event.kind(), "scheduling event");
        let _ = self.inner.event_tx.send(Arc::new(event));
    }
}

fn event_draft(booking: &Booking) -> EventDraft {
    EventDraft {
        start: booking.slot_start,
        end: booking.slot_end(),
        title: format!("Coffee chat ({})", booking.requester_id),
        notes: booking.message.clone(),
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn completion_sweep_task(scheduler: Scheduler, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                scheduler.run_completion_sweep(Utc::now()).await;
            }
        }
    }
}

async fn confirmation_retry_task(
    scheduler: Scheduler,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let confirmed = scheduler.run_confirmation_pass(Utc::now()).await;
                if confirmed > 0 {
                    debug!(confirmed, "confirmation retry pass");
                }
            }
        }
    }
}
