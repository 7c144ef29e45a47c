// ── Calendar synchronization ──
//
// Keeps a per-mentor cache of external busy intervals and reconciles it
// with listings and reservations. The calendar is advisory for reads:
// when it is unreachable the last fetched window is served marked stale,
// and only a mentor with no cached window at all fails closed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use cortado_calendar::CalendarClient;
use cortado_calendar::types::EventDraft;

use crate::error::SchedulingError;
use crate::model::{Slot, SlotStatus, TimeRange, UserId, merge_ranges};

/// Reservation paths reuse a busy window at most this old instead of
/// refetching; listings always refresh.
const BUSY_REUSE_SECS: i64 = 300;

/// One mentor's busy intervals as last fetched.
#[derive(Debug, Clone)]
struct BusyCacheEntry {
    intervals: Arc<Vec<TimeRange>>,
    fetched_at: DateTime<Utc>,
}

/// Busy intervals handed to the scheduling paths, with provenance.
#[derive(Debug, Clone)]
pub struct BusyView {
    /// Merged, non-overlapping intervals in ascending order.
    pub intervals: Arc<Vec<TimeRange>>,
    /// True when the calendar was unreachable and this is the cached
    /// window from an earlier fetch.
    pub stale: bool,
    /// When the intervals were actually fetched; `None` for mentors
    /// without a linked calendar.
    pub synced_at: Option<DateTime<Utc>>,
}

impl BusyView {
    fn unlinked() -> Self {
        Self {
            intervals: Arc::new(Vec::new()),
            stale: false,
            synced_at: None,
        }
    }

    /// True when any busy interval intersects `range`.
    pub fn overlaps(&self, range: TimeRange) -> bool {
        self.intervals.iter().any(|busy| busy.overlaps(&range))
    }
}

/// Marks open slots that collide with external busy intervals.
///
/// Only [`SlotStatus::Open`] slots are touched; past and reserved slots
/// keep their status.
pub fn annotate_busy(slots: &mut [Slot], busy: &[TimeRange]) {
    for slot in slots {
        if slot.status == SlotStatus::Open && busy.iter().any(|b| b.overlaps(&slot.range())) {
            slot.status = SlotStatus::Busy;
        }
    }
}

/// Per-mentor calendar link registry and busy-window cache.
pub struct CalendarSynchronizer {
    client: CalendarClient,
    /// How far ahead of `now` busy intervals are fetched.
    window: Duration,
    tokens: DashMap<UserId, SecretString>,
    cache: DashMap<UserId, BusyCacheEntry>,
}

impl CalendarSynchronizer {
    pub fn new(client: CalendarClient, window: Duration) -> Self {
        Self {
            client,
            window,
            tokens: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Stores a mentor's calendar token after proving it with a minimal
    /// busy probe. A failed probe leaves the mentor unlinked.
    pub async fn link(
        &self,
        mentor_id: &UserId,
        token: SecretString,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        self.client
            .fetch_busy_intervals(&token, now, now + Duration::hours(1))
            .await?;
        self.tokens.insert(mentor_id.clone(), token);
        info!(mentor_id = %mentor_id, "calendar linked");
        Ok(())
    }

    /// Drops the mentor's token and cached busy window. Returns whether
    /// a link existed.
    pub fn unlink(&self, mentor_id: &UserId) -> bool {
        let had_link = self.tokens.remove(mentor_id).is_some();
        self.cache.remove(mentor_id);
        if had_link {
            info!(mentor_id = %mentor_id, "calendar unlinked");
        }
        had_link
    }

    pub fn is_linked(&self, mentor_id: &UserId) -> bool {
        self.tokens.contains_key(mentor_id)
    }

    /// Fetches the busy window `[now, now + window)` for one mentor.
    ///
    /// On a fetch failure the cached window is served with `stale`
    /// set; with nothing cached the failure surfaces as
    /// [`SchedulingError::AvailabilityUnknown`]. Unlinked mentors get an
    /// empty, non-stale view.
    pub async fn refresh(
        &self,
        mentor_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<BusyView, SchedulingError> {
        let Some(token) = self.token(mentor_id) else {
            return Ok(BusyView::unlinked());
        };

        match self
            .client
            .fetch_busy_intervals(&token, now, now + self.window)
            .await
        {
            Ok(intervals) => {
                let merged = merge_ranges(intervals.into_iter().map(TimeRange::from).collect());
                let entry = BusyCacheEntry {
                    intervals: Arc::new(merged),
                    fetched_at: now,
                };
                self.cache.insert(mentor_id.clone(), entry.clone());
                debug!(mentor_id = %mentor_id, intervals = entry.intervals.len(),
                       "busy window refreshed");
                Ok(BusyView {
                    intervals: entry.intervals,
                    stale: false,
                    synced_at: Some(now),
                })
            }
            Err(err) => {
                if let Some(entry) = self.cache.get(mentor_id) {
                    warn!(mentor_id = %mentor_id, error = %err,
                          "calendar unreachable, serving cached busy window");
                    return Ok(BusyView {
                        intervals: entry.intervals.clone(),
                        stale: true,
                        synced_at: Some(entry.fetched_at),
                    });
                }
                Err(SchedulingError::AvailabilityUnknown {
                    mentor_id: mentor_id.clone(),
                    source: err,
                })
            }
        }
    }

    /// Like [`refresh`](Self::refresh) but reusing a recent fetch, for
    /// paths where the caller just consulted a listing.
    pub async fn cached_or_refresh(
        &self,
        mentor_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<BusyView, SchedulingError> {
        if let Some(entry) = self.cache.get(mentor_id) {
            if now - entry.fetched_at <= Duration::seconds(BUSY_REUSE_SECS) {
                return Ok(BusyView {
                    intervals: entry.intervals.clone(),
                    stale: false,
                    synced_at: Some(entry.fetched_at),
                });
            }
        }
        self.refresh(mentor_id, now).await
    }

    /// Places a confirmation hold on the mentor's calendar. `None` means
    /// the mentor has no linked calendar and nothing was created.
    pub async fn create_event(
        &self,
        mentor_id: &UserId,
        draft: &EventDraft,
    ) -> Result<Option<String>, cortado_calendar::Error> {
        let Some(token) = self.token(mentor_id) else {
            return Ok(None);
        };
        let created = self.client.create_event(&token, draft).await?;
        debug!(mentor_id = %mentor_id, event_id = %created.event_id, "calendar hold created");
        Ok(Some(created.event_id))
    }

    /// Removes a previously placed hold, best effort: a failure is
    /// logged and the cancellation proceeds regardless.
    pub async fn delete_event(&self, mentor_id: &UserId, event_id: &str) {
        let Some(token) = self.token(mentor_id) else {
            return;
        };
        match self.client.delete_event(&token, event_id).await {
            Ok(()) => {
                // The freed hour should not linger as busy in the cache.
                self.cache.remove(mentor_id);
                debug!(mentor_id = %mentor_id, event_id, "calendar hold removed");
            }
            Err(err) if err.is_not_found() => {
                self.cache.remove(mentor_id);
            }
            Err(err) => {
                warn!(mentor_id = %mentor_id, event_id, error = %err,
                      "failed to remove calendar hold");
            }
        }
    }

    fn token(&self, mentor_id: &UserId) -> Option<SecretString> {
        self.tokens.get(mentor_id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use cortado_calendar::TransportConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn mentor() -> UserId {
        UserId::from("mentor-1")
    }

    fn token() -> SecretString {
        "cal-token-123".to_string().into()
    }

    async fn setup() -> (MockServer, CalendarSynchronizer) {
        let server = MockServer::start().await;
        let client = CalendarClient::new(&server.uri(), &TransportConfig::default()).unwrap();
        (server, CalendarSynchronizer::new(client, Duration::days(60)))
    }

    fn busy_body() -> serde_json::Value {
        json!({
            "intervals": [
                { "start": "2026-03-02T10:00:00Z", "end": "2026-03-02T11:00:00Z" },
                { "start": "2026-03-02T10:30:00Z", "end": "2026-03-02T12:00:00Z" },
            ]
        })
    }

    #[tokio::test]
    async fn unlinked_mentor_gets_an_empty_view() {
        let (_server, sync) = setup().await;
        let view = sync.refresh(&mentor(), now()).await.unwrap();
        assert!(view.intervals.is_empty());
        assert!(!view.stale);
        assert_eq!(view.synced_at, None);
    }

    #[tokio::test]
    async fn refresh_merges_overlapping_intervals() {
        let (server, sync) = setup().await;
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(busy_body()))
            .mount(&server)
            .await;

        sync.link(&mentor(), token(), now()).await.unwrap();
        let view = sync.refresh(&mentor(), now()).await.unwrap();

        assert!(!view.stale);
        assert_eq!(view.synced_at, Some(now()));
        assert_eq!(
            *view.intervals,
            vec![TimeRange::new(
                Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            )]
        );
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_the_cached_window() {
        let (server, sync) = setup().await;
        // Probe and first refresh succeed, everything after fails.
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(busy_body()))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        sync.link(&mentor(), token(), now()).await.unwrap();
        let fresh = sync.refresh(&mentor(), now()).await.unwrap();

        let later = now() + Duration::minutes(20);
        let degraded = sync.refresh(&mentor(), later).await.unwrap();
        assert!(degraded.stale);
        assert_eq!(degraded.synced_at, Some(now()));
        assert_eq!(degraded.intervals, fresh.intervals);
    }

    #[tokio::test]
    async fn fetch_failure_with_no_cache_fails_closed() {
        let (server, sync) = setup().await;
        // Only the link probe succeeds.
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "intervals": [] })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        sync.link(&mentor(), token(), now()).await.unwrap();
        let err = sync.refresh(&mentor(), now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::AvailabilityUnknown { .. }));
    }

    #[tokio::test]
    async fn a_rejected_token_is_not_stored() {
        let (server, sync) = setup().await;
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = sync.link(&mentor(), token(), now()).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::Calendar(ref inner) if inner.is_auth_rejected()
        ));
        assert!(!sync.is_linked(&mentor()));
    }

    #[tokio::test]
    async fn reservation_path_reuses_a_recent_window() {
        let (server, sync) = setup().await;
        // Probe, explicit refresh, and one TTL-expired refetch.
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(busy_body()))
            .expect(3)
            .mount(&server)
            .await;

        sync.link(&mentor(), token(), now()).await.unwrap();
        sync.refresh(&mentor(), now()).await.unwrap();

        let reused = sync
            .cached_or_refresh(&mentor(), now() + Duration::seconds(30))
            .await
            .unwrap();
        assert!(!reused.stale);
        assert_eq!(reused.synced_at, Some(now()));

        let refetched = sync
            .cached_or_refresh(&mentor(), now() + Duration::seconds(400))
            .await
            .unwrap();
        assert_eq!(refetched.synced_at, Some(now() + Duration::seconds(400)));
    }

    #[tokio::test]
    async fn event_creation_without_a_link_is_a_no_op() {
        let (_server, sync) = setup().await;
        let draft = EventDraft {
            start: now(),
            end: now() + Duration::hours(1),
            title: "Coffee chat".into(),
            notes: None,
        };
        assert_eq!(sync.create_event(&mentor(), &draft).await.unwrap(), None);
    }

    #[tokio::test]
    async fn event_creation_returns_the_hold_id() {
        let (server, sync) = setup().await;
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "intervals": [] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/events"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "eventId": "evt-9" })),
            )
            .mount(&server)
            .await;

        sync.link(&mentor(), token(), now()).await.unwrap();
        let draft = EventDraft {
            start: now() + Duration::days(1),
            end: now() + Duration::days(1) + Duration::hours(1),
            title: "Coffee chat".into(),
            notes: None,
        };
        let event_id = sync.create_event(&mentor(), &draft).await.unwrap();
        assert_eq!(event_id.as_deref(), Some("evt-9"));
    }

    #[tokio::test]
    async fn hold_removal_failure_is_swallowed() {
        let (server, sync) = setup().await;
        Mock::given(method("GET"))
            .and(path("/v1/busy"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "intervals": [] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        sync.link(&mentor(), token(), now()).await.unwrap();
        sync.delete_event(&mentor(), "evt-9").await;
    }

    #[test]
    fn annotate_only_touches_open_slots() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut slots: Vec<Slot> = (0..4)
            .map(|hour| Slot {
                mentor_id: mentor(),
                start: start + Duration::hours(hour),
                status: SlotStatus::Open,
            })
            .collect();
        slots[0].status = SlotStatus::Past;
        slots[3].status = SlotStatus::Reserved;

        // Busy covers the past slot, half of the 10:00 slot, and the
        // reserved slot.
        let busy = vec![
            TimeRange::new(start, start + Duration::minutes(30)),
            TimeRange::new(
                start + Duration::minutes(90),
                start + Duration::minutes(120),
            ),
            TimeRange::new(start + Duration::hours(3), start + Duration::hours(4)),
        ];
        annotate_busy(&mut slots, &busy);

        assert_eq!(
            slots.iter().map(|s| s.status).collect::<Vec<_>>(),
            vec![
                SlotStatus::Past,
                SlotStatus::Busy,
                SlotStatus::Open,
                SlotStatus::Reserved,
            ]
        );
    }
}
