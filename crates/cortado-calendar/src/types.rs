//! Wire types for the calendar service's `/v1/` endpoints.
//!
//! Field names use camelCase via `#[serde(rename_all = "camelCase")]`.
//! Instants are RFC 3339 strings on the wire, `DateTime<Utc>` here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Busy/free ────────────────────────────────────────────────────────

/// One busy interval on the mentor's external calendar, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Busy intervals for a requested window — from `GET /v1/busy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyWindow {
    pub intervals: Vec<BusyInterval>,
}

// ── Events ───────────────────────────────────────────────────────────

/// Event to place on the mentor's calendar — body of `POST /v1/events`.
///
/// `notes` carries the requester's booking message when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Created event acknowledgment — from `POST /v1/events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub event_id: String,
}
