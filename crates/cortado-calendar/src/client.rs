// Hand-crafted async HTTP client for the calendar service (v1).
//
// Base path: /v1/
// Auth: per-mentor bearer token supplied on every call; the engine owns
// the token registry, this client never stores one.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::Error;
use crate::transport::TransportConfig;
use crate::types::{BusyInterval, BusyWindow, CreatedEvent, EventDraft};

// ── Error response shape from the calendar service ───────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the calendar service.
///
/// JSON REST endpoints under `/v1/`; each call authorizes with the
/// bearer token of the mentor whose calendar it touches.
#[derive(Debug, Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CalendarClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from the service base URL and transport config.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Wrap an existing `reqwest::Client` (caller manages transport).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Parse the base URL and guarantee a trailing slash so relative
    /// joins of `v1/…` resolve under it.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative path (e.g. `"v1/busy"`) onto the base URL.
    fn url(&self, path: &str) -> Url {
        // base_url always ends with `/`, so joining `v1/…` works.
        self.base_url
            .join(path)
            .expect("path should be valid relative URL")
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &SecretString,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(path);
        debug!("GET {url} params={params:?}");

        let resp = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .query(params)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        token: &SecretString,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path);
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    async fn delete(&self, path: &str, token: &SecretString) -> Result<(), Error> {
        let url = self.url(path);
        debug!("DELETE {url}");

        let resp = self
            .http
            .delete(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        self.handle_empty(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview = &body[..body.len().min(200)];
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn handle_empty(&self, resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn parse_error(&self, status: StatusCode, resp: reqwest::Response) -> Error {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Error::Unauthorized;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Error::RateLimited { retry_after_secs };
        }

        let raw = resp.text().await.unwrap_or_default();

        if let Ok(err) = serde_json::from_str::<ErrorResponse>(&raw) {
            Error::Api {
                status: status.as_u16(),
                message: err.message.unwrap_or_else(|| status.to_string()),
                code: err.code,
            }
        } else {
            Error::Api {
                status: status.as_u16(),
                message: if raw.is_empty() {
                    status.to_string()
                } else {
                    raw
                },
                code: None,
            }
        }
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    // ── Busy/free ────────────────────────────────────────────────────

    /// Fetch the mentor's busy intervals for `[from, to)`.
    pub async fn fetch_busy_intervals(
        &self,
        token: &SecretString,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<BusyInterval>, Error> {
        let window: BusyWindow = self
            .get_with_params(
                "v1/busy",
                token,
                &[("from", from.to_rfc3339()), ("to", to.to_rfc3339())],
            )
            .await?;
        Ok(window.intervals)
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Place the confirmation event for a booking on the mentor's calendar.
    pub async fn create_event(
        &self,
        token: &SecretString,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, Error> {
        self.post("v1/events", token, draft).await
    }

    /// Remove a previously placed event (booking cancelled).
    pub async fn delete_event(&self, token: &SecretString, event_id: &str) -> Result<(), Error> {
        self.delete(&format!("v1/events/{event_id}"), token).await
    }
}
