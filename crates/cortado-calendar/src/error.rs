use thiserror::Error;

/// Top-level error type for the `cortado-calendar` crate.
///
/// Covers transport failures, authorization rejections, and structured
/// service errors. `cortado-core` decides how each surfaces: transient
/// failures degrade to the stale busy-interval cache, auth failures are
/// reported against the mentor's calendar linkage.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Authorization ───────────────────────────────────────────────
    /// The calendar token was rejected (revoked or expired linkage).
    #[error("Calendar token rejected")]
    Unauthorized,

    // ── Service ─────────────────────────────────────────────────────
    /// Rate limited by the calendar service. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Structured error from the calendar service.
    #[error("Calendar service error (HTTP {status}): {message}")]
    Api {
        message: String,
        code: Option<String>,
        status: u16,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient failure worth retrying,
    /// or worth bridging with cached busy intervals.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the mentor's calendar linkage needs re-consent.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Returns `true` if the target resource does not exist
    /// (e.g. deleting an event the mentor already removed by hand).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}
