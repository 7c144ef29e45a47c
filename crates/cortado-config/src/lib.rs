//! Deployment configuration for the cortado scheduling engine.
//!
//! TOML file + environment loading, calendar token resolution
//! (keyring + env + plaintext), and translation into the engine's
//! `SchedulerConfig` / `CalendarClient` pair. Host applications depend
//! on this crate; the engine itself never reads files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cortado_calendar::{CalendarClient, TlsMode, TransportConfig};
use cortado_core::SchedulerConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no calendar token configured for mentor '{mentor}'")]
    NoToken { mentor: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration for one deployment.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Engine knobs: cancellation window, platform fee, task cadence.
    #[serde(default)]
    pub engine: SchedulerConfig,

    /// Calendar service connection.
    #[serde(default)]
    pub calendar: CalendarSettings,
}

impl AppConfig {
    /// Cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.platform_fee_percent > 100 {
            return Err(ConfigError::Validation {
                field: "engine.platform_fee_percent".into(),
                reason: format!(
                    "must be at most 100, got {}",
                    self.engine.platform_fee_percent
                ),
            });
        }
        if self.engine.busy_window_days == 0 {
            return Err(ConfigError::Validation {
                field: "engine.busy_window_days".into(),
                reason: "must be at least one day".into(),
            });
        }
        if let Err(err) = self.calendar.base_url.parse::<url::Url>() {
            return Err(ConfigError::Validation {
                field: "calendar.base_url".into(),
                reason: format!("invalid URL '{}': {err}", self.calendar.base_url),
            });
        }
        Ok(())
    }
}

/// Calendar service connection settings.
#[derive(Debug, Deserialize, Serialize)]
pub struct CalendarSettings {
    /// Base URL of the calendar service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Path to a custom CA certificate for the calendar service.
    pub ca_cert: Option<PathBuf>,

    /// Accept any TLS certificate (local fixtures only).
    #[serde(default)]
    pub insecure: bool,

    /// Environment variable holding a deployment-wide calendar token.
    pub token_env: Option<String>,

    /// Plaintext per-mentor tokens (prefer keyring or env).
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            ca_cert: None,
            insecure: false,
            token_env: None,
            tokens: HashMap::new(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".into()
}
fn default_timeout() -> u64 {
    10
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "cortado", "cortado").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("cortado");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full `AppConfig` from file + environment.
///
/// Precedence, lowest to highest: built-in defaults, the TOML file at
/// [`config_path()`], then `CORTADO_`-prefixed environment variables
/// with `__` as the section separator (e.g.
/// `CORTADO_ENGINE__PLATFORM_FEE_PERCENT=25`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let config: AppConfig = figment_at(&config_path()).extract()?;
    Ok(config)
}

/// Load config, returning the defaults if the file doesn't exist or
/// fails to parse.
pub fn load_config_or_default() -> AppConfig {
    load_config().unwrap_or_default()
}

fn figment_at(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CORTADO_").split("__"))
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical config path.
pub fn save_config(cfg: &AppConfig) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Calendar token resolution ───────────────────────────────────────

/// Resolve a mentor's calendar token from the credential chain.
///
/// Order: the environment variable named by `token_env`, then the system
/// keyring under `cortado / <mentor>/calendar-token`, then a plaintext
/// entry in the config's `tokens` table.
pub fn resolve_calendar_token(
    calendar: &CalendarSettings,
    mentor_id: &str,
) -> Result<SecretString, ConfigError> {
    // 1. Deployment-wide env override
    if let Some(ref env_name) = calendar.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new("cortado", &format!("{mentor_id}/calendar-token")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(token) = calendar.tokens.get(mentor_id) {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken {
        mentor: mentor_id.into(),
    })
}

// ── Engine wiring ───────────────────────────────────────────────────

/// Translate the calendar settings into a transport config.
pub fn transport_config(calendar: &CalendarSettings) -> TransportConfig {
    let tls = if calendar.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = calendar.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    TransportConfig {
        tls,
        timeout: Duration::from_secs(calendar.timeout_secs),
    }
}

/// Build the calendar client for a deployment. Validates first, so a
/// bad URL surfaces as a `Validation` error rather than a client error.
pub fn calendar_client(config: &AppConfig) -> Result<CalendarClient, ConfigError> {
    config.validate()?;
    CalendarClient::new(
        &config.calendar.base_url,
        &transport_config(&config.calendar),
    )
    .map_err(|err| ConfigError::Validation {
        field: "calendar".into(),
        reason: err.to_string(),
    })
}
