// ── Scheduler configuration ──

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a freshly reserved booking gets confirmed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Confirm once the calendar hold is created on the mentor's external
    /// calendar. Mentors without a linked calendar confirm immediately.
    #[default]
    Calendar,
    /// Confirm as part of the reservation itself, no calendar hold.
    Immediate,
}

/// Tunable behavior of the [`Scheduler`](crate::Scheduler).
///
/// All fields have working defaults; deployments override them through
/// the configuration file layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Lead time under which a cancellation forfeits the payment.
    pub cancellation_window_hours: u32,
    /// Platform share of each completed booking, in percent.
    pub platform_fee_percent: u8,
    /// How far ahead busy intervals are fetched from linked calendars.
    pub busy_window_days: u32,
    pub confirmation: ConfirmationPolicy,
    /// Time allowed for the synchronous confirmation attempt during a
    /// reservation; on expiry the booking stays pending and the retry
    /// task takes over.
    pub confirmation_timeout_secs: u64,
    /// Cadence of the background pass that re-drives pending bookings.
    pub confirmation_retry_secs: u64,
    /// Cadence of the background pass that completes elapsed bookings.
    pub completion_sweep_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cancellation_window_hours: 24,
            platform_fee_percent: 20,
            busy_window_days: 60,
            confirmation: ConfirmationPolicy::default(),
            confirmation_timeout_secs: 30,
            confirmation_retry_secs: 60,
            completion_sweep_secs: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn cancellation_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cancellation_window_hours))
    }

    pub fn busy_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.busy_window_days))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn confirmation_retry_interval(&self) -> Duration {
        Duration::from_secs(self.confirmation_retry_secs)
    }

    pub fn completion_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.completion_sweep_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_the_published_policy() {
        let config = SchedulerConfig::default();
        assert_eq!(config.cancellation_window_hours, 24);
        assert_eq!(config.platform_fee_percent, 20);
        assert_eq!(config.busy_window_days, 60);
        assert_eq!(config.confirmation, ConfirmationPolicy::Calendar);
        assert_eq!(config.confirmation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn confirmation_policy_round_trips_as_snake_case() {
        assert_eq!(ConfirmationPolicy::Calendar.to_string(), "calendar");
        assert_eq!(
            "immediate".parse::<ConfirmationPolicy>().unwrap(),
            ConfirmationPolicy::Immediate
        );
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"platform_fee_percent": 15}"#).unwrap();
        assert_eq!(config.platform_fee_percent, 15);
        assert_eq!(config.cancellation_window_hours, 24);
    }
}
