// Session Configuration
//
// Thresholds for the session state machine and settings for event delivery,
// loaded from environment variables with defaults for anything unset.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::emitter::RetryPolicy;

/// Spatial and timing thresholds for the session state machine
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Radius around the charger that signals approach
    pub charger_intent_radius_m: f64,

    /// Radius around the charger used as the dwell anchor
    pub anchor_radius_m: f64,

    /// Distance from the charger past which an active session counts as departed
    pub charger_departure_radius_m: f64,

    /// Radius around the merchant that counts as arrival
    pub merchant_radius_m: f64,

    /// Continuous dwell required before the user is anchored
    pub dwell_duration: Duration,

    /// Speeds below this are stationary
    pub dwell_speed_threshold_mps: f64,

    /// Rolling window of fixes kept by the dwell detector
    pub dwell_window: Duration,

    /// Time allowed between leaving the charger and reaching the merchant
    pub grace_period: Duration,

    /// Absolute maximum session length
    pub hard_timeout: Duration,

    /// Slack added to radii when sanity-checking a restored state
    pub reconciliation_tolerance_m: f64,

    /// Restored in-transit sessions further than this from the merchant are ended
    pub teleport_threshold_m: f64,

    /// Fixes less accurate than this are ignored during reconciliation
    pub max_location_accuracy_m: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            charger_intent_radius_m: 150.0,
            anchor_radius_m: 30.0,
            charger_departure_radius_m: 100.0,
            merchant_radius_m: 40.0,
            dwell_duration: Duration::from_secs(120),
            dwell_speed_threshold_mps: 1.5,
            dwell_window: Duration::from_secs(300),
            grace_period: Duration::from_secs(15 * 60),
            hard_timeout: Duration::from_secs(60 * 60),
            reconciliation_tolerance_m: 50.0,
            teleport_threshold_m: 50_000.0,
            max_location_accuracy_m: 100.0,
        }
    }
}

impl SessionConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables (all optional):
    /// - `CHARGESIDE_INTENT_RADIUS_M`, `CHARGESIDE_ANCHOR_RADIUS_M`,
    ///   `CHARGESIDE_DEPARTURE_RADIUS_M`, `CHARGESIDE_MERCHANT_RADIUS_M`
    /// - `CHARGESIDE_DWELL_SECS`, `CHARGESIDE_DWELL_SPEED_MPS`
    /// - `CHARGESIDE_GRACE_PERIOD_SECS`, `CHARGESIDE_HARD_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            charger_intent_radius_m: env_or("CHARGESIDE_INTENT_RADIUS_M", defaults.charger_intent_radius_m),
            anchor_radius_m: env_or("CHARGESIDE_ANCHOR_RADIUS_M", defaults.anchor_radius_m),
            charger_departure_radius_m: env_or(
                "CHARGESIDE_DEPARTURE_RADIUS_M",
                defaults.charger_departure_radius_m,
            ),
            merchant_radius_m: env_or("CHARGESIDE_MERCHANT_RADIUS_M", defaults.merchant_radius_m),
            dwell_duration: env_secs("CHARGESIDE_DWELL_SECS", defaults.dwell_duration),
            dwell_speed_threshold_mps: env_or(
                "CHARGESIDE_DWELL_SPEED_MPS",
                defaults.dwell_speed_threshold_mps,
            ),
            grace_period: env_secs("CHARGESIDE_GRACE_PERIOD_SECS", defaults.grace_period),
            hard_timeout: env_secs("CHARGESIDE_HARD_TIMEOUT_SECS", defaults.hard_timeout),
            ..defaults
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_hard_timeout(mut self, hard_timeout: Duration) -> Self {
        self.hard_timeout = hard_timeout;
        self
    }

    pub fn with_dwell_duration(mut self, dwell_duration: Duration) -> Self {
        self.dwell_duration = dwell_duration;
        self
    }
}

/// Settings for delivering session events to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterConfig {
    /// API base URL, without trailing slash
    pub base_url: String,

    /// Value of the `schema_version` body field
    pub schema_version: String,

    /// Value of the `source` body field
    pub source: String,

    pub retry: RetryPolicy,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            schema_version: "1.0".to_string(),
            source: "native".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EmitterConfig {
    /// Create configuration from environment variables
    ///
    /// - `CHARGESIDE_API_URL`: API base URL (default: http://localhost:8000)
    /// - `CHARGESIDE_EVENT_SOURCE`: source tag (default: native)
    /// - `CHARGESIDE_EMIT_MAX_ATTEMPTS`: delivery attempts per event (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = env::var("CHARGESIDE_API_URL").unwrap_or(defaults.base_url);
        let source = env::var("CHARGESIDE_EVENT_SOURCE").unwrap_or(defaults.source);
        let max_attempts = env_or("CHARGESIDE_EMIT_MAX_ATTEMPTS", defaults.retry.max_attempts);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            source,
            retry: defaults.retry.with_max_attempts(max_attempts),
            ..defaults
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
