//! Session domain types
//!
//! States, canonical business events, targets and the pending-event ledger
//! entry. Everything here is serialized into the persisted snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the driver is in their journey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    NearCharger,
    Anchored,
    SessionActive,
    InTransit,
    AtMerchant,
    SessionEnded,
}

impl SessionState {
    /// States that hold an activated exclusive and run the hard timeout
    pub fn has_active_session(&self) -> bool {
        matches!(self, Self::SessionActive | Self::InTransit | Self::AtMerchant)
    }

    /// States in which the user can still ask to end
    pub fn can_request_end(&self) -> bool {
        !matches!(self, Self::Idle | Self::SessionEnded)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionEnded)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::NearCharger => "near_charger",
            Self::Anchored => "anchored",
            Self::SessionActive => "session_active",
            Self::InTransit => "in_transit",
            Self::AtMerchant => "at_merchant",
            Self::SessionEnded => "session_ended",
        };
        write!(f, "{}", name)
    }
}

/// Canonical business events reported to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    ChargerTargeted,
    EnteredChargerIntentZone,
    ExitedChargerIntentZone,
    AnchorDwellComplete,
    AnchorLost,
    ActivationRejected,
    ExclusiveActivated,
    DepartedCharger,
    EnteredMerchantZone,
    VisitVerified,
    GracePeriodExpired,
    HardTimeoutExpired,
    WebRequestedEnd,
    SessionRestored,
}

impl SessionEvent {
    /// Whether the event goes to the session-scoped endpoint.
    ///
    /// This is the only input to endpoint routing.
    pub const fn requires_session_id(&self) -> bool {
        match self {
            Self::ExclusiveActivated
            | Self::DepartedCharger
            | Self::EnteredMerchantZone
            | Self::VisitVerified
            | Self::GracePeriodExpired
            | Self::HardTimeoutExpired
            | Self::WebRequestedEnd => true,
            Self::ChargerTargeted
            | Self::EnteredChargerIntentZone
            | Self::ExitedChargerIntentZone
            | Self::AnchorDwellComplete
            | Self::AnchorLost
            | Self::ActivationRejected
            | Self::SessionRestored => false,
        }
    }

    /// Wire name used in the `event` body field
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChargerTargeted => "charger_targeted",
            Self::EnteredChargerIntentZone => "entered_charger_intent_zone",
            Self::ExitedChargerIntentZone => "exited_charger_intent_zone",
            Self::AnchorDwellComplete => "anchor_dwell_complete",
            Self::AnchorLost => "anchor_lost",
            Self::ActivationRejected => "activation_rejected",
            Self::ExclusiveActivated => "exclusive_activated",
            Self::DepartedCharger => "departed_charger",
            Self::EnteredMerchantZone => "entered_merchant_zone",
            Self::VisitVerified => "visit_verified",
            Self::GracePeriodExpired => "grace_period_expired",
            Self::HardTimeoutExpired => "hard_timeout_expired",
            Self::WebRequestedEnd => "web_requested_end",
            Self::SessionRestored => "session_restored",
        }
    }
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The charger the driver is heading to. Replaced wholesale on re-target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargerTarget {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// The merchant attached to an activated exclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantTarget {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Exists from activation until the post-session reset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSessionInfo {
    pub session_id: String,
    pub charger_id: String,
    pub merchant_id: String,
    pub started_at: DateTime<Utc>,
}

/// The last transition's event, kept until the server acknowledges it.
///
/// `event_id` is the idempotency key and never changes across retries or
/// restart replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub event_id: Uuid,
    pub event_name: SessionEvent,
    pub requires_session_id: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub charger_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PendingEvent {
    pub fn new(event: SessionEvent, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_name: event,
            requires_session_id: event.requires_session_id(),
            session_id: None,
            charger_id: None,
            occurred_at,
            metadata: HashMap::new(),
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_charger_id(mut self, charger_id: Option<String>) -> Self {
        self.charger_id = charger_id;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Whether the host app is on screen; reported in session-scoped events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Foreground,
    #[default]
    Background,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }
}

/// Location permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPermission {
    NotDetermined,
    Denied,
    WhenInUse,
    Always,
}
