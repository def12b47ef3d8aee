// Contracts for external collaborators
//
// The state machine talks to the platform only through these traits:
// - In-memory implementations for tests and trace replay
// - Native bridges provide the production implementations

use std::collections::VecDeque;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::geo::LocationFix;
use crate::model::{LocationPermission, SessionEvent, SessionState};

// ============================================================================
// LocationService
// ============================================================================

/// Platform location provider. Fixes are pushed into the state machine
/// separately; this is the pull side.
pub trait LocationService: Send + Sync {
    /// Last fix the platform delivered, regardless of accuracy
    fn last_known(&self) -> Option<LocationFix>;

    /// Last fix if its accuracy is within `max_accuracy_m`
    fn current_location(&self, max_accuracy_m: f64) -> Option<LocationFix> {
        self.last_known()
            .filter(|fix| fix.accuracy_m >= 0.0 && fix.accuracy_m <= max_accuracy_m)
    }

    /// Raise or lower the sampling rate
    fn set_high_accuracy(&self, enabled: bool);
}

/// Location service backed by whatever fix it was last given
#[derive(Debug, Default)]
pub struct StaticLocationService {
    fix: RwLock<Option<LocationFix>>,
    high_accuracy: RwLock<bool>,
}

impl StaticLocationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fix(fix: LocationFix) -> Self {
        Self {
            fix: RwLock::new(Some(fix)),
            high_accuracy: RwLock::new(false),
        }
    }

    pub fn set_fix(&self, fix: LocationFix) {
        *self.fix.write() = Some(fix);
    }

    pub fn is_high_accuracy(&self) -> bool {
        *self.high_accuracy.read()
    }
}

impl LocationService for StaticLocationService {
    fn last_known(&self) -> Option<LocationFix> {
        *self.fix.read()
    }

    fn set_high_accuracy(&self, enabled: bool) {
        *self.high_accuracy.write() = enabled;
    }
}

// ============================================================================
// GeofenceManager
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Charger,
    Merchant,
}

/// A monitored circular region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceRegion {
    pub id: String,
    pub kind: RegionKind,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
}

/// OS geofence registration. Enter/exit callbacks arrive at the state
/// machine as commands.
pub trait GeofenceManager: Send + Sync {
    fn add_charger_geofence(&self, id: &str, latitude: f64, longitude: f64, radius_m: f64);
    fn add_merchant_geofence(&self, id: &str, latitude: f64, longitude: f64, radius_m: f64);
    fn remove_region(&self, id: &str);
    fn clear_all(&self);
    fn monitored_regions(&self) -> Vec<GeofenceRegion>;
}

/// Geofence manager holding at most `capacity` regions (2 by default),
/// evicting the oldest first
#[derive(Debug)]
pub struct InMemoryGeofenceManager {
    regions: Mutex<VecDeque<GeofenceRegion>>,
    capacity: usize,
}

impl Default for InMemoryGeofenceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGeofenceManager {
    pub const DEFAULT_CAPACITY: usize = 2;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            regions: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn add(&self, region: GeofenceRegion) {
        let mut regions = self.regions.lock();
        regions.retain(|r| r.id != region.id);
        while regions.len() >= self.capacity {
            if let Some(evicted) = regions.pop_front() {
                debug!(region = %evicted.id, "evicting oldest geofence");
            }
        }
        regions.push_back(region);
    }
}

impl GeofenceManager for InMemoryGeofenceManager {
    fn add_charger_geofence(&self, id: &str, latitude: f64, longitude: f64, radius_m: f64) {
        self.add(GeofenceRegion {
            id: id.to_string(),
            kind: RegionKind::Charger,
            latitude,
            longitude,
            radius_m,
        });
    }

    fn add_merchant_geofence(&self, id: &str, latitude: f64, longitude: f64, radius_m: f64) {
        self.add(GeofenceRegion {
            id: id.to_string(),
            kind: RegionKind::Merchant,
            latitude,
            longitude,
            radius_m,
        });
    }

    fn remove_region(&self, id: &str) {
        self.regions.lock().retain(|r| r.id != id);
    }

    fn clear_all(&self) {
        self.regions.lock().clear();
    }

    fn monitored_regions(&self) -> Vec<GeofenceRegion> {
        self.regions.lock().iter().cloned().collect()
    }
}

// ============================================================================
// UiNotifier
// ============================================================================

/// Messages pushed to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiNotification {
    StateChanged {
        previous: SessionState,
        state: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<SessionEvent>,
    },
    PermissionStatus {
        status: LocationPermission,
    },
    ActivationRejected {
        reason: String,
    },
    AuthRequired {
        event_id: Uuid,
    },
    EventEmissionFailed {
        event_id: Uuid,
        event: String,
        error: String,
    },
    Ready {
        state: SessionState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticKind {
    Success,
    Warning,
}

pub trait UiNotifier: Send + Sync {
    fn notify(&self, notification: UiNotification);

    fn trigger_haptic(&self, kind: HapticKind) {
        let _ = kind;
    }
}

/// Forwards notifications to a tokio channel
pub struct ChannelUiNotifier {
    tx: mpsc::UnboundedSender<UiNotification>,
}

impl ChannelUiNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UiNotifier for ChannelUiNotifier {
    fn notify(&self, notification: UiNotification) {
        if self.tx.send(notification).is_err() {
            debug!("ui channel closed, dropping notification");
        }
    }
}

// ============================================================================
// TokenProvider
// ============================================================================

/// Source of the bearer token for event delivery
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}
