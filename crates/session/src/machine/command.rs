// Platform commands
//
// Everything the UI, the OS location stack and the web layer can ask of the
// state machine. Serialized as one tagged JSON object per command.

use serde::{Deserialize, Serialize};

use crate::geo::LocationFix;
use crate::model::{AppState, LocationPermission};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SessionCommand {
    SetChargerTarget {
        charger_id: String,
        latitude: f64,
        longitude: f64,
    },
    ConfirmExclusiveActivated {
        session_id: String,
        merchant_id: String,
        merchant_latitude: f64,
        merchant_longitude: f64,
    },
    ConfirmVisitVerified {
        session_id: String,
        verification_code: String,
    },
    RequestSessionEnd,
    LocationUpdate {
        fix: LocationFix,
    },
    GeofenceEnter {
        region_id: String,
    },
    GeofenceExit {
        region_id: String,
    },
    Reset,
    PermissionChanged {
        status: LocationPermission,
    },
    AppStateChanged {
        state: AppState,
    },
}

impl SessionCommand {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetChargerTarget { .. } => "set_charger_target",
            Self::ConfirmExclusiveActivated { .. } => "confirm_exclusive_activated",
            Self::ConfirmVisitVerified { .. } => "confirm_visit_verified",
            Self::RequestSessionEnd => "request_session_end",
            Self::LocationUpdate { .. } => "location_update",
            Self::GeofenceEnter { .. } => "geofence_enter",
            Self::GeofenceExit { .. } => "geofence_exit",
            Self::Reset => "reset",
            Self::PermissionChanged { .. } => "permission_changed",
            Self::AppStateChanged { .. } => "app_state_changed",
        }
    }
}
