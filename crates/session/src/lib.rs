//! # Chargeside Session
//!
//! On-device driver session engine for EV charging exclusives. Tracks a
//! driver from approaching a charger, through dwelling there and activating
//! a merchant exclusive, to arriving at the merchant or timing out.
//!
//! ## Features
//!
//! - **Explicit state machine**: seven states, a closed set of canonical events
//! - **Dwell detection**: rolling window of fixes, reset on any excursion
//! - **Durable deadlines**: grace period and hard timeout survive process death
//! - **Pending-event ledger**: the latest event is persisted until acknowledged
//!   and replayed with the same id on the next launch
//! - **Restart reconciliation**: deadlines and location are checked before
//!   geofences and timers are rebuilt
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SessionDriver                          │
//! │  (one task: platform commands + timer fires + delivery acks) │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    SessionStateMachine                       │
//! │  (transitions, DwellDetector, DeadlineTimers, geofences)     │
//! └──────────────────────────────────────────────────────────────┘
//!                │                                │
//!                ▼                                ▼
//! ┌───────────────────────────┐    ┌─────────────────────────────┐
//! │       SnapshotStore       │    │        EventEmitter         │
//! │  (state + pending event)  │    │  (FIFO delivery with retry) │
//! └───────────────────────────┘    └─────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use chargeside_session::prelude::*;
//! use std::sync::Arc;
//!
//! let (ui, mut notifications) = ChannelUiNotifier::new();
//! let deps = SessionDeps {
//!     store: Arc::new(InMemorySnapshotStore::new()),
//!     transport: Arc::new(ScriptedTransport::new()),
//!     location: Arc::new(StaticLocationService::new()),
//!     geofences: Arc::new(InMemoryGeofenceManager::new()),
//!     ui: Arc::new(ui),
//!     clock: Arc::new(SystemClock),
//! };
//! let (machine, internal_rx) =
//!     SessionStateMachine::new(SessionConfig::default(), EmitterConfig::default(), deps);
//! let handle = SessionDriver::spawn(machine, internal_rx);
//!
//! handle.send(SessionCommand::SetChargerTarget {
//!     charger_id: "ch-1".into(),
//!     latitude: 37.7749,
//!     longitude: -122.4194,
//! })?;
//! ```

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod dwell;
pub mod emitter;
pub mod error;
pub mod geo;
pub mod machine;
pub mod model;
pub mod persistence;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EmitterConfig, SessionConfig};
pub use emitter::{EventEmitter, HttpEventTransport, RetryPolicy, ScriptedTransport};
pub use error::{ActivationRejection, EmissionError, StoreError};
pub use machine::{SessionCommand, SessionDriver, SessionHandle, SessionStateMachine};
pub use model::{PendingEvent, SessionEvent, SessionState};
pub use persistence::{FileSnapshotStore, InMemorySnapshotStore, SessionSnapshot, SnapshotStore};

/// Prelude for common imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::collaborators::{
        ChannelUiNotifier, GeofenceManager, InMemoryGeofenceManager, LocationService,
        StaticLocationService, StaticTokenProvider, TokenProvider, UiNotification, UiNotifier,
    };
    pub use crate::config::{EmitterConfig, SessionConfig};
    pub use crate::emitter::{EventTransport, HttpEventTransport, RetryPolicy, ScriptedTransport};
    pub use crate::error::{ActivationRejection, EmissionError, StoreError};
    pub use crate::geo::LocationFix;
    pub use crate::machine::{
        SessionCommand, SessionDeps, SessionDriver, SessionHandle, SessionStateMachine,
    };
    pub use crate::model::{
        ActiveSessionInfo, AppState, ChargerTarget, LocationPermission, MerchantTarget,
        PendingEvent, SessionEvent, SessionState,
    };
    pub use crate::persistence::{
        FileSnapshotStore, InMemorySnapshotStore, Persist, SessionSnapshot, SnapshotStore,
    };
}
