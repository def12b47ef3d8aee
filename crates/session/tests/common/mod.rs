// Shared harness for session integration tests
//
// Wires a SessionStateMachine to in-memory collaborators and a manual clock,
// and pumps its internal channel so tests stay deterministic under paused
// tokio time.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chargeside_session::collaborators::{
    ChannelUiNotifier, GeofenceRegion, InMemoryGeofenceManager, StaticLocationService,
    UiNotification,
};
use chargeside_session::emitter::EventRequest;
use chargeside_session::geo::{offset_north, LocationFix};
use chargeside_session::machine::{InternalMessage, SessionDeps, SessionStateMachine};
use chargeside_session::model::{ActiveSessionInfo, ChargerTarget, MerchantTarget, SessionState};
use chargeside_session::{
    EmitterConfig, InMemorySnapshotStore, ManualClock, RetryPolicy, ScriptedTransport,
    SessionConfig, SessionSnapshot,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

pub const CHARGER_ID: &str = "charger-sf-01";
pub const CHARGER_LAT: f64 = 37.7749;
pub const CHARGER_LNG: f64 = -122.4194;
pub const MERCHANT_ID: &str = "merchant-coffee-7";
pub const SESSION_ID: &str = "sess-7f3a";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Merchant 500 m north of the charger
pub fn merchant_coords() -> (f64, f64) {
    offset_north(CHARGER_LAT, CHARGER_LNG, 500.0)
}

/// A point `meters` north of the charger
pub fn near_charger(meters: f64) -> (f64, f64) {
    offset_north(CHARGER_LAT, CHARGER_LNG, meters)
}

pub fn emitter_config() -> EmitterConfig {
    EmitterConfig::default().with_retry(
        RetryPolicy::exponential().with_max_jitter(Duration::from_millis(100)),
    )
}

pub struct Harness {
    pub machine: SessionStateMachine,
    pub internal: mpsc::UnboundedReceiver<InternalMessage>,
    pub store: Arc<InMemorySnapshotStore>,
    pub transport: Arc<ScriptedTransport>,
    pub location: Arc<StaticLocationService>,
    pub geofences: Arc<InMemoryGeofenceManager>,
    pub clock: Arc<ManualClock>,
    pub notifications: mpsc::UnboundedReceiver<UiNotification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            InMemorySnapshotStore::new(),
            ScriptedTransport::new(),
            StaticLocationService::new(),
        )
    }

    pub fn with_transport(transport: ScriptedTransport) -> Self {
        Self::build(InMemorySnapshotStore::new(), transport, StaticLocationService::new())
    }

    pub fn build(
        store: InMemorySnapshotStore,
        transport: ScriptedTransport,
        location: StaticLocationService,
    ) -> Self {
        let store = Arc::new(store);
        let transport = Arc::new(transport);
        let location = Arc::new(location);
        let geofences = Arc::new(InMemoryGeofenceManager::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let (ui, notifications) = ChannelUiNotifier::new();

        let deps = SessionDeps {
            store: store.clone(),
            transport: transport.clone(),
            location: location.clone(),
            geofences: geofences.clone(),
            ui: Arc::new(ui),
            clock: clock.clone(),
        };
        let (machine, internal) =
            SessionStateMachine::new(SessionConfig::default(), emitter_config(), deps);

        Self {
            machine,
            internal,
            store,
            transport,
            location,
            geofences,
            clock,
            notifications,
        }
    }

    /// Handle delivery reports until every queued event has been reported
    pub async fn settle(&mut self) {
        while self.machine.emissions_outstanding() > 0 {
            let message = self.internal.recv().await.expect("internal channel closed");
            self.machine.handle_internal(message).await;
        }
    }

    /// Handle internal messages until a timer fire has been processed
    pub async fn next_timer(&mut self) {
        loop {
            let message = self.internal.recv().await.expect("internal channel closed");
            let is_timer = matches!(message, InternalMessage::TimerFired { .. });
            self.machine.handle_internal(message).await;
            if is_timer {
                return;
            }
        }
    }

    pub fn notifications(&mut self) -> Vec<UiNotification> {
        let mut out = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            out.push(notification);
        }
        out
    }

    pub fn sent_events(&self) -> Vec<String> {
        self.transport
            .requests()
            .iter()
            .map(|r| r.body["event"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn requests(&self) -> Vec<EventRequest> {
        self.transport.requests()
    }

    pub fn regions(&self) -> Vec<GeofenceRegion> {
        use chargeside_session::collaborators::GeofenceManager;
        self.geofences.monitored_regions()
    }

    /// A fix `meters` north of the charger at the clock's current time
    pub fn fix_near_charger(&self, meters: f64, speed_mps: f64) -> LocationFix {
        use chargeside_session::Clock;
        let (lat, lng) = near_charger(meters);
        LocationFix::new(lat, lng, self.clock.now()).with_speed(speed_mps)
    }

    pub async fn target_charger(&mut self) {
        self.machine
            .set_charger_target(CHARGER_ID.to_string(), CHARGER_LAT, CHARGER_LNG)
            .await;
    }

    /// Target, approach and dwell: 10 slow fixes 15 s apart within 10 m
    pub async fn walk_to_anchored(&mut self) {
        self.target_charger().await;
        for _ in 0..10 {
            let fix = self.fix_near_charger(10.0, 0.2);
            self.machine.handle_location_update(fix).await;
            self.clock.advance(chrono::Duration::seconds(15));
        }
        assert_eq!(self.machine.state(), SessionState::Anchored);
    }

    pub async fn walk_to_active(&mut self) {
        self.walk_to_anchored().await;
        let (lat, lng) = merchant_coords();
        self.machine
            .confirm_exclusive_activated(SESSION_ID.to_string(), MERCHANT_ID.to_string(), lat, lng)
            .await
            .expect("activation accepted");
        assert_eq!(self.machine.state(), SessionState::SessionActive);
    }

    /// Active, then 250 m from the charger on the way to the merchant
    pub async fn walk_to_in_transit(&mut self) {
        self.walk_to_active().await;
        let fix = self.fix_near_charger(250.0, 1.4);
        self.machine.handle_location_update(fix).await;
        assert_eq!(self.machine.state(), SessionState::InTransit);
    }

    pub async fn walk_to_merchant(&mut self) {
        self.walk_to_in_transit().await;
        let fix = self.fix_near_charger(495.0, 0.0);
        self.machine.handle_location_update(fix).await;
        assert_eq!(self.machine.state(), SessionState::AtMerchant);
    }
}

pub fn charger_target() -> ChargerTarget {
    ChargerTarget {
        id: CHARGER_ID.to_string(),
        latitude: CHARGER_LAT,
        longitude: CHARGER_LNG,
    }
}

pub fn merchant_target() -> MerchantTarget {
    let (latitude, longitude) = merchant_coords();
    MerchantTarget {
        id: MERCHANT_ID.to_string(),
        latitude,
        longitude,
    }
}

pub fn active_session(started_at: DateTime<Utc>) -> ActiveSessionInfo {
    ActiveSessionInfo {
        session_id: SESSION_ID.to_string(),
        charger_id: CHARGER_ID.to_string(),
        merchant_id: MERCHANT_ID.to_string(),
        started_at,
    }
}

/// Snapshot left behind by a previous process
pub fn snapshot_in(state: SessionState) -> SessionSnapshot {
    let mut snapshot = SessionSnapshot::idle(start_time());
    snapshot.state = state;
    snapshot.targeted_charger = Some(charger_target());
    if state.has_active_session() {
        snapshot.merchant_target = Some(merchant_target());
        snapshot.active_session = Some(active_session(start_time() - chrono::Duration::minutes(10)));
    }
    snapshot
}
