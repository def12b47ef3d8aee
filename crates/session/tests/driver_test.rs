// Integration tests for SessionDriver
//
// Runs the state machine on its own task with a file-backed snapshot store,
// then restarts it from the same directory.
//
// Run with: cargo test -p chargeside-session --test driver_test

mod common;

use std::sync::Arc;

use chargeside_session::collaborators::{
    ChannelUiNotifier, InMemoryGeofenceManager, StaticLocationService, UiNotification,
};
use chargeside_session::geo::LocationFix;
use chargeside_session::machine::{SessionDeps, SessionDriver, SessionHandle};
use chargeside_session::{
    FileSnapshotStore, ManualClock, ScriptedTransport, SessionCommand, SessionConfig,
    SessionState, SessionStateMachine, SnapshotStore,
};
use common::*;
use tokio::sync::mpsc;

fn spawn_driver(
    dir: &std::path::Path,
    transport: Arc<ScriptedTransport>,
) -> (SessionHandle, mpsc::UnboundedReceiver<UiNotification>) {
    let (ui, notifications) = ChannelUiNotifier::new();
    let deps = SessionDeps {
        store: Arc::new(FileSnapshotStore::new(dir)),
        transport,
        location: Arc::new(StaticLocationService::new()),
        geofences: Arc::new(InMemoryGeofenceManager::new()),
        ui: Arc::new(ui),
        clock: Arc::new(ManualClock::new(start_time())),
    };
    let (machine, internal) = SessionStateMachine::new(SessionConfig::default(), emitter_config(), deps);
    (SessionDriver::spawn(machine, internal), notifications)
}

fn fix_at(meters: f64, seconds: i64) -> LocationFix {
    let (lat, lng) = near_charger(meters);
    LocationFix::new(lat, lng, start_time() + chrono::Duration::seconds(seconds)).with_speed(0.1)
}

#[tokio::test(start_paused = true)]
async fn test_driver_processes_commands_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new());
    let (handle, mut notifications) = spawn_driver(dir.path(), transport.clone());

    handle
        .send(SessionCommand::SetChargerTarget {
            charger_id: CHARGER_ID.to_string(),
            latitude: CHARGER_LAT,
            longitude: CHARGER_LNG,
        })
        .unwrap();
    for i in 0..10 {
        handle
            .send(SessionCommand::LocationUpdate { fix: fix_at(8.0, i * 15) })
            .unwrap();
    }

    let snapshot = handle.shutdown().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Anchored);
    assert!(snapshot.pending_event.is_none());

    let events: Vec<String> = transport
        .requests()
        .iter()
        .map(|r| r.body["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        events,
        vec!["charger_targeted", "entered_charger_intent_zone", "anchor_dwell_complete"]
    );

    assert_eq!(
        notifications.recv().await,
        Some(UiNotification::Ready {
            state: SessionState::Idle
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_driver_restarts_from_file_snapshot() {
    let dir = tempfile::tempdir().unwrap();

    let (handle, _notifications) = spawn_driver(dir.path(), Arc::new(ScriptedTransport::new()));
    handle
        .send(SessionCommand::SetChargerTarget {
            charger_id: CHARGER_ID.to_string(),
            latitude: CHARGER_LAT,
            longitude: CHARGER_LNG,
        })
        .unwrap();
    handle
        .send(SessionCommand::GeofenceEnter {
            region_id: CHARGER_ID.to_string(),
        })
        .unwrap();
    handle.shutdown().await.unwrap();

    let stored = FileSnapshotStore::new(dir.path()).load().await.unwrap().unwrap();
    assert_eq!(stored.state, SessionState::NearCharger);

    let transport = Arc::new(ScriptedTransport::new());
    let (handle, mut notifications) = spawn_driver(dir.path(), transport.clone());
    let snapshot = handle.shutdown().await.unwrap();

    assert_eq!(snapshot.state, SessionState::NearCharger);
    assert_eq!(snapshot.targeted_charger, Some(charger_target()));
    assert_eq!(
        notifications.recv().await,
        Some(UiNotification::Ready {
            state: SessionState::NearCharger
        })
    );
    let events: Vec<String> = transport
        .requests()
        .iter()
        .map(|r| r.body["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(events, vec!["session_restored"]);
}
