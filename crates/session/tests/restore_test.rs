// Integration tests for restart reconciliation
//
// Each test seeds the snapshot store as a previous process would have left
// it, then runs restore() and checks the replay, deadline and location
// corrections.
//
// Run with: cargo test -p chargeside-session --test restore_test

mod common;

use chargeside_session::collaborators::{RegionKind, StaticLocationService, UiNotification};
use chargeside_session::emitter::{PRE_SESSION_EVENTS_PATH, SESSION_EVENTS_PATH};
use chargeside_session::geo::{offset_north, LocationFix};
use chargeside_session::machine::TELEPORT_DIAGNOSTIC;
use chargeside_session::model::PendingEvent;
use chargeside_session::{InMemorySnapshotStore, ScriptedTransport, SessionEvent, SessionState};
use chrono::Duration;
use common::*;

fn location_at(meters_north_of_charger: f64) -> StaticLocationService {
    let (lat, lng) = near_charger(meters_north_of_charger);
    StaticLocationService::with_fix(LocationFix::new(lat, lng, start_time()))
}

#[tokio::test(start_paused = true)]
async fn test_fresh_install_starts_idle() {
    let mut h = Harness::new();
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::Idle);
    assert_eq!(h.machine.emissions_outstanding(), 0);
    assert_eq!(
        h.notifications(),
        vec![UiNotification::Ready {
            state: SessionState::Idle
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_replay_reuses_event_id_and_endpoint() {
    // First process: every delivery fails, then the process dies
    let transport = (0..30).fold(ScriptedTransport::new(), |t, _| t.respond(500));
    let mut first = Harness::with_transport(transport);
    first.walk_to_active().await;
    first.settle().await;

    let original = first.requests().pop().unwrap();
    assert_eq!(original.body["event"], "exclusive_activated");
    let snapshot = first.store.current().unwrap();
    let pending_id = snapshot.pending_event.as_ref().unwrap().event_id;
    drop(first);

    // Second process
    let mut second = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        location_at(5.0),
    );
    second.machine.restore().await;
    second.settle().await;

    let replayed = &second.requests()[0];
    assert_eq!(replayed.idempotency_key, pending_id);
    assert_eq!(replayed.path, original.path);
    assert_eq!(replayed.body["event_id"], original.body["event_id"]);
    assert_eq!(replayed.body["occurred_at"], original.body["occurred_at"]);

    assert_eq!(second.machine.state(), SessionState::SessionActive);
    assert!(second.machine.pending_event().is_none());
    assert_eq!(second.sent_events().last().unwrap(), "session_restored");
}

#[tokio::test(start_paused = true)]
async fn test_passed_grace_deadline_ends_session_immediately() {
    let mut snapshot = snapshot_in(SessionState::InTransit);
    snapshot.grace_period_deadline = Some(start_time() - Duration::seconds(10));
    snapshot.hard_timeout_deadline = Some(start_time() + Duration::minutes(40));

    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        StaticLocationService::new(),
    );
    h.machine.restore().await;

    // Decided during restore, not by a timer
    assert_eq!(h.machine.state(), SessionState::SessionEnded);
    assert_eq!(
        h.machine.pending_event().unwrap().event_name,
        SessionEvent::GracePeriodExpired
    );
    assert!(h.regions().is_empty());

    h.settle().await;
    assert_eq!(h.sent_events(), vec!["grace_period_expired", "session_restored"]);
    assert_eq!(h.requests()[0].path, SESSION_EVENTS_PATH);
}

#[tokio::test(start_paused = true)]
async fn test_earlier_of_two_passed_deadlines_wins() {
    let mut snapshot = snapshot_in(SessionState::InTransit);
    snapshot.grace_period_deadline = Some(start_time() - Duration::seconds(10));
    snapshot.hard_timeout_deadline = Some(start_time() - Duration::minutes(5));

    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        StaticLocationService::new(),
    );
    h.machine.restore().await;

    assert_eq!(
        h.machine.pending_event().unwrap().event_name,
        SessionEvent::HardTimeoutExpired
    );
}

#[tokio::test(start_paused = true)]
async fn test_anchored_far_from_charger_loses_anchor() {
    let mut snapshot = snapshot_in(SessionState::Anchored);
    let replayed = PendingEvent::new(SessionEvent::AnchorDwellComplete, start_time())
        .with_charger_id(Some(CHARGER_ID.to_string()));
    snapshot.pending_event = Some(replayed.clone());

    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        location_at(500.0),
    );
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::NearCharger);
    assert_eq!(
        h.machine.pending_event().unwrap().event_name,
        SessionEvent::AnchorLost
    );
    assert!(h.machine.grace_period_deadline().is_none());
    assert!(h.machine.hard_timeout_deadline().is_none());

    h.settle().await;
    assert_eq!(
        h.sent_events(),
        vec!["anchor_dwell_complete", "anchor_lost", "session_restored"]
    );
    let requests = h.requests();
    assert_eq!(requests[0].idempotency_key, replayed.event_id);
    assert!(requests.iter().all(|r| r.path == PRE_SESSION_EVENTS_PATH));
}

#[tokio::test(start_paused = true)]
async fn test_anchored_within_tolerance_is_kept() {
    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot_in(SessionState::Anchored)),
        ScriptedTransport::new(),
        location_at(70.0),
    );
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::Anchored);
    let regions = h.regions();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].kind, RegionKind::Charger);
}

#[tokio::test(start_paused = true)]
async fn test_inaccurate_location_is_not_trusted() {
    let (lat, lng) = near_charger(500.0);
    let fix = LocationFix::new(lat, lng, start_time()).with_accuracy(400.0);
    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot_in(SessionState::Anchored)),
        ScriptedTransport::new(),
        StaticLocationService::with_fix(fix),
    );
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::Anchored);
}

#[tokio::test(start_paused = true)]
async fn test_session_active_far_from_charger_departs() {
    let mut snapshot = snapshot_in(SessionState::SessionActive);
    snapshot.hard_timeout_deadline = Some(start_time() + Duration::minutes(50));

    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        location_at(300.0),
    );
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::InTransit);
    assert_eq!(
        h.machine.grace_period_deadline(),
        Some(start_time() + Duration::minutes(15))
    );
    assert_eq!(
        h.machine.hard_timeout_deadline(),
        Some(start_time() + Duration::minutes(50))
    );
    assert_eq!(h.regions()[0].kind, RegionKind::Merchant);
}

#[tokio::test(start_paused = true)]
async fn test_near_charger_far_away_returns_to_idle() {
    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot_in(SessionState::NearCharger)),
        ScriptedTransport::new(),
        location_at(1_000.0),
    );
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_at_merchant_is_never_corrected() {
    let mut snapshot = snapshot_in(SessionState::AtMerchant);
    snapshot.hard_timeout_deadline = Some(start_time() + Duration::minutes(30));

    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        location_at(100_000.0),
    );
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::AtMerchant);
}

#[tokio::test(start_paused = true)]
async fn test_in_transit_teleport_ends_session() {
    let mut snapshot = snapshot_in(SessionState::InTransit);
    snapshot.grace_period_deadline = Some(start_time() + Duration::minutes(10));
    snapshot.hard_timeout_deadline = Some(start_time() + Duration::minutes(40));

    let (lat, lng) = offset_north(CHARGER_LAT, CHARGER_LNG, 60_000.0);
    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        StaticLocationService::with_fix(LocationFix::new(lat, lng, start_time())),
    );
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::SessionEnded);
    assert_eq!(
        h.machine.pending_event().unwrap().event_name,
        SessionEvent::GracePeriodExpired
    );

    h.settle().await;
    assert_eq!(
        h.sent_events(),
        vec![TELEPORT_DIAGNOSTIC, "grace_period_expired", "session_restored"]
    );
    assert_eq!(h.requests()[0].body["session_id"], SESSION_ID);
}

#[tokio::test(start_paused = true)]
async fn test_in_transit_without_grace_deadline_restarts_it() {
    let mut snapshot = snapshot_in(SessionState::InTransit);
    snapshot.hard_timeout_deadline = Some(start_time() + Duration::minutes(40));

    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        location_at(250.0),
    );
    h.machine.restore().await;

    let expected = start_time() + Duration::minutes(15);
    assert_eq!(h.machine.state(), SessionState::InTransit);
    assert_eq!(h.machine.grace_period_deadline(), Some(expected));
    assert_eq!(
        h.store.current().unwrap().grace_period_deadline,
        Some(expected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_restored_timers_fire_from_persisted_deadline() {
    let mut snapshot = snapshot_in(SessionState::InTransit);
    snapshot.grace_period_deadline = Some(start_time() + Duration::minutes(3));
    snapshot.hard_timeout_deadline = Some(start_time() + Duration::minutes(40));

    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot),
        ScriptedTransport::new(),
        location_at(250.0),
    );
    h.machine.restore().await;
    assert_eq!(h.machine.state(), SessionState::InTransit);

    h.next_timer().await;

    assert_eq!(h.machine.state(), SessionState::SessionEnded);
    assert_eq!(
        h.machine.pending_event().unwrap().event_name,
        SessionEvent::GracePeriodExpired
    );
}

#[tokio::test(start_paused = true)]
async fn test_ended_session_is_restored_as_is() {
    let mut h = Harness::build(
        InMemorySnapshotStore::with_snapshot(snapshot_in(SessionState::SessionEnded)),
        ScriptedTransport::new(),
        location_at(10_000.0),
    );
    h.machine.restore().await;

    assert_eq!(h.machine.state(), SessionState::SessionEnded);
    assert!(h.regions().is_empty());
    assert!(h.notifications().contains(&UiNotification::Ready {
        state: SessionState::SessionEnded
    }));
}
