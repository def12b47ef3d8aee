//! Restart reconciliation
//!
//! After process death the machine is rebuilt from the persisted snapshot in
//! a fixed order:
//!
//! 1. Restore state, targets, session and deadlines verbatim
//! 2. Replay the pending event with its original id
//! 3. End the session if a deadline passed while the process was dead
//! 4. Sanity-check the restored state against the current location
//! 5. Rebuild geofences and re-arm timers
//! 6. Report `SessionRestored` and tell the UI it is ready

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use super::{to_chrono, SessionStateMachine};
use crate::collaborators::UiNotification;
use crate::emitter::OutboundEvent;
use crate::model::{SessionEvent, SessionState};
use crate::persistence::{Persist, SessionSnapshot};
use crate::timer::has_expired;

/// Diagnostic sent when a restored in-transit session is implausibly far away
pub const TELEPORT_DIAGNOSTIC: &str = "session_teleport_detected";

impl SessionStateMachine {
    /// Load the snapshot and bring the machine back to a consistent state.
    ///
    /// A missing or unreadable snapshot starts fresh in `Idle`.
    #[instrument(skip(self))]
    pub async fn restore(&mut self) {
        let snapshot = match self.store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("no session snapshot, starting fresh");
                return self.finish_fresh_start();
            }
            Err(e) => {
                error!(error = %e, "failed to load session snapshot, starting fresh");
                return self.finish_fresh_start();
            }
        };

        self.apply_snapshot(snapshot);
        info!(
            state = %self.state,
            pending = self.pending_event.is_some(),
            "restoring session"
        );

        if let Some(pending) = self.pending_event.clone() {
            info!(event_id = %pending.event_id, event = %pending.event_name, "replaying pending event");
            self.enqueue(&pending);
        }

        let now = self.clock.now();
        if !self.end_if_deadline_passed(now).await && !self.state.is_terminal() {
            self.reconcile_location(now).await;
        }

        self.rebuild_geofences_from_state();
        self.sync_timers();

        // Informational; sent once so it never displaces a replayed event
        let restored = self.build_event(
            SessionEvent::SessionRestored,
            HashMap::from([("restored_state".to_string(), self.state.to_string())]),
        );
        if self.emitter.enqueue_untracked(OutboundEvent::from(&restored)) {
            self.emissions_outstanding += 1;
        }

        self.ui.notify(UiNotification::Ready { state: self.state });
    }

    fn finish_fresh_start(&mut self) {
        self.rebuild_geofences_from_state();
        self.ui.notify(UiNotification::Ready { state: self.state });
    }

    fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.state = snapshot.state;
        self.charger = snapshot.targeted_charger;
        self.merchant = snapshot.merchant_target;
        self.active_session = snapshot.active_session;
        self.grace_deadline = snapshot.grace_period_deadline;
        self.hard_deadline = snapshot.hard_timeout_deadline;
        self.pending_event = snapshot.pending_event;
        self.dwell.reset();
    }

    /// End the session for a deadline that passed while the process was
    /// dead. When both passed, the earlier one is reported.
    ///
    /// Returns whether the session was ended.
    async fn end_if_deadline_passed(&mut self, now: DateTime<Utc>) -> bool {
        let grace = (self.state == SessionState::InTransit)
            .then_some(self.grace_deadline)
            .flatten()
            .filter(|deadline| has_expired(*deadline, now));
        let hard = self
            .state
            .has_active_session()
            .then_some(self.hard_deadline)
            .flatten()
            .filter(|deadline| has_expired(*deadline, now));

        let (event, deadline) = match (grace, hard) {
            (Some(g), Some(h)) if h < g => (SessionEvent::HardTimeoutExpired, h),
            (Some(g), _) => (SessionEvent::GracePeriodExpired, g),
            (None, Some(h)) => (SessionEvent::HardTimeoutExpired, h),
            (None, None) => return false,
        };

        info!(%event, %deadline, "deadline passed while stopped");
        let metadata = HashMap::from([
            ("deadline".to_string(), deadline.to_rfc3339()),
            ("detected_on".to_string(), "restore".to_string()),
        ]);
        self.transition(SessionState::SessionEnded, event, metadata).await;
        true
    }

    /// Compare the restored state with where the device actually is
    async fn reconcile_location(&mut self, now: DateTime<Utc>) {
        if self.state == SessionState::InTransit && self.grace_deadline.is_none() {
            warn!("in transit without a grace deadline, restarting grace period");
            self.grace_deadline = Some(now + to_chrono(self.config.grace_period));
            self.persist(Persist::Keep).await;
        }

        let Some(fix) = self
            .location
            .current_location(self.config.max_location_accuracy_m)
        else {
            info!("no usable location, keeping restored state");
            return;
        };

        let tolerance = self.config.reconciliation_tolerance_m;
        let charger_distance = self.charger_distance(&fix);
        let reason = HashMap::from([("reason".to_string(), "restore_reconciliation".to_string())]);

        match self.state {
            SessionState::NearCharger => {
                if charger_distance.is_some_and(|d| d > self.config.charger_intent_radius_m + tolerance) {
                    self.transition(SessionState::Idle, SessionEvent::ExitedChargerIntentZone, reason)
                        .await;
                }
            }
            SessionState::Anchored => {
                if charger_distance.is_some_and(|d| d > self.config.anchor_radius_m + tolerance) {
                    self.transition(SessionState::NearCharger, SessionEvent::AnchorLost, reason)
                        .await;
                }
            }
            SessionState::SessionActive => {
                if charger_distance.is_some_and(|d| d > self.config.charger_departure_radius_m + tolerance) {
                    self.transition(SessionState::InTransit, SessionEvent::DepartedCharger, reason)
                        .await;
                }
            }
            SessionState::InTransit => {
                let Some(merchant) = self.merchant.clone() else { return };
                let distance = fix.distance_to(merchant.latitude, merchant.longitude);
                if distance > self.config.teleport_threshold_m {
                    warn!(distance_m = distance, "restored session is implausibly far from merchant");
                    let metadata = HashMap::from([("distance_m".to_string(), format!("{:.0}", distance))]);
                    let diagnostic = OutboundEvent::diagnostic(
                        TELEPORT_DIAGNOSTIC,
                        self.active_session.as_ref().map(|a| a.session_id.clone()),
                        metadata.clone(),
                        now,
                    );
                    if self.emitter.enqueue_untracked(diagnostic) {
                        self.emissions_outstanding += 1;
                    }
                    self.transition(SessionState::SessionEnded, SessionEvent::GracePeriodExpired, metadata)
                        .await;
                }
            }
            SessionState::Idle | SessionState::AtMerchant | SessionState::SessionEnded => {}
        }
    }
}
