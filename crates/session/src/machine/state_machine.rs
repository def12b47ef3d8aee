//! The session state machine
//!
//! Every public operation here runs on the single control path. A state
//! change follows one fixed order: update state and deadlines, persist the
//! snapshot with the new pending event, queue the event for delivery, notify
//! the UI, then apply side effects (timers, geofences, dwell, location
//! accuracy, haptics).

mod reconcile;

pub use reconcile::TELEPORT_DIAGNOSTIC;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::command::SessionCommand;
use crate::clock::Clock;
use crate::collaborators::{GeofenceManager, HapticKind, LocationService, UiNotification, UiNotifier};
use crate::config::{EmitterConfig, SessionConfig};
use crate::dwell::DwellDetector;
use crate::emitter::{EmissionReport, EventEmitter, EventTransport, ReportSink};
use crate::error::{ActivationRejection, EmissionError};
use crate::geo::LocationFix;
use crate::model::{
    ActiveSessionInfo, AppState, ChargerTarget, LocationPermission, MerchantTarget, PendingEvent,
    SessionEvent, SessionState,
};
use crate::persistence::{Persist, SessionSnapshot, SnapshotStore};
use crate::timer::DeadlineTimer;

/// Platform collaborators the state machine drives
pub struct SessionDeps {
    pub store: Arc<dyn SnapshotStore>,
    pub transport: Arc<dyn EventTransport>,
    pub location: Arc<dyn LocationService>,
    pub geofences: Arc<dyn GeofenceManager>,
    pub ui: Arc<dyn UiNotifier>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    GracePeriod,
    HardTimeout,
}

/// Messages the state machine sends itself from background tasks
#[derive(Debug)]
pub enum InternalMessage {
    TimerFired {
        kind: TimerKind,
        deadline: DateTime<Utc>,
    },
    Emission(EmissionReport),
}

pub struct SessionStateMachine {
    config: SessionConfig,

    state: SessionState,
    charger: Option<ChargerTarget>,
    merchant: Option<MerchantTarget>,
    active_session: Option<ActiveSessionInfo>,
    grace_deadline: Option<DateTime<Utc>>,
    hard_deadline: Option<DateTime<Utc>>,
    pending_event: Option<PendingEvent>,

    dwell: DwellDetector,
    grace_timer: Option<DeadlineTimer>,
    hard_timer: Option<DeadlineTimer>,

    /// Queued deliveries whose report has not been handled yet
    emissions_outstanding: usize,

    store: Arc<dyn SnapshotStore>,
    location: Arc<dyn LocationService>,
    geofences: Arc<dyn GeofenceManager>,
    ui: Arc<dyn UiNotifier>,
    clock: Arc<dyn Clock>,
    emitter: EventEmitter,
    internal_tx: mpsc::UnboundedSender<InternalMessage>,
}

impl SessionStateMachine {
    /// Build an idle machine and start its delivery task.
    ///
    /// The returned receiver carries timer and delivery messages; feed each
    /// one back through [`handle_internal`](Self::handle_internal) on the
    /// same control path as commands. Call [`restore`](Self::restore) before
    /// anything else.
    pub fn new(
        config: SessionConfig,
        emitter_config: EmitterConfig,
        deps: SessionDeps,
    ) -> (Self, mpsc::UnboundedReceiver<InternalMessage>) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let report_tx = internal_tx.clone();
        let sink: ReportSink = Arc::new(move |report| {
            if report_tx.send(InternalMessage::Emission(report)).is_err() {
                debug!("state machine gone, dropping delivery report");
            }
        });
        let emitter = EventEmitter::spawn(emitter_config, deps.transport, sink);

        let machine = Self {
            dwell: DwellDetector::from_config(&config),
            config,
            state: SessionState::Idle,
            charger: None,
            merchant: None,
            active_session: None,
            grace_deadline: None,
            hard_deadline: None,
            pending_event: None,
            grace_timer: None,
            hard_timer: None,
            emissions_outstanding: 0,
            store: deps.store,
            location: deps.location,
            geofences: deps.geofences,
            ui: deps.ui,
            clock: deps.clock,
            emitter,
            internal_tx,
        };
        (machine, internal_rx)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn targeted_charger(&self) -> Option<&ChargerTarget> {
        self.charger.as_ref()
    }

    pub fn merchant_target(&self) -> Option<&MerchantTarget> {
        self.merchant.as_ref()
    }

    pub fn active_session(&self) -> Option<&ActiveSessionInfo> {
        self.active_session.as_ref()
    }

    pub fn pending_event(&self) -> Option<&PendingEvent> {
        self.pending_event.as_ref()
    }

    pub fn grace_period_deadline(&self) -> Option<DateTime<Utc>> {
        self.grace_deadline
    }

    pub fn hard_timeout_deadline(&self) -> Option<DateTime<Utc>> {
        self.hard_deadline
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Deliveries queued but not yet reported back
    pub fn emissions_outstanding(&self) -> usize {
        self.emissions_outstanding
    }

    /// The snapshot as it would be written right now
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            targeted_charger: self.charger.clone(),
            merchant_target: self.merchant.clone(),
            active_session: self.active_session.clone(),
            grace_period_deadline: self.grace_deadline,
            hard_timeout_deadline: self.hard_deadline,
            pending_event: self.pending_event.clone(),
            saved_at: self.clock.now(),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Route one platform command to its operation
    pub async fn handle_command(&mut self, command: SessionCommand) {
        debug!(command = command.name(), state = %self.state, "handling command");
        match command {
            SessionCommand::SetChargerTarget {
                charger_id,
                latitude,
                longitude,
            } => self.set_charger_target(charger_id, latitude, longitude).await,
            SessionCommand::ConfirmExclusiveActivated {
                session_id,
                merchant_id,
                merchant_latitude,
                merchant_longitude,
            } => {
                if let Err(rejection) = self
                    .confirm_exclusive_activated(session_id, merchant_id, merchant_latitude, merchant_longitude)
                    .await
                {
                    debug!(reason = rejection.code(), "activation command rejected");
                }
            }
            SessionCommand::ConfirmVisitVerified {
                session_id,
                verification_code,
            } => self.confirm_visit_verified(&session_id, verification_code).await,
            SessionCommand::RequestSessionEnd => self.request_session_end().await,
            SessionCommand::LocationUpdate { fix } => self.handle_location_update(fix).await,
            SessionCommand::GeofenceEnter { region_id } => self.handle_geofence_enter(&region_id).await,
            SessionCommand::GeofenceExit { region_id } => self.handle_geofence_exit(&region_id).await,
            SessionCommand::Reset => self.reset().await,
            SessionCommand::PermissionChanged { status } => self.handle_permission_change(status),
            SessionCommand::AppStateChanged { state } => self.set_app_state(state),
        }
    }

    /// Select the charger to approach. Ignored while a session is active.
    ///
    /// Switching to a different charger while near or anchored at the old
    /// one drops back to `Idle`: proximity and dwell belong to the old target.
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn set_charger_target(&mut self, charger_id: String, latitude: f64, longitude: f64) {
        if self.state.has_active_session() {
            warn!(charger_id, "ignoring charger target during an active session");
            return;
        }

        let switched = self
            .charger
            .as_ref()
            .is_some_and(|current| current.id != charger_id);

        info!(charger_id, switched, "charger targeted");
        self.charger = Some(ChargerTarget {
            id: charger_id,
            latitude,
            longitude,
        });
        self.dwell.reset();

        if switched && matches!(self.state, SessionState::NearCharger | SessionState::Anchored) {
            self.transition(SessionState::Idle, SessionEvent::ChargerTargeted, HashMap::new())
                .await;
            return;
        }
        self.record(SessionEvent::ChargerTargeted, HashMap::new()).await;
        self.rebuild_geofences_from_state();
    }

    /// The backend activated an exclusive for this driver.
    ///
    /// Preconditions are checked in a fixed order: anchored, then a charger
    /// target, then a usable merchant location. A failed check leaves the
    /// state unchanged and records an `ActivationRejected` event.
    #[instrument(skip(self, merchant_latitude, merchant_longitude), fields(state = %self.state))]
    pub async fn confirm_exclusive_activated(
        &mut self,
        session_id: String,
        merchant_id: String,
        merchant_latitude: f64,
        merchant_longitude: f64,
    ) -> Result<(), ActivationRejection> {
        if self.state != SessionState::Anchored {
            return Err(self.reject_activation(ActivationRejection::NotAnchored).await);
        }
        let Some(charger_id) = self.charger.as_ref().map(|c| c.id.clone()) else {
            return Err(self.reject_activation(ActivationRejection::NoChargerTarget).await);
        };
        if merchant_latitude == 0.0 && merchant_longitude == 0.0 {
            return Err(self
                .reject_activation(ActivationRejection::InvalidMerchantLocation)
                .await);
        }

        let now = self.clock.now();
        self.merchant = Some(MerchantTarget {
            id: merchant_id.clone(),
            latitude: merchant_latitude,
            longitude: merchant_longitude,
        });
        self.active_session = Some(ActiveSessionInfo {
            session_id,
            charger_id,
            merchant_id: merchant_id.clone(),
            started_at: now,
        });

        let metadata = HashMap::from([("merchant_id".to_string(), merchant_id)]);
        self.transition(SessionState::SessionActive, SessionEvent::ExclusiveActivated, metadata)
            .await;
        Ok(())
    }

    async fn reject_activation(&mut self, reason: ActivationRejection) -> ActivationRejection {
        warn!(reason = reason.code(), "exclusive activation rejected");
        let metadata = HashMap::from([("reason".to_string(), reason.code().to_string())]);
        self.record(SessionEvent::ActivationRejected, metadata).await;
        self.ui.notify(UiNotification::ActivationRejected {
            reason: reason.code().to_string(),
        });
        self.ui.trigger_haptic(HapticKind::Warning);
        reason
    }

    /// The merchant confirmed the visit
    #[instrument(skip(self, verification_code), fields(state = %self.state))]
    pub async fn confirm_visit_verified(&mut self, session_id: &str, verification_code: String) {
        if self.state != SessionState::AtMerchant {
            debug!("visit verification outside merchant zone ignored");
            return;
        }
        let matches = self
            .active_session
            .as_ref()
            .is_some_and(|active| active.session_id == session_id);
        if !matches {
            warn!("visit verification for a different session ignored");
            return;
        }

        let metadata = HashMap::from([("verification_code".to_string(), verification_code)]);
        self.transition(SessionState::SessionEnded, SessionEvent::VisitVerified, metadata)
            .await;
    }

    /// The user ended the session from the web UI
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn request_session_end(&mut self) {
        if !self.state.can_request_end() {
            debug!("nothing to end");
            return;
        }
        let metadata = HashMap::from([("from_state".to_string(), self.state.to_string())]);
        self.transition(SessionState::SessionEnded, SessionEvent::WebRequestedEnd, metadata)
            .await;
    }

    /// Feed a location fix from the platform
    pub async fn handle_location_update(&mut self, fix: LocationFix) {
        let charger_distance = self.charger_distance(&fix);
        match self.state {
            SessionState::Idle => {
                let Some(distance) = charger_distance else { return };
                if distance <= self.config.charger_intent_radius_m {
                    self.transition(
                        SessionState::NearCharger,
                        SessionEvent::EnteredChargerIntentZone,
                        distance_metadata("location", charger_distance),
                    )
                    .await;
                    self.dwell.update(&fix, distance);
                }
            }
            SessionState::NearCharger => {
                let Some(distance) = charger_distance else { return };
                if distance > self.config.charger_intent_radius_m {
                    self.transition(
                        SessionState::Idle,
                        SessionEvent::ExitedChargerIntentZone,
                        distance_metadata("location", charger_distance),
                    )
                    .await;
                } else if self.dwell.update(&fix, distance) {
                    let mut metadata = distance_metadata("location", charger_distance);
                    metadata.insert(
                        "dwell_seconds".to_string(),
                        self.dwell.elapsed().as_secs().to_string(),
                    );
                    self.transition(SessionState::Anchored, SessionEvent::AnchorDwellComplete, metadata)
                        .await;
                }
            }
            SessionState::Anchored => {
                let Some(distance) = charger_distance else { return };
                if distance > self.config.anchor_radius_m {
                    self.transition(
                        SessionState::NearCharger,
                        SessionEvent::AnchorLost,
                        distance_metadata("location", charger_distance),
                    )
                    .await;
                } else {
                    self.dwell.update(&fix, distance);
                }
            }
            SessionState::SessionActive => {
                if charger_distance.is_some_and(|d| d > self.config.charger_departure_radius_m) {
                    self.transition(
                        SessionState::InTransit,
                        SessionEvent::DepartedCharger,
                        distance_metadata("location", charger_distance),
                    )
                    .await;
                }
            }
            SessionState::InTransit => {
                let merchant_distance = self
                    .merchant
                    .as_ref()
                    .map(|m| fix.distance_to(m.latitude, m.longitude));
                if merchant_distance.is_some_and(|d| d <= self.config.merchant_radius_m) {
                    self.transition(
                        SessionState::AtMerchant,
                        SessionEvent::EnteredMerchantZone,
                        distance_metadata("location", merchant_distance),
                    )
                    .await;
                }
            }
            SessionState::AtMerchant | SessionState::SessionEnded => {}
        }
    }

    /// OS geofence entry callback
    pub async fn handle_geofence_enter(&mut self, region_id: &str) {
        let is_charger = self.charger.as_ref().is_some_and(|c| c.id == region_id);
        let is_merchant = self.merchant.as_ref().is_some_and(|m| m.id == region_id);

        match self.state {
            SessionState::Idle if is_charger => {
                self.transition(
                    SessionState::NearCharger,
                    SessionEvent::EnteredChargerIntentZone,
                    distance_metadata("geofence", None),
                )
                .await;
            }
            SessionState::InTransit if is_merchant => {
                self.transition(
                    SessionState::AtMerchant,
                    SessionEvent::EnteredMerchantZone,
                    distance_metadata("geofence", None),
                )
                .await;
            }
            _ => debug!(region_id, state = %self.state, "geofence entry ignored"),
        }
    }

    /// OS geofence exit callback
    pub async fn handle_geofence_exit(&mut self, region_id: &str) {
        let is_charger = self.charger.as_ref().is_some_and(|c| c.id == region_id);
        if self.state == SessionState::NearCharger && is_charger {
            self.transition(
                SessionState::Idle,
                SessionEvent::ExitedChargerIntentZone,
                distance_metadata("geofence", None),
            )
            .await;
        } else {
            debug!(region_id, state = %self.state, "geofence exit ignored");
        }
    }

    /// Return to idle after a session has ended.
    ///
    /// Keeps the charger target. Writes a snapshot but emits no event.
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn reset(&mut self) {
        if self.state != SessionState::SessionEnded {
            debug!("reset only applies to an ended session");
            return;
        }

        let previous = self.state;
        self.state = SessionState::Idle;
        self.active_session = None;
        self.merchant = None;
        self.grace_deadline = None;
        self.hard_deadline = None;
        self.dwell.reset();
        self.persist(Persist::Keep).await;

        info!("session reset to idle");
        self.ui.notify(UiNotification::StateChanged {
            previous,
            state: self.state,
            event: None,
        });
        self.sync_timers();
        self.rebuild_geofences_from_state();
    }

    pub fn handle_permission_change(&mut self, status: LocationPermission) {
        match status {
            LocationPermission::Denied => warn!("location permission denied"),
            _ => info!(?status, "location permission changed"),
        }
        self.ui.notify(UiNotification::PermissionStatus { status });
    }

    pub fn set_app_state(&mut self, app_state: AppState) {
        debug!(app_state = app_state.as_str(), "app state changed");
        self.emitter.set_app_state(app_state);
    }

    // ========================================================================
    // Internal messages
    // ========================================================================

    pub async fn handle_internal(&mut self, message: InternalMessage) {
        match message {
            InternalMessage::TimerFired { kind, deadline } => self.handle_timer_fired(kind, deadline).await,
            InternalMessage::Emission(report) => self.handle_emission_report(report).await,
        }
    }

    /// A deadline timer fired. Stale fires (state moved on, or the deadline
    /// was replaced) are dropped.
    async fn handle_timer_fired(&mut self, kind: TimerKind, deadline: DateTime<Utc>) {
        let applies = match kind {
            TimerKind::GracePeriod => {
                self.state == SessionState::InTransit && self.grace_deadline == Some(deadline)
            }
            TimerKind::HardTimeout => {
                self.state.has_active_session() && self.hard_deadline == Some(deadline)
            }
        };
        if !applies {
            debug!(?kind, %deadline, state = %self.state, "stale timer fire ignored");
            return;
        }

        let event = match kind {
            TimerKind::GracePeriod => SessionEvent::GracePeriodExpired,
            TimerKind::HardTimeout => SessionEvent::HardTimeoutExpired,
        };
        info!(?kind, %deadline, "session deadline reached");
        let metadata = HashMap::from([("deadline".to_string(), deadline.to_rfc3339())]);
        self.transition(SessionState::SessionEnded, event, metadata).await;
    }

    async fn handle_emission_report(&mut self, report: EmissionReport) {
        self.emissions_outstanding = self.emissions_outstanding.saturating_sub(1);

        let is_pending = self
            .pending_event
            .as_ref()
            .is_some_and(|pending| pending.event_id == report.event_id);

        match report.result {
            Ok(outcome) => {
                debug!(
                    event_id = %report.event_id,
                    already_processed = outcome.already_processed,
                    "event acknowledged"
                );
                if report.tracked && is_pending {
                    self.persist(Persist::Clear).await;
                }
            }
            Err(EmissionError::AuthRequired { status }) => {
                warn!(event_id = %report.event_id, status, "event delivery needs re-authentication");
                self.ui.notify(UiNotification::AuthRequired {
                    event_id: report.event_id,
                });
            }
            Err(error @ EmissionError::MissingSessionId(_)) => {
                // Stays in the ledger until a later transition replaces it
                warn!(event_id = %report.event_id, error = %error, "event has no session to attach to");
                self.notify_emission_failed(&report.event, report.event_id, &error);
            }
            Err(error) => {
                if report.tracked {
                    self.notify_emission_failed(&report.event, report.event_id, &error);
                }
            }
        }
    }

    fn notify_emission_failed(&self, event: &str, event_id: uuid::Uuid, error: &EmissionError) {
        self.ui.notify(UiNotification::EventEmissionFailed {
            event_id,
            event: event.to_string(),
            error: error.to_string(),
        });
    }

    // ========================================================================
    // Transition machinery
    // ========================================================================

    async fn transition(&mut self, to: SessionState, event: SessionEvent, metadata: HashMap<String, String>) {
        let from = self.state;
        info!(%from, %to, %event, "session transition");

        self.state = to;
        self.update_deadlines(from, to);

        let pending = self.build_event(event, metadata);
        self.persist(Persist::SetTo(pending.clone())).await;
        self.enqueue(&pending);

        self.ui.notify(UiNotification::StateChanged {
            previous: from,
            state: to,
            event: Some(event),
        });
        self.apply_side_effects(from, to);
    }

    fn update_deadlines(&mut self, from: SessionState, to: SessionState) {
        let now = self.clock.now();
        match to {
            SessionState::SessionActive => {
                if !from.has_active_session() {
                    self.hard_deadline = Some(now + to_chrono(self.config.hard_timeout));
                }
                self.grace_deadline = None;
            }
            SessionState::InTransit => {
                self.grace_deadline = Some(now + to_chrono(self.config.grace_period));
            }
            SessionState::AtMerchant => {
                self.grace_deadline = None;
            }
            SessionState::Idle
            | SessionState::NearCharger
            | SessionState::Anchored
            | SessionState::SessionEnded => {
                self.grace_deadline = None;
                self.hard_deadline = None;
            }
        }
    }

    fn apply_side_effects(&mut self, from: SessionState, to: SessionState) {
        match to {
            SessionState::NearCharger => {
                self.location.set_high_accuracy(true);
                if from == SessionState::Anchored {
                    self.dwell.reset();
                }
            }
            SessionState::Idle => {
                self.location.set_high_accuracy(false);
                self.dwell.reset();
            }
            SessionState::Anchored | SessionState::SessionActive | SessionState::AtMerchant => {
                self.ui.trigger_haptic(HapticKind::Success);
            }
            SessionState::InTransit => {
                self.location.set_high_accuracy(true);
            }
            SessionState::SessionEnded => {
                self.dwell.reset();
                self.location.set_high_accuracy(false);
            }
        }

        self.sync_timers();
        self.rebuild_geofences_from_state();
    }

    /// Record an event without changing state
    async fn record(&mut self, event: SessionEvent, metadata: HashMap<String, String>) {
        let pending = self.build_event(event, metadata);
        self.persist(Persist::SetTo(pending.clone())).await;
        self.enqueue(&pending);
    }

    fn build_event(&self, event: SessionEvent, metadata: HashMap<String, String>) -> PendingEvent {
        PendingEvent::new(event, self.clock.now())
            .with_session_id(self.active_session.as_ref().map(|a| a.session_id.clone()))
            .with_charger_id(self.charger.as_ref().map(|c| c.id.clone()))
            .with_metadata(metadata)
    }

    fn enqueue(&mut self, pending: &PendingEvent) {
        if self.emitter.enqueue(pending) {
            self.emissions_outstanding += 1;
        }
    }

    /// Write the current snapshot, applying `pending` to the ledger first.
    /// A failed write is logged; in-memory state stays authoritative.
    async fn persist(&mut self, pending: Persist<PendingEvent>) {
        pending.apply_to(&mut self.pending_event);
        let snapshot = self.snapshot();
        if let Err(e) = self.store.save(&snapshot).await {
            error!(error = %e, state = %snapshot.state, "failed to persist session snapshot");
        }
    }

    /// Align live timers with the current state and deadlines
    fn sync_timers(&mut self) {
        let now = self.clock.now();
        let grace = (self.state == SessionState::InTransit)
            .then_some(self.grace_deadline)
            .flatten();
        let hard = self
            .state
            .has_active_session()
            .then_some(self.hard_deadline)
            .flatten();

        sync_timer(&mut self.grace_timer, grace, TimerKind::GracePeriod, now, &self.internal_tx);
        sync_timer(&mut self.hard_timer, hard, TimerKind::HardTimeout, now, &self.internal_tx);
    }

    /// Replace all geofence registrations with the set the current state
    /// needs: the charger before activation, the merchant during a session,
    /// nothing once ended.
    pub fn rebuild_geofences_from_state(&self) {
        self.geofences.clear_all();
        match self.state {
            SessionState::Idle | SessionState::NearCharger | SessionState::Anchored => {
                if let Some(charger) = &self.charger {
                    self.geofences.add_charger_geofence(
                        &charger.id,
                        charger.latitude,
                        charger.longitude,
                        self.config.charger_intent_radius_m,
                    );
                }
            }
            SessionState::SessionActive | SessionState::InTransit | SessionState::AtMerchant => {
                if let Some(merchant) = &self.merchant {
                    self.geofences.add_merchant_geofence(
                        &merchant.id,
                        merchant.latitude,
                        merchant.longitude,
                        self.config.merchant_radius_m,
                    );
                }
            }
            SessionState::SessionEnded => {}
        }
    }

    fn charger_distance(&self, fix: &LocationFix) -> Option<f64> {
        self.charger
            .as_ref()
            .map(|c| fix.distance_to(c.latitude, c.longitude))
    }

    /// Stop timers and delivery. The snapshot already holds everything
    /// needed to resume.
    pub fn shutdown(&mut self) {
        info!(state = %self.state, "session state machine shutting down");
        if let Some(timer) = self.grace_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.hard_timer.take() {
            timer.cancel();
        }
        self.emitter.shutdown();
    }
}

fn sync_timer(
    slot: &mut Option<DeadlineTimer>,
    desired: Option<DateTime<Utc>>,
    kind: TimerKind,
    now: DateTime<Utc>,
    tx: &mpsc::UnboundedSender<InternalMessage>,
) {
    if let (Some(timer), Some(deadline)) = (slot.as_ref(), desired) {
        if timer.deadline() == deadline && !timer.is_cancelled() {
            return;
        }
    }

    if let Some(timer) = slot.take() {
        timer.cancel();
    }

    if let Some(deadline) = desired {
        debug!(?kind, %deadline, "arming deadline timer");
        let tx = tx.clone();
        *slot = Some(DeadlineTimer::start(deadline, now, move || {
            let _ = tx.send(InternalMessage::TimerFired { kind, deadline });
        }));
    }
}

fn distance_metadata(source: &str, distance_m: Option<f64>) -> HashMap<String, String> {
    let mut metadata = HashMap::from([("source".to_string(), source.to_string())]);
    if let Some(distance) = distance_m {
        metadata.insert("distance_m".to_string(), format!("{:.1}", distance));
    }
    metadata
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
