//! Background event delivery
//!
//! [`EventEmitter`] owns a single dispatcher task that drains a FIFO queue of
//! outbound events. Each event is delivered with bounded retry; the outcome
//! is handed back through a report sink and never mutates session state
//! directly. Queue order is delivery order, so a replayed event always goes
//! out before anything emitted after it.
//!
//! The cost is head-of-line blocking: while one event sits in its backoff
//! sleeps (about 3 s plus jitter with the default policy), every event
//! queued behind it waits. A task per event would not wait, but it would lose
//! the ordering guarantee.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::retry::RetryPolicy;
use super::transport::{DeliveryOutcome, EventRequest, EventTransport, OutboundEvent};
use crate::config::EmitterConfig;
use crate::error::EmissionError;
use crate::model::{AppState, PendingEvent};

/// Result of delivering one event, after all retries
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionReport {
    pub event_id: Uuid,
    pub event: String,

    /// Whether the event lives in the pending-event ledger
    pub tracked: bool,

    /// Attempts actually made
    pub attempts: u32,

    pub result: Result<DeliveryOutcome, EmissionError>,
}

/// Callback receiving delivery reports
pub type ReportSink = Arc<dyn Fn(EmissionReport) + Send + Sync>;

#[derive(Debug)]
struct EmissionJob {
    event: OutboundEvent,
    tracked: bool,
}

pub struct EventEmitter {
    jobs: mpsc::UnboundedSender<EmissionJob>,
    app_state: Arc<RwLock<AppState>>,
    cancel: CancellationToken,
}

impl EventEmitter {
    /// Start the dispatcher task. Must be called inside a tokio runtime.
    pub fn spawn(config: EmitterConfig, transport: Arc<dyn EventTransport>, sink: ReportSink) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let app_state = Arc::new(RwLock::new(AppState::default()));
        let cancel = CancellationToken::new();

        let dispatcher = Dispatcher {
            config,
            transport,
            sink,
            app_state: app_state.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(dispatcher.run(rx));

        Self {
            jobs,
            app_state,
            cancel,
        }
    }

    /// Queue a ledger event for delivery.
    ///
    /// Returns false if the dispatcher has stopped; no report will follow.
    pub fn enqueue(&self, event: &PendingEvent) -> bool {
        self.push(OutboundEvent::from(event), true)
    }

    /// Queue an event that is sent once and never tracked for replay
    pub fn enqueue_untracked(&self, event: OutboundEvent) -> bool {
        self.push(event, false)
    }

    fn push(&self, event: OutboundEvent, tracked: bool) -> bool {
        debug!(event_id = %event.event_id, event = %event.event, tracked, "queueing event");
        if self.jobs.send(EmissionJob { event, tracked }).is_err() {
            warn!("event dispatcher has stopped, event left for replay");
            return false;
        }
        true
    }

    pub fn set_app_state(&self, state: AppState) {
        *self.app_state.write() = state;
    }

    pub fn app_state(&self) -> AppState {
        *self.app_state.read()
    }

    /// Stop delivering. In-flight attempts are abandoned; tracked events
    /// remain in the ledger for the next launch.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventEmitter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Dispatcher {
    config: EmitterConfig,
    transport: Arc<dyn EventTransport>,
    sink: ReportSink,
    app_state: Arc<RwLock<AppState>>,
    cancel: CancellationToken,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<EmissionJob>) {
        loop {
            let job = tokio::select! {
                _ = self.cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let report = tokio::select! {
                _ = self.cancel.cancelled() => break,
                report = self.deliver(job) => report,
            };
            (self.sink)(report);
        }
        debug!("event dispatcher stopped");
    }

    #[instrument(skip(self, job), fields(event_id = %job.event.event_id, event = %job.event.event))]
    async fn deliver(&self, job: EmissionJob) -> EmissionReport {
        let (attempts, result) = deliver_with_retry(
            self.transport.as_ref(),
            &self.config,
            &self.config.retry,
            &job.event,
            || *self.app_state.read(),
        )
        .await;

        match &result {
            Ok(outcome) => info!(
                attempts,
                already_processed = outcome.already_processed,
                "event delivered"
            ),
            Err(e) => warn!(attempts, error = %e, "event delivery failed"),
        }

        EmissionReport {
            event_id: job.event.event_id,
            event: job.event.event,
            tracked: job.tracked,
            attempts,
            result,
        }
    }
}

/// Deliver one event, retrying 429/5xx/transport failures with backoff.
///
/// Returns the number of attempts made alongside the final result.
pub async fn deliver_with_retry<F>(
    transport: &dyn EventTransport,
    config: &EmitterConfig,
    policy: &RetryPolicy,
    event: &OutboundEvent,
    app_state: F,
) -> (u32, Result<DeliveryOutcome, EmissionError>)
where
    F: Fn() -> AppState,
{
    let mut attempt: u32 = 0;
    loop {
        let request = match EventRequest::build(config, event, app_state(), Utc::now()) {
            Ok(request) => request,
            Err(e) => return (attempt, Err(e)),
        };

        let result = match transport.send(&request).await {
            Ok(response) => response.classify(),
            Err(e) => Err(e),
        };
        attempt += 1;

        match result {
            Ok(outcome) => return (attempt, Ok(outcome)),
            Err(e) if e.is_retryable() && policy.has_attempts_remaining(attempt) => {
                let delay = policy.delay_for_retry(attempt - 1);
                debug!(attempt, ?delay, error = %e, "retrying event delivery");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return (attempt, Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::transport::{ScriptedTransport, TransportResponse};
    use crate::model::SessionEvent;

    fn pending() -> PendingEvent {
        PendingEvent::new(SessionEvent::ExclusiveActivated, Utc::now())
            .with_session_id(Some("sess-42".to_string()))
    }

    async fn run_once(transport: &ScriptedTransport, event: &PendingEvent) -> (u32, Result<DeliveryOutcome, EmissionError>) {
        let config = EmitterConfig::default();
        deliver_with_retry(
            transport,
            &config,
            &config.retry,
            &OutboundEvent::from(event),
            || AppState::Background,
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_then_success() {
        let transport = ScriptedTransport::new().respond(429).respond(200);
        let event = pending();

        let (attempts, result) = run_once(&transport, &event).await;

        assert_eq!(attempts, 2);
        assert!(result.is_ok());
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].idempotency_key, event.event_id);
        assert_eq!(requests[0].body["event_id"], requests[1].body["event_id"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_server_errors_exhaust_budget() {
        let transport = ScriptedTransport::new().respond(500).respond(500).respond(500).respond(200);
        let (attempts, result) = run_once(&transport, &pending()).await;

        assert_eq!(attempts, 3);
        assert!(matches!(
            result,
            Err(EmissionError::RequestFailed { status: 500, .. })
        ));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let transport = ScriptedTransport::new().respond(401);
        let (attempts, result) = run_once(&transport, &pending()).await;

        assert_eq!(attempts, 1);
        assert_eq!(result, Err(EmissionError::AuthRequired { status: 401 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_hard_failure() {
        let transport = ScriptedTransport::new().respond(422);
        let (attempts, _) = run_once(&transport, &pending()).await;
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_retries() {
        let transport = ScriptedTransport::new()
            .fail_with(EmissionError::Network("connection reset".into()))
            .respond_with(TransportResponse::new(202, r#"{"status":"accepted"}"#));
        let (attempts, result) = run_once(&transport, &pending()).await;

        assert_eq!(attempts, 2);
        assert_eq!(
            result,
            Ok(DeliveryOutcome {
                already_processed: false
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_reports_in_order() {
        let transport = Arc::new(ScriptedTransport::new().respond(503).respond(200).respond(200));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: ReportSink = Arc::new(move |report| {
            let _ = tx.send(report);
        });

        let emitter = EventEmitter::spawn(EmitterConfig::default(), transport.clone(), sink);
        let first = pending();
        let second = PendingEvent::new(SessionEvent::DepartedCharger, Utc::now())
            .with_session_id(Some("sess-42".to_string()));
        emitter.enqueue(&first);
        emitter.enqueue(&second);

        let r1 = rx.recv().await.unwrap();
        let r2 = rx.recv().await.unwrap();
        assert_eq!(r1.event_id, first.event_id);
        assert_eq!(r1.attempts, 2);
        assert_eq!(r2.event_id, second.event_id);
        assert!(r1.tracked && r2.tracked);

        // The second event waits out the first one's backoff
        let keys: Vec<_> = transport.requests().iter().map(|r| r.idempotency_key).collect();
        assert_eq!(keys, vec![first.event_id, first.event_id, second.event_id]);
    }
}
