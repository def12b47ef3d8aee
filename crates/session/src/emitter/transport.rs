// Event transport: request shapes and the HTTP client that sends them
//
// The two endpoint shapes are selected purely by `requires_session_id`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::TokenProvider;
use crate::config::EmitterConfig;
use crate::error::EmissionError;
use crate::model::{AppState, PendingEvent};

pub const SESSION_EVENTS_PATH: &str = "/v1/native/session-events";
pub const PRE_SESSION_EVENTS_PATH: &str = "/v1/native/pre-session-events";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An event on its way out. Built from the ledger's [`PendingEvent`] or from
/// a diagnostic that never enters the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub event_id: Uuid,
    pub event: String,
    pub requires_session_id: bool,
    pub session_id: Option<String>,
    pub charger_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl From<&PendingEvent> for OutboundEvent {
    fn from(pending: &PendingEvent) -> Self {
        Self {
            event_id: pending.event_id,
            event: pending.event_name.as_str().to_string(),
            requires_session_id: pending.requires_session_id,
            session_id: pending.session_id.clone(),
            charger_id: pending.charger_id.clone(),
            occurred_at: pending.occurred_at,
            metadata: pending.metadata.clone(),
        }
    }
}

impl OutboundEvent {
    /// Non-canonical diagnostic; always session-scoped
    pub fn diagnostic(
        name: impl Into<String>,
        session_id: Option<String>,
        metadata: HashMap<String, String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event: name.into(),
            requires_session_id: true,
            session_id,
            charger_id: None,
            occurred_at,
            metadata,
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionEventBody<'a> {
    schema_version: &'a str,
    event_id: Uuid,
    idempotency_key: Uuid,
    session_id: &'a str,
    event: &'a str,
    occurred_at: DateTime<Utc>,
    timestamp: DateTime<Utc>,
    source: &'a str,
    app_state: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct PreSessionEventBody<'a> {
    schema_version: &'a str,
    event_id: Uuid,
    idempotency_key: Uuid,
    event: &'a str,
    occurred_at: DateTime<Utc>,
    timestamp: DateTime<Utc>,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    charger_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a HashMap<String, String>>,
}

/// A fully built request, ready for any transport
#[derive(Debug, Clone, PartialEq)]
pub struct EventRequest {
    pub path: &'static str,
    pub idempotency_key: Uuid,
    pub body: serde_json::Value,
}

impl EventRequest {
    /// Build the request body for `event`.
    ///
    /// `sent_at` fills the `timestamp` field; `event_id` and
    /// `idempotency_key` are both the event's own id, so retries and replays
    /// are byte-identical on those fields.
    pub fn build(
        config: &EmitterConfig,
        event: &OutboundEvent,
        app_state: AppState,
        sent_at: DateTime<Utc>,
    ) -> Result<Self, EmissionError> {
        let metadata = (!event.metadata.is_empty()).then_some(&event.metadata);

        let (path, body) = if event.requires_session_id {
            let session_id = event
                .session_id
                .as_deref()
                .ok_or_else(|| EmissionError::MissingSessionId(event.event.clone()))?;
            let body = SessionEventBody {
                schema_version: &config.schema_version,
                event_id: event.event_id,
                idempotency_key: event.event_id,
                session_id,
                event: &event.event,
                occurred_at: event.occurred_at,
                timestamp: sent_at,
                source: &config.source,
                app_state: app_state.as_str(),
                metadata,
            };
            (SESSION_EVENTS_PATH, encode_body(&body)?)
        } else {
            let body = PreSessionEventBody {
                schema_version: &config.schema_version,
                event_id: event.event_id,
                idempotency_key: event.event_id,
                event: &event.event,
                occurred_at: event.occurred_at,
                timestamp: sent_at,
                source: &config.source,
                charger_id: event.charger_id.as_deref(),
                metadata,
            };
            (PRE_SESSION_EVENTS_PATH, encode_body(&body)?)
        };

        Ok(Self {
            path,
            idempotency_key: event.event_id,
            body,
        })
    }
}

fn encode_body<T: Serialize>(body: &T) -> Result<serde_json::Value, EmissionError> {
    serde_json::to_value(body).map_err(|e| EmissionError::Encoding(e.to_string()))
}

/// Raw status and body from the server
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Successful delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// The server had already seen this idempotency key
    pub already_processed: bool,
}

#[derive(Debug, Deserialize)]
struct EventAck {
    #[serde(default)]
    status: Option<String>,
}

impl TransportResponse {
    /// Map a response onto the delivery outcome or error taxonomy
    pub fn classify(&self) -> Result<DeliveryOutcome, EmissionError> {
        match self.status {
            200..=299 => {
                if self.body.trim().is_empty() {
                    return Ok(DeliveryOutcome {
                        already_processed: false,
                    });
                }
                let ack: EventAck = serde_json::from_str(&self.body)
                    .map_err(|e| EmissionError::InvalidResponse(e.to_string()))?;
                Ok(DeliveryOutcome {
                    already_processed: ack.status.as_deref() == Some("already_processed"),
                })
            }
            401 | 403 => Err(EmissionError::AuthRequired {
                status: self.status,
            }),
            status => Err(EmissionError::RequestFailed {
                status,
                body: self.body.clone(),
            }),
        }
    }
}

/// Sends one request. Only transport failures are errors here; HTTP
/// statuses are classified by the caller.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send(&self, request: &EventRequest) -> Result<TransportResponse, EmissionError>;
}

/// reqwest-backed transport
pub struct HttpEventTransport {
    base_url: String,
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpEventTransport {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            tokens,
        }
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn send(&self, request: &EventRequest) -> Result<TransportResponse, EmissionError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .http
            .post(&url)
            .header("Idempotency-Key", request.idempotency_key.to_string())
            .json(&request.body);

        if let Some(token) = self.tokens.access_token() {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EmissionError::Network(e.to_string()))?;

        let status: StatusCode = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EmissionError::Network(e.to_string()))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Transport that replays scripted responses and records every request.
///
/// Primarily for testing. When the script runs out it answers 200.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportResponse, EmissionError>>>,
    sent: Mutex<Vec<EventRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with this status and an empty body
    pub fn respond(self, status: u16) -> Self {
        self.script
            .lock()
            .push_back(Ok(TransportResponse::new(status, "")));
        self
    }

    pub fn respond_with(self, response: TransportResponse) -> Self {
        self.script.lock().push_back(Ok(response));
        self
    }

    pub fn fail_with(self, error: EmissionError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Every request sent so far, in order
    pub fn requests(&self) -> Vec<EventRequest> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn send(&self, request: &EventRequest) -> Result<TransportResponse, EmissionError> {
        self.sent.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::new(200, "")))
    }
}
