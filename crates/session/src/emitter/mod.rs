//! Idempotent, at-least-once event delivery
//!
//! This module provides:
//! - [`RetryPolicy`] - bounded exponential backoff with jitter
//! - [`EventTransport`] and [`HttpEventTransport`] - request shapes and the HTTP client
//! - [`EventEmitter`] - the background dispatcher that reports outcomes back

mod dispatcher;
mod retry;
mod transport;

pub use dispatcher::{deliver_with_retry, EmissionReport, EventEmitter, ReportSink};
pub use retry::RetryPolicy;
pub use transport::{
    DeliveryOutcome, EventRequest, EventTransport, HttpEventTransport, OutboundEvent,
    ScriptedTransport, TransportResponse, PRE_SESSION_EVENTS_PATH, SESSION_EVENTS_PATH,
};
