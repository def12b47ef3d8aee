// Error types for the session core

use thiserror::Error;

/// Why `confirm_exclusive_activated` was refused. Local and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActivationRejection {
    #[error("activation requires the anchored state")]
    NotAnchored,

    #[error("no charger is targeted")]
    NoChargerTarget,

    #[error("merchant location was not provided")]
    InvalidMerchantLocation,
}

impl ActivationRejection {
    /// Reason code sent to the backend and the UI
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAnchored => "NOT_ANCHORED",
            Self::NoChargerTarget => "NO_CHARGER_TARGET",
            Self::InvalidMerchantLocation => "INVALID_MERCHANT_LOCATION",
        }
    }
}

/// Failure delivering one event to the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmissionError {
    /// 401/403. The pending event stays; the user must re-authenticate.
    #[error("authentication required (HTTP {status})")]
    AuthRequired { status: u16 },

    /// Any other non-2xx status
    #[error("request failed (HTTP {status}): {body}")]
    RequestFailed { status: u16, body: String },

    /// 2xx with a body we could not parse
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The request body could not be encoded; nothing was sent
    #[error("failed to encode request: {0}")]
    Encoding(String),

    /// Session-scoped event without a session id; it can never be delivered
    #[error("event {0} requires a session id but none is set")]
    MissingSessionId(String),
}

impl EmissionError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Network(_) => true,
            Self::AuthRequired { .. }
            | Self::InvalidResponse(_)
            | Self::Encoding(_)
            | Self::MissingSessionId(_) => false,
        }
    }
}

/// Error type for snapshot persistence
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
