use std::time::Duration;

/// Failures talking to the message bus.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("subscribe to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },
    #[error("publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Error taxonomy for a bridge instance.
///
/// Everything except [`BridgeError::RetriesExhausted`] is recovered locally:
/// the offending message is logged and dropped and the bridge keeps running.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unknown timing: {0}")]
    UnknownTiming(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{value} is out of range 1..={max}")]
    OutOfRange { value: u64, max: u32 },

    #[error("device error: {0}")]
    Device(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },

    #[error("cancelled")]
    Cancelled,
}

impl BridgeError {
    /// Only transport-retry exhaustion ends a bridge instance.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_failure",
            Self::InvalidPayload(_) | Self::UnknownTiming(_) => "invalid_payload",
            Self::DuplicateName(_) => "duplicate_name",
            Self::NotFound(_) => "not_found",
            Self::OutOfRange { .. } => "out_of_range",
            Self::Device(_) => "device_error",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidPayload(e.to_string())
    }
}
