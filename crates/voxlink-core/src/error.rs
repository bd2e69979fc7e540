//! Shared error type across voxlink crates.

use thiserror::Error;

/// Stable error codes (used in logs and asserted by tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// HTTP negotiation failed.
    NegotiationFailed,
    /// A single inbound record could not be decoded.
    MalformedFrame,
    /// An outgoing message is missing a required field.
    MissingField,
    /// The connection is not in a state that accepts the operation.
    NotReady,
    /// The bounded audio queue is full.
    Backpressure,
    /// The socket failed or was closed.
    TransportClosed,
    /// An application subscriber faulted.
    CallbackError,
    /// A caller cancellation token fired.
    Cancelled,
    /// A bounded wait elapsed.
    Timeout,
    /// Configuration could not be parsed or validated.
    InvalidConfig,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal invariant failure.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and test vectors.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NegotiationFailed => "NEGOTIATION_FAILED",
            ErrorCode::MalformedFrame => "MALFORMED_FRAME",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::NotReady => "NOT_READY",
            ErrorCode::Backpressure => "BACKPRESSURE",
            ErrorCode::TransportClosed => "TRANSPORT_CLOSED",
            ErrorCode::CallbackError => "CALLBACK_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, VoxlinkError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum VoxlinkError {
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("connection not ready (state: {0})")]
    NotReady(String),
    #[error("audio queue full")]
    Backpressure,
    #[error("transport closed: {0}")]
    TransportClosed(String),
    #[error("callback for `{event}` failed: {message}")]
    CallbackError { event: String, message: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl VoxlinkError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            VoxlinkError::NegotiationFailed(_) => ErrorCode::NegotiationFailed,
            VoxlinkError::MalformedFrame(_) => ErrorCode::MalformedFrame,
            VoxlinkError::MissingField(_) => ErrorCode::MissingField,
            VoxlinkError::NotReady(_) => ErrorCode::NotReady,
            VoxlinkError::Backpressure => ErrorCode::Backpressure,
            VoxlinkError::TransportClosed(_) => ErrorCode::TransportClosed,
            VoxlinkError::CallbackError { .. } => ErrorCode::CallbackError,
            VoxlinkError::Cancelled => ErrorCode::Cancelled,
            VoxlinkError::Timeout(_) => ErrorCode::Timeout,
            VoxlinkError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            VoxlinkError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            VoxlinkError::Internal(_) => ErrorCode::Internal,
        }
    }
}
