//! Error types for trax-protocol.

use thiserror::Error;

/// Main error type for all protocol operations.
///
/// Every variant is terminal for the session that produced it: the role
/// drivers move to the failed state and only `quit` remains callable.
#[derive(Debug, Error)]
pub enum TraxError {
    /// I/O error during pipe/socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream where a message was expected.
    #[error("Transport closed")]
    TransportClosed,

    /// Prefix, kind, tokenization, arity or value syntax violation.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A region or image outside the negotiated capability set.
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    /// A message or call that is illegal in the current session state.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A value that cannot be serialized to the wire.
    #[error("Encoding failure: {0}")]
    EncodingFailure(String),

    /// Invalid bootstrap configuration (environment variables).
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TraxError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        TraxError::MalformedMessage(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        TraxError::UnsupportedValue(message.into())
    }

    pub(crate) fn violation(message: impl Into<String>) -> Self {
        TraxError::ProtocolViolation(message.into())
    }

    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        TraxError::EncodingFailure(message.into())
    }
}

/// Result type alias using TraxError.
pub type Result<T> = std::result::Result<T, TraxError>;
