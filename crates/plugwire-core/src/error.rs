//! Shared error type across plugwire crates.

use thiserror::Error;

/// Stable error codes (used in logs, metrics labels and test vectors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Frame bytes do not decode to a valid envelope.
    MalformedPayload,
    /// Declared frame length exceeds the configured maximum.
    FrameTooLarge,
    /// No route matches a request path.
    Unroutable,
    /// A handler failed while processing a request.
    HandlerFailure,
    /// The outbound sink is closed or unwritable.
    SinkUnavailable,
    /// A route pattern could not be compiled.
    InvalidRoute,
    /// Configuration rejected.
    Config,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// The peer closed the connection.
    ConnectionClosed,
    /// A pending request expired.
    Timeout,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and error responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedPayload => "MALFORMED_PAYLOAD",
            ErrorCode::FrameTooLarge => "FRAME_TOO_LARGE",
            ErrorCode::Unroutable => "UNROUTABLE",
            ErrorCode::HandlerFailure => "HANDLER_FAILURE",
            ErrorCode::SinkUnavailable => "SINK_UNAVAILABLE",
            ErrorCode::InvalidRoute => "INVALID_ROUTE",
            ErrorCode::Config => "CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PlugwireError>;

/// Unified error type used by core and plugin runtime.
#[derive(Debug, Error)]
pub enum PlugwireError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },
    #[error("unroutable: {0}")]
    Unroutable(String),
    #[error("handler failure: {0}")]
    HandlerFailure(String),
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),
    #[error("invalid route: {0}")]
    InvalidRoute(String),
    #[error("config: {0}")]
    Config(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("request timed out")]
    Timeout,
    #[error("internal: {0}")]
    Internal(String),
}

impl PlugwireError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            PlugwireError::MalformedPayload(_) => ErrorCode::MalformedPayload,
            PlugwireError::FrameTooLarge { .. } => ErrorCode::FrameTooLarge,
            PlugwireError::Unroutable(_) => ErrorCode::Unroutable,
            PlugwireError::HandlerFailure(_) => ErrorCode::HandlerFailure,
            PlugwireError::SinkUnavailable(_) => ErrorCode::SinkUnavailable,
            PlugwireError::InvalidRoute(_) => ErrorCode::InvalidRoute,
            PlugwireError::Config(_) => ErrorCode::Config,
            PlugwireError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            PlugwireError::ConnectionClosed => ErrorCode::ConnectionClosed,
            PlugwireError::Timeout => ErrorCode::Timeout,
            PlugwireError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the read loop can keep going after this error.
    ///
    /// Only a malformed frame is recoverable: the codec has already skipped
    /// past its bytes.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlugwireError::MalformedPayload(_))
    }
}
