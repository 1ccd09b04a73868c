//! Error types for the slidekick session core.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) accessible
//! via [`SlidekickError::code()`]. The session loops only ever branch on
//! [`SlidekickError::is_transport_closed()`]: a closed transport ends the
//! session, everything else is logged and the loop carries on.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Malformed navigation request or tool arguments.
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";

    /// Tool name not present in the registry.
    pub const UNKNOWN_TOOL: &str = "UNKNOWN_TOOL";

    /// A tool handler returned an error or panicked.
    pub const HANDLER_FAULT: &str = "HANDLER_FAULT";

    /// A tool with the same name is already registered.
    pub const DUPLICATE_REGISTRATION: &str = "DUPLICATE_REGISTRATION";

    /// The client connection or the inference stream is closed.
    pub const TRANSPORT_CLOSED: &str = "TRANSPORT_CLOSED";

    /// Any other I/O fault on a live transport.
    pub const TRANSIENT_IO: &str = "TRANSIENT_IO";

    /// The audio queue was torn down.
    pub const QUEUE_CLOSED: &str = "QUEUE_CLOSED";

    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Inference stream handshake or protocol error.
    pub const INFERENCE_ERROR: &str = "INFERENCE_ERROR";

    /// Document conversion failed.
    pub const CONVERSION_FAILED: &str = "CONVERSION_FAILED";

    /// A supervised task panicked or was aborted.
    pub const TASK_FAILED: &str = "TASK_FAILED";

    /// Local I/O error.
    pub const IO_ERROR: &str = "IO_ERROR";

    /// JSON encode/decode error.
    pub const JSON_ERROR: &str = "JSON_ERROR";
}

/// Top-level error type for slidekick.
#[derive(Debug, thiserror::Error)]
pub enum SlidekickError {
    /// Malformed navigation request or tool arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Tool name not present in the registry.
    #[error("Unknown tool function requested: '{0}' is not registered.")]
    UnknownTool(String),

    /// A tool handler failed.
    #[error("tool '{tool}' failed: {message}")]
    HandlerFault {
        /// Name of the tool whose handler failed.
        tool: String,
        /// Original error message from the handler.
        message: String,
    },

    /// A tool with the same name is already registered.
    #[error("tool '{0}' is already registered")]
    DuplicateRegistration(String),

    /// The remote stream or the client connection is closed.
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// Any other transport fault; the caller may retry.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// The audio queue was torn down while waiting.
    #[error("audio queue closed")]
    QueueClosed,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Inference stream handshake or protocol error.
    #[error("inference error: {0}")]
    Inference(String),

    /// Document conversion failed.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// A supervised task panicked or was aborted.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SlidekickError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => error_codes::INVALID_ARGUMENT,
            Self::UnknownTool(_) => error_codes::UNKNOWN_TOOL,
            Self::HandlerFault { .. } => error_codes::HANDLER_FAULT,
            Self::DuplicateRegistration(_) => error_codes::DUPLICATE_REGISTRATION,
            Self::TransportClosed(_) => error_codes::TRANSPORT_CLOSED,
            Self::TransientIo(_) => error_codes::TRANSIENT_IO,
            Self::QueueClosed => error_codes::QUEUE_CLOSED,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Inference(_) => error_codes::INFERENCE_ERROR,
            Self::Conversion(_) => error_codes::CONVERSION_FAILED,
            Self::TaskFailed(_) => error_codes::TASK_FAILED,
            Self::Io(_) => error_codes::IO_ERROR,
            Self::Json(_) => error_codes::JSON_ERROR,
        }
    }

    /// True when the error means the peer is gone and the session must end.
    pub fn is_transport_closed(&self) -> bool {
        matches!(self, Self::TransportClosed(_) | Self::QueueClosed)
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SlidekickError>;
