//! Error types for the session layer.
//!
//! Three families live here:
//!
//! * [`Error`]: failures of the session machinery itself (I/O, handshake,
//!   closed channels). These are what `connect`, `close` and the server
//!   start methods return.
//! * [`ErrorData`]: a JSON-RPC error object sent back to the client when a
//!   request cannot be served (unknown tool, invalid params, loader failure).
//! * [`ToolError`]: what a tool's `execute` returns on failure. It never
//!   becomes a protocol error; the session folds it into an `isError` result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Boxed error returned by resource, prompt and completion loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The primary error type of the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading from or writing to the transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be serialized or parsed as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The peer answered a server-initiated request with an error.
    #[error("JSON-RPC error: {0}")]
    JsonRpc(ErrorData),

    /// A single frame could not be decoded (not UTF-8). The transport itself
    /// is still usable.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// An internal channel closed, usually because the session loop ended.
    #[error("Internal communication channel closed")]
    ChannelClosed,

    /// A server-initiated request did not get an answer in time.
    #[error("Operation timed out")]
    Timeout,

    /// `connect` was called on a session that already has a transport.
    #[error("Session is already connected")]
    AlreadyConnected,

    /// The session reached its terminal state.
    #[error("Session is closed")]
    SessionClosed,

    /// The client never completed the capability handshake.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Definitions can only be registered before the server starts.
    #[error("Server already started; the registry is frozen")]
    RegistryFrozen,

    /// A server can only be started once.
    #[error("Server already started")]
    AlreadyStarted,

    #[error("{0}")]
    Other(String),
}

/// A specialized `Result` type for the session layer.
pub type Result<T> = std::result::Result<T, Error>;

impl From<ErrorData> for Error {
    fn from(err: ErrorData) -> Self {
        Error::JsonRpc(err)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

/// JSON-RPC error object carried by error responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorData {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Failure raised from inside a tool's `execute`.
///
/// `User` carries a message meant for the model reading the result and is
/// surfaced verbatim. Everything else converts into `Failed` through `?` and
/// is rendered as `"Error: <message>"`.
///
/// Like `anyhow::Error`, it does not implement `std::error::Error` itself so
/// that every error type can convert into it.
#[derive(Debug)]
pub enum ToolError {
    User(String),
    Failed(BoxError),
}

impl ToolError {
    /// A user-facing failure, shown to the client as-is.
    pub fn user(message: impl Into<String>) -> Self {
        ToolError::User(message.into())
    }

    /// An ordinary failure built from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        ToolError::Failed(message.into())
    }

    pub fn is_user_facing(&self) -> bool {
        matches!(self, ToolError::User(_))
    }

    /// The text placed in the `isError` result envelope.
    pub fn render(&self) -> String {
        match self {
            ToolError::User(message) => message.clone(),
            ToolError::Failed(err) => format!("Error: {}", err),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::User(message) => f.write_str(message),
            ToolError::Failed(err) => write!(f, "{}", err),
        }
    }
}

impl<E> From<E> for ToolError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        ToolError::Failed(Box::new(err))
    }
}
