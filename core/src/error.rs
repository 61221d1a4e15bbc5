//! Error types for the multiplexed client.
//!
//! # Design
//! Every failure a request can hit is delivered through the continuation's
//! error slot as a `MuxError`. Registration refusals and transfer failures
//! keep the transport's numeric code and message. Unexpected
//! transport events never become a `MuxError`; they are logged by the
//! scheduler instead.

use thiserror::Error;

/// A raw failure reported by the transport primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct TransportError {
    pub code: i32,
    pub message: String,
}

impl TransportError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// The payload handed to the response parser is not an HTTP message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The status line has no `PROTOCOL/VERSION` token or no numeric code.
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),
}

/// Errors delivered to continuations and returned by scheduler entry points.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The transport refused to accept the transfer (e.g. resource limits).
    #[error("transfer registration refused: {message} (code {code})")]
    Registration { code: i32, message: String },

    /// The transfer was accepted but failed during I/O.
    #[error("{message} ({})", .url.as_deref().unwrap_or("unknown url"))]
    Transfer {
        code: i32,
        message: String,
        url: Option<String>,
    },

    /// The transport failed outside of any single transfer.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The transfer succeeded but produced no bytes to decode.
    #[error("empty response")]
    EmptyResponse,

    /// The scheduler was torn down before the transfer completed.
    #[error("transfer abandoned before completion")]
    Abandoned,

    /// The scheduler has already released its transport.
    #[error("scheduler is closed")]
    Closed,

    #[error("failed to encode request arguments: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),
}

impl MuxError {
    /// Transport-level code carried by registration and transfer failures.
    pub fn code(&self) -> Option<i32> {
        match self {
            MuxError::Registration { code, .. } | MuxError::Transfer { code, .. } => Some(*code),
            MuxError::Transport(err) => Some(err.code),
            _ => None,
        }
    }
}
