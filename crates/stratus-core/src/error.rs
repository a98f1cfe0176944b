//! Error types for Stratus operations.
//!
//! The taxonomy separates failures a caller can retry (a response outside the
//! acceptable status set) from failures that need a different request
//! (malformed content), and from the two typed polling outcomes (timeout and
//! explicit failure state). Cancellation is not an error: it is reported as
//! [`Outcome::Canceled`](crate::continuation::Outcome::Canceled).

use reqwest::StatusCode;
use thiserror::Error;

use crate::status::ResourceStatus;

/// Main error type for Stratus operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Response status outside the acceptable set for the exchange.
    #[error("HTTP {status}: {body}")]
    TransientHttp {
        /// Status code returned by the server
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Malformed JSON, or a structurally required key was missing.
    #[error("Failed to deserialize response: {0}")]
    Deserialization(String),

    /// A poll exceeded its bound without reaching a terminal resource state.
    #[error(
        "Timed out waiting for `{subject}` (last status: {})",
        .last_status.as_ref().map_or_else(|| "none".into(), ToString::to_string)
    )]
    Timeout {
        /// Identifier of the polled resource
        subject: String,
        /// Last status observed before the bound was exceeded
        last_status: Option<ResourceStatus>,
    },

    /// The polled resource reached a declared failure status.
    #[error("Resource `{subject}` entered failure status {status}")]
    TerminalState {
        /// Identifier of the polled resource
        subject: String,
        /// Matched failure status
        status: ResourceStatus,
        /// Resource representation at the time of failure
        snapshot: serde_json::Value,
    },

    /// The request never produced a response (connect, TLS, IO failure).
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid endpoint or link target
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Invalid resource identifier
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

/// Specialized result type for Stratus operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a [`Error::TransientHttp`] from a status code and body.
    #[must_use]
    pub fn http(status: StatusCode, body: impl Into<String>) -> Self {
        Self::TransientHttp {
            status: status.as_u16(),
            body: body.into(),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TransientHttp { .. } => "TRANSIENT_HTTP",
            Self::Deserialization(_) => "DESERIALIZATION",
            Self::Timeout { .. } => "TIMEOUT",
            Self::TerminalState { .. } => "TERMINAL_STATE",
            Self::Transport(_) => "TRANSPORT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::InvalidId(_) => "INVALID_ID",
        }
    }

    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::TransientHttp { status, .. } => StatusCode::from_u16(*status).ok(),
            _ => None,
        }
    }

    /// True when the server reported the resource as absent (HTTP 404).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TransientHttp { status: 404, .. })
    }

    /// True when repeating the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientHttp { .. } | Self::Transport(_))
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidId(err.to_string())
    }
}
