//! # Error Handling
//!
//! Centralized error types for the Nucleus core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! The same type travels through the dispatch loop inside
//! [`Flow::Error`](crate::handler::Flow::Error), so every variant knows the
//! HTTP status it should surface as when it reaches the final handler.

use thiserror::Error;

/// Result type alias for Nucleus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Nucleus runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid route pattern provided at registration time
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A captured path parameter could not be percent-decoded
    #[error("Failed to decode param '{value}' for '{name}'")]
    ParamDecode {
        /// Parameter name
        name: String,
        /// Raw captured value
        value: String,
    },

    /// Error carrying an explicit HTTP status, raised by a handler
    #[error("{message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Human-readable message
        message: String,
    },

    /// Any other error raised by a handler
    #[error(transparent)]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    /// The response was already sent
    #[error("Response already sent")]
    ResponseSent,

    /// Request method outside the supported set
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

impl Error {
    /// Create an error that surfaces with the given HTTP status
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Wrap an arbitrary handler error
    pub fn custom<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Handler(err.into())
    }

    /// HTTP status this error maps to when it reaches the final handler
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::ParamDecode { .. } => 400,
            Self::Status { status, .. } if *status >= 400 && *status < 600 => *status,
            Self::UnsupportedMethod(_) => 501,
            Self::PayloadTooLarge { .. } => 413,
            _ => 500,
        }
    }
}
