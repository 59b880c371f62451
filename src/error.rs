use crate::http::Method;
use std::io;
use thiserror::Error;

/// Main error type for the server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP parsing error: {0}")]
    HttpParse(String),

    /// The same method and pattern were registered twice
    #[error("route conflict: {} {pattern} is already registered", method.as_str())]
    RouteConflict { method: Method, pattern: String },

    /// A route pattern is malformed
    #[error("invalid pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    /// A response value could not be serialized
    #[error("{format} encoding error: {message}")]
    Encoding {
        format: &'static str,
        message: String,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        ServerError::Pattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn encoding(format: &'static str, err: impl std::fmt::Display) -> Self {
        ServerError::Encoding {
            format,
            message: err.to_string(),
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
