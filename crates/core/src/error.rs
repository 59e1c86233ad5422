//! Error types for Tether.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type alias for Tether operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error reported by the remote system for one query.
///
/// Remote errors are data: they are stored in view state and surfaced through
/// `error`, never returned as `Err` from a read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    /// Human readable message
    pub message: String,
    /// Optional structured payload attached by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteError {
    /// Creates a remote error with a message and no payload.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a structured payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The outcome of one delivery from the remote system: a value or an error.
pub type QueryOutcome = std::result::Result<Value, RemoteError>;

/// Error types for Tether operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Arguments could not be turned into canonical arguments.
    #[error("Invalid arguments: {message}")]
    InvalidArgs { message: String },

    /// A serialized reference name has no registered query.
    #[error("Unknown query reference: {name}")]
    UnknownQuery { name: String },

    /// A serialized envelope is malformed.
    #[error("Invalid envelope: {message}")]
    InvalidEnvelope { message: String },

    /// A one-shot fetch failed on the remote side.
    #[error("Remote fetch failed: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid client configuration.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Error::InvalidArgs {
            message: message.into(),
        }
    }

    /// Creates an unknown query error.
    pub fn unknown_query(name: impl Into<String>) -> Self {
        Error::UnknownQuery { name: name.into() }
    }

    /// Creates an invalid envelope error.
    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Error::InvalidEnvelope {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_query("tasks.get");
        assert!(err.to_string().contains("tasks.get"));

        let err = Error::invalid_args("expected an object");
        assert!(err.to_string().contains("Invalid arguments"));

        let err: Error = RemoteError::new("disconnected").into();
        assert!(err.to_string().contains("disconnected"));
    }

    #[test]
    fn test_remote_error_payload() {
        let err = RemoteError::new("denied").with_data(serde_json::json!({ "code": 403 }));
        assert_eq!(err.to_string(), "denied");
        assert_eq!(err.data, Some(serde_json::json!({ "code": 403 })));

        let encoded = serde_json::to_value(RemoteError::new("x")).unwrap();
        assert_eq!(encoded, serde_json::json!({ "message": "x" }));
    }
}
