//! Error handling types for dce-client
//!
//! This module provides the error taxonomy shared by the engine, the dispatch
//! tree, the consumer router and the configuration layer.

use std::sync::PoisonError;

use serde_json::Value;
use thiserror::Error;

/// Comprehensive error type for client operations
#[derive(Debug, Error)]
pub enum DceError {
    /// Malformed local input (unset endpoint, undecodable frame)
    #[error("DCEngine client error: {message}")]
    Client { message: String },

    /// Service-level failure reported by the manifest exchange
    #[error("DCEngine server error: {error}")]
    Server { error: String, action: Value },

    /// Unrouted push message reporting status "error"
    #[error("DCEngine request error: {error}")]
    Request { error: String, error_data: Value },

    /// RPC reply carrying status "error"
    #[error("DCEngine action {action} rejected: {error}")]
    Rejected {
        action: String,
        error: String,
        error_data: Value,
    },

    /// Path resolution miss against the dispatch tree
    #[error("{path} not implemented.")]
    ActionNotImplemented { path: String },

    /// The connection is gone or the transport refused a frame
    #[error("DCEngine transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// A consumer with this name is already registered
    #[error("Consumer already registered: {name}")]
    DuplicateConsumer { name: String },
}

/// Result type for client operations
pub type DceResult<T> = Result<T, DceError>;

/// Helper trait to recover the guard from a poisoned lock.
pub trait LockResultExt<T> {
    /// Return the guard, logging when the lock had been poisoned.
    ///
    /// The context parameter identifies which operation triggered lock recovery.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "dce::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

/// Render a wire error field as text.
///
/// Strings are used verbatim; other JSON values keep their JSON form.
pub(crate) fn error_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Helper functions for common error patterns
impl DceError {
    /// Create a client error
    pub fn client(message: impl Into<String>) -> Self {
        DceError::Client {
            message: message.into(),
        }
    }

    /// Create a server error from the `error`/`error_data` fields of a service message
    pub fn server(error: Option<&Value>, action: Option<&Value>) -> Self {
        DceError::Server {
            error: error_text(error),
            action: action.cloned().unwrap_or(Value::Null),
        }
    }

    /// Create a request error from the `error`/`error_data` fields of a push message
    pub fn request(error: Option<&Value>, error_data: Option<&Value>) -> Self {
        DceError::Request {
            error: error_text(error),
            error_data: error_data.cloned().unwrap_or(Value::Null),
        }
    }

    /// Create an "action not implemented" error for a dotted path
    pub fn action_not_implemented(path: impl Into<String>) -> Self {
        DceError::ActionNotImplemented { path: path.into() }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        DceError::Transport(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        DceError::Config {
            message: message.into(),
        }
    }
}
