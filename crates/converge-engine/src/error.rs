//! Engine error taxonomy.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that abort a reconciliation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced or requested resource does not exist.
    #[error("{message}")]
    NotFound { message: String },

    /// A lookup matched more than one resource.
    #[error("{subject} matched {count} resources; supply a UUID to identify exactly one")]
    Ambiguous { subject: String, count: usize },

    /// A parameter could not be turned into a canonical reference.
    #[error("failed to resolve '{field}': {source}")]
    ResolutionFailed {
        field: String,
        #[source]
        source: Box<EngineError>,
    },

    /// The remote API rejected a request.
    #[error("remote API rejected the request ({status}): {body}")]
    RemoteRejected { status: u16, body: String },

    /// A marketplace order, or a resource waited on after a termination or
    /// action, reached a failure state.
    #[error("remote operation finished in state '{state}': {message}")]
    OrderFailed { state: String, message: String },

    /// A wait did not reach a terminal state before the deadline.
    #[error("timed out after {}s waiting for {operation}", .elapsed.as_secs())]
    Timeout { operation: String, elapsed: Duration },

    /// Module definition or intent is malformed.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Network or protocol failure talking to the API.
    #[error("transport error: {0}")]
    Transport(String),
}

impl EngineError {
    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(message.into())
    }

    /// Wrap an error as a resolution failure of `field`.
    ///
    /// Errors that are already resolution failures are left alone so the
    /// innermost field is reported.
    pub fn resolving(field: &str, source: EngineError) -> Self {
        match source {
            e @ EngineError::ResolutionFailed { .. } => e,
            e @ EngineError::ConfigurationInvalid(_) => e,
            other => Self::ResolutionFailed {
                field: field.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Ambiguous { .. } => "ambiguous",
            EngineError::ResolutionFailed { .. } => "resolution_failed",
            EngineError::RemoteRejected { .. } | EngineError::OrderFailed { .. } => {
                "remote_rejected"
            }
            EngineError::Timeout { .. } => "timeout",
            EngineError::ConfigurationInvalid(_) => "configuration_invalid",
            EngineError::Transport(_) => "transport",
        }
    }

    /// HTTP status behind this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            EngineError::RemoteRejected { status, .. } => Some(*status),
            EngineError::ResolutionFailed { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Convert into the descriptor reported to the caller.
    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind().to_string(),
            message: self.to_string(),
            status: self.status(),
        }
    }
}

impl From<converge_client::Error> for EngineError {
    fn from(err: converge_client::Error) -> Self {
        use converge_client::Error as ClientError;

        match err {
            ClientError::Api {
                status, message, ..
            } => EngineError::RemoteRejected {
                status,
                body: message,
            },
            ClientError::NotFound(message) => EngineError::RemoteRejected {
                status: 404,
                body: message,
            },
            e @ ClientError::MissingPathParam { .. } => EngineError::config(e.to_string()),
            other => EngineError::Transport(other.to_string()),
        }
    }
}

/// Serializable error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescriptor {
    /// Machine-readable kind (`not_found`, `ambiguous`, `timeout`, ...).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status, when the remote API produced the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}
