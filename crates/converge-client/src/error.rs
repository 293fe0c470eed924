//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error ({status}) from {url}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
        /// Error message extracted from the response body.
        message: String,
    },

    /// Resource not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A path template referenced a parameter that was not supplied.
    #[error("Missing path parameter '{name}' for '{template}'")]
    MissingPathParam {
        /// Placeholder name.
        name: String,
        /// The template being expanded.
        template: String,
    },

    /// Server answered with a success status but an unexpected body shape.
    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse {
        /// Request URL.
        url: String,
        /// What was wrong with the body.
        message: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Api { status: 401 | 403, .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::NotFound(_) => Some(404),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pull a human-readable message out of an error body.
///
/// DRF-style APIs answer with `{"detail": "..."}`; anything else is returned
/// as the raw body so the remote message is never lost.
pub(crate) fn extract_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(serde_json::Value::String(detail)) = map.get("detail")
    {
        return detail.clone();
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_predicates() {
        assert!(Error::NotFound("x".into()).is_not_found());
        let err = Error::Api {
            status: 404,
            url: "http://x/".into(),
            message: "gone".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_server_error_predicate() {
        let err = Error::Api {
            status: 503,
            url: "http://x/".into(),
            message: "busy".into(),
        };
        assert!(err.is_server_error());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_extract_message_prefers_detail() {
        assert_eq!(extract_message(r#"{"detail": "No access."}"#), "No access.");
        assert_eq!(
            extract_message(r#"{"name": ["This field is required."]}"#),
            r#"{"name": ["This field is required."]}"#
        );
        assert_eq!(extract_message("  plain text \n"), "plain text");
    }
}
