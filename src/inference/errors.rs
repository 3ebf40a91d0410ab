//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility — these types carry the context needed to
//! build meaningful log entries.

use thiserror::Error;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be parsed.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// The response contained no choices.
    #[error("empty response from model endpoint")]
    EmptyResponse,

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Whether this error means the endpoint is unreachable or overloaded,
    /// as opposed to a malformed request on our side.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            InferenceError::ConnectionFailed { .. }
                | InferenceError::Timeout { .. }
                | InferenceError::HttpError { status: 502..=504, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_covers_transport_failures() {
        assert!(InferenceError::ConnectionFailed {
            endpoint: "".into(),
            reason: "".into()
        }
        .is_unavailable());
        assert!(InferenceError::Timeout { duration_secs: 30 }.is_unavailable());
        assert!(InferenceError::HttpError { status: 503, body: "".into() }.is_unavailable());
    }

    #[test]
    fn unavailable_excludes_client_errors() {
        assert!(!InferenceError::HttpError { status: 400, body: "".into() }.is_unavailable());
        assert!(!InferenceError::EmptyResponse.is_unavailable());
    }
}
