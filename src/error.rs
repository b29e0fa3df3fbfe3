use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Subvisor application
#[derive(Error, Debug)]
pub enum SubvisorError {
    // Subscription errors
    #[error("Subscription fetch failed: {message}")]
    FetchFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Malformed candidate: {0}")]
    MalformedCandidate(String),

    #[error("Subscription contained no usable candidates")]
    NoCandidates,

    // Probe errors
    #[error("None of {tried} candidates were reachable")]
    UnreachableAll { tried: usize },

    #[error("Functional probe failed: {0}")]
    ProbeFailed(String),

    #[error("Every reachable candidate failed the functional probe ({tried} tried)")]
    AllCandidatesFailed { tried: usize },

    // Engine process errors
    #[error("Engine supervisor error: {0}")]
    Supervisor(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Subvisor operations
pub type Result<T> = std::result::Result<T, SubvisorError>;

impl SubvisorError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            SubvisorError::UnsupportedProtocol(_)
            | SubvisorError::MalformedCandidate(_)
            | SubvisorError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway
            SubvisorError::FetchFailed { .. }
            | SubvisorError::ProbeFailed(_)
            | SubvisorError::AllCandidatesFailed { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            SubvisorError::NoCandidates | SubvisorError::UnreachableAll { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            SubvisorError::Supervisor(_)
            | SubvisorError::Io(_)
            | SubvisorError::Json(_)
            | SubvisorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error ends a whole resolution cycle, as opposed to
    /// disqualifying a single line or candidate.
    pub fn is_cycle_fatal(&self) -> bool {
        !matches!(
            self,
            SubvisorError::UnsupportedProtocol(_)
                | SubvisorError::MalformedCandidate(_)
                | SubvisorError::ProbeFailed(_)
        )
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for SubvisorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from reqwest errors
impl From<reqwest::Error> for SubvisorError {
    fn from(err: reqwest::Error) -> Self {
        SubvisorError::FetchFailed {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for SubvisorError {
    fn from(err: url::ParseError) -> Self {
        SubvisorError::InvalidConfig(err.to_string())
    }
}

impl From<base64::DecodeError> for SubvisorError {
    fn from(err: base64::DecodeError) -> Self {
        SubvisorError::MalformedCandidate(format!("invalid base64: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            SubvisorError::MalformedCandidate("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SubvisorError::FetchFailed {
                status: Some(503),
                message: "bad http status".to_string()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            SubvisorError::UnreachableAll { tried: 3 }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            SubvisorError::NoCandidates.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            SubvisorError::Supervisor("spawn failed".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_per_candidate_errors_are_not_cycle_fatal() {
        assert!(!SubvisorError::MalformedCandidate("x".to_string()).is_cycle_fatal());
        assert!(!SubvisorError::UnsupportedProtocol("trojan".to_string()).is_cycle_fatal());
        assert!(!SubvisorError::ProbeFailed("timeout".to_string()).is_cycle_fatal());

        assert!(SubvisorError::NoCandidates.is_cycle_fatal());
        assert!(SubvisorError::UnreachableAll { tried: 1 }.is_cycle_fatal());
        assert!(SubvisorError::Supervisor("x".to_string()).is_cycle_fatal());
    }
}
