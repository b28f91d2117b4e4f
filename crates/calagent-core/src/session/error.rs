//! Session error taxonomy.
//!
//! No variant is retried by the session layer. `AuthExpired` is always
//! accompanied by a forced logout.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// An authenticated call was attempted without a credential.
    #[error("No authentication token available")]
    NoToken,

    /// The backend rejected the credential (401) or it expired locally.
    #[error("Authentication expired. Please login again.")]
    AuthExpired,

    /// The backend could not be reached or answered with something unusable.
    #[error("Network error: {0}")]
    Network(String),

    /// The profile endpoint failed with a non-401 status or transport error.
    #[error("Failed to fetch user profile: {0}")]
    ProfileFetch(String),

    /// Non-2xx, non-401 response from an authenticated call.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// A 2xx response body did not have the expected shape.
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// The token could not be persisted.
    #[error("Failed to persist session: {0:#}")]
    Storage(anyhow::Error),
}

impl SessionError {
    /// Error for a failed response without a usable `detail` field.
    pub fn http_status(status: StatusCode) -> Self {
        Self::Http {
            status,
            message: format!("HTTP error! status: {}", status.as_u16()),
        }
    }

    /// Returns the HTTP status for errors that carry one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthExpired => Some(StatusCode::UNAUTHORIZED),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the error forced the session to sign out.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: HTTP errors display the server-supplied message verbatim.
    #[test]
    fn test_http_error_display() {
        let err = SessionError::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "db down".to_string(),
        };
        assert_eq!(err.to_string(), "db down");
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    /// Test: generic HTTP error carries the numeric status.
    #[test]
    fn test_http_status_fallback() {
        let err = SessionError::http_status(StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "HTTP error! status: 502");
        assert!(!err.is_auth_expired());
    }
}
