use thiserror::Error;

use crate::auth::CredentialError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Authentication required - no credential is stored")]
    AuthenticationRequired,

    #[error("Login rejected: {0}")]
    InvalidCredentials(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Credential could not be stored: {0}")]
    SessionPersist(String),

    #[error("Failed to fetch profile: {0}")]
    ProfileFetch(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] CredentialError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ClientError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        ClientError::Http {
            status,
            body: Self::truncate_body(body),
        }
    }

    /// Whether this error indicates the session itself is gone, as opposed
    /// to a transient or endpoint-local failure.
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, ClientError::SessionExpired(_))
    }
}
