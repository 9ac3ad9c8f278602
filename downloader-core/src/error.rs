//! Shared error types for the Archive Client and the handler layer.

use thiserror::Error;

/// Outcomes the Archive Client's typed fetches can return beyond a plain
/// success (spec §4.1). Deliberately not a transport-level error type: HTTP
/// 429 and "missing root element" are folded into `RateLimited` at the
/// client boundary rather than left as exceptions for callers to classify
/// (spec §9 "Exceptions for control flow at the HTTP boundary").
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error("rate limited")]
    RateLimited,

    #[error("authentication required")]
    AuthRequired,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("user does not exist")]
    UserDoesNotExist,

    #[error("{0}")]
    Other(String),
}

impl ClientError {
    pub fn other(message: impl Into<String>) -> Self {
        ClientError::Other(message.into())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(source: reqwest::Error) -> Self {
        if source.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            ClientError::RateLimited
        } else {
            ClientError::Other(source.to_string())
        }
    }
}
