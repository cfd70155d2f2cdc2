//! Client error types.

use thiserror::Error;

/// Errors returned by [`TagClient`](crate::TagClient) calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server has no binding for the tag.
    #[error("tag not found")]
    NotFound,

    /// The server answered with a non-success status.
    #[error("server error ({status}, {code}): {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },

    /// The request never produced a response (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
