//! API error types.

use crate::cache::LoadError;
use crate::replication::ReplicationError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tagindex_client::wire::ErrorResponse;
use tagindex_storage::StorageError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("tag not found: {0}")]
    NotFound(String),

    /// No registered namespace matches the tag.
    #[error("no backend registered for tag: {0}")]
    BackendUnresolved(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid input: {0}")]
    Core(#[from] tagindex_core::Error),

    /// The storage backend failed for a reason other than a missing tag.
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("replication submission failed: {0}")]
    ReplicationSubmission(#[from] ReplicationError),

    #[error("local replica {addr} unreachable: {message}")]
    PeerUnreachable { addr: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BackendUnresolved(_) => "backend_unresolved",
            Self::BadRequest(_) | Self::Core(_) => "bad_request",
            Self::Upstream(_) => "upstream_failure",
            Self::ReplicationSubmission(_) => "replication_submission_failure",
            Self::PeerUnreachable { .. } => "peer_unreachable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BackendUnresolved(_) | Self::BadRequest(_) | Self::Core(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Upstream(_) | Self::PeerUnreachable { .. } => StatusCode::BAD_GATEWAY,
            Self::ReplicationSubmission(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => Self::NotFound(name),
            StorageError::BackendUnresolved(tag) => Self::BackendUnresolved(tag),
            StorageError::InvalidKey(msg) => Self::BadRequest(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound(tag) => Self::NotFound(tag),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_table() {
        let cases = [
            (ApiError::NotFound("t".into()), 404, "not_found"),
            (
                ApiError::BackendUnresolved("t".into()),
                400,
                "backend_unresolved",
            ),
            (ApiError::BadRequest("x".into()), 400, "bad_request"),
            (ApiError::Upstream("x".into()), 502, "upstream_failure"),
            (
                ApiError::ReplicationSubmission(ReplicationError::Closed),
                503,
                "replication_submission_failure",
            ),
            (
                ApiError::PeerUnreachable {
                    addr: "peer".into(),
                    message: "refused".into(),
                },
                502,
                "peer_unreachable",
            ),
            (ApiError::Internal("x".into()), 500, "internal_error"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code().as_u16(), status, "{err}");
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_storage_error_mapping() {
        assert!(matches!(
            ApiError::from(StorageError::NotFound("t".into())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(StorageError::BackendUnresolved("t".into())),
            ApiError::BackendUnresolved(_)
        ));
        assert!(matches!(
            ApiError::from(StorageError::Io(std::io::Error::other("disk"))),
            ApiError::Upstream(_)
        ));
    }
}
