//! HTTP request handlers.

pub mod health;
pub mod replication;
pub mod tags;

pub use health::*;
pub use replication::*;
pub use tags::*;

use crate::error::{ApiError, ApiResult};
use axum::Json;
use axum::extract::rejection::JsonRejection;

/// Unwrap a JSON body, reporting malformed input as `bad_request`.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}
