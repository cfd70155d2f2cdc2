//! Replication endpoints.

use super::json_body;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use std::time::Duration;
use tagindex_client::wire::{DuplicateReplicateRequest, ReplicateRequest};

/// POST /tags/{tag}/replicate
pub async fn replicate(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    payload: Result<Json<ReplicateRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let req = json_body(payload)?;
    state
        .tags
        .replicate(&tag, &req.digest, &req.dependencies)
        .await?;
    Ok(StatusCode::OK)
}

/// POST /tags/{tag}/duplicate-replicate
///
/// Sent by a peer replica; queues delayed tasks locally only.
pub async fn duplicate_replicate(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    payload: Result<Json<DuplicateReplicateRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let req = json_body(payload)?;
    state
        .tags
        .duplicate_replicate(
            &tag,
            &req.digest,
            &req.dependencies,
            Duration::from_millis(req.delay_ms),
        )
        .await?;
    Ok(StatusCode::OK)
}
