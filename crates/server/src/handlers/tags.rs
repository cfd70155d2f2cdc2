//! Tag read and write endpoints.

use super::json_body;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tagindex_client::wire::PutTagRequest;

/// PUT /tags/{tag}
pub async fn put_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    payload: Result<Json<PutTagRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let req = json_body(payload)?;
    if req.replicate {
        state
            .tags
            .put_and_replicate(&tag, &req.digest, &req.dependencies)
            .await?;
    } else {
        state.tags.put(&tag, &req.digest).await?;
    }
    Ok(StatusCode::OK)
}

/// GET /tags/{tag}
///
/// Responds with the digest's canonical string as plain text.
pub async fn get_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<String> {
    let digest = state.tags.get(&tag).await?;
    Ok(digest.to_string())
}

/// HEAD /tags/{tag}
pub async fn has_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<StatusCode> {
    if state.tags.has(&tag).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
