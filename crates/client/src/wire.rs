//! Request and response bodies shared by the server and its clients.

use serde::{Deserialize, Serialize};
use tagindex_core::Digest;

/// Body of `PUT /tags/{tag}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutTagRequest {
    pub digest: Digest,
    /// Dependencies to replicate with the tag when `replicate` is set.
    #[serde(default)]
    pub dependencies: Vec<Digest>,
    /// Run replication after the tag is stored.
    #[serde(default)]
    pub replicate: bool,
}

/// Body of `POST /tags/{tag}/replicate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub digest: Digest,
    #[serde(default)]
    pub dependencies: Vec<Digest>,
}

/// Body of `POST /tags/{tag}/duplicate-replicate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateReplicateRequest {
    pub digest: Digest,
    #[serde(default)]
    pub dependencies: Vec<Digest>,
    /// Delay before the first replication attempt, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}

/// Error body returned by the server for every non-success status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Body of `GET /health`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error code the server uses for a missing tag.
pub const NOT_FOUND_CODE: &str = "not_found";
