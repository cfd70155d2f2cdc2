//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// A backend client: an opaque byte store keyed by name.
///
/// Implementations must report a missing object as
/// [`StorageError::NotFound`](crate::StorageError::NotFound) so callers can
/// tell "no such name" apart from a failed request.
#[async_trait]
pub trait BackendClient: Send + Sync + 'static {
    /// Store `data` under `name`, replacing any previous content atomically.
    async fn upload(&self, name: &str, data: Bytes) -> StorageResult<()>;

    /// Fetch the content stored under `name`.
    async fn download(&self, name: &str) -> StorageResult<Bytes>;

    /// Get the name of this storage backend (e.g., "s3", "filesystem").
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup so a misconfigured backend fails fast
    /// instead of on the first request. The default implementation returns
    /// Ok(()), suitable for backends without remote connectivity.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
