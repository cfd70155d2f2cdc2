//! Object storage abstraction and backends for tagindex.
//!
//! This crate provides:
//! - The [`BackendClient`] upload/download contract
//! - Backends: local filesystem, S3-compatible, and in-memory
//! - [`BackendRouter`], which picks a backend for a tag by namespace pattern

pub mod backends;
pub mod error;
pub mod namespace;
pub mod router;
pub mod traits;

pub use backends::{
    filesystem::FilesystemBackend,
    memory::MemoryBackend,
    s3::{S3Backend, S3Settings},
};
pub use error::{StorageError, StorageResult};
pub use namespace::NamespacePattern;
pub use router::{BackendRouter, BackendRouterBuilder};
pub use traits::BackendClient;

use std::sync::Arc;
use tagindex_core::config::{BackendConfig, StorageConfig};

/// Create a backend client from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BackendClient>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(S3Settings {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                region: region.clone(),
                prefix: prefix.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                force_path_style: *force_path_style,
            })
            .await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

/// Build a [`BackendRouter`] from the ordered backend registrations.
pub async fn router_from_config(backends: &[BackendConfig]) -> StorageResult<BackendRouter> {
    let mut builder = BackendRouter::builder();
    for backend in backends {
        let client = from_config(&backend.storage).await?;
        builder.register(&backend.namespace, client)?;
        tracing::info!(
            namespace = %backend.namespace,
            backend = client_name(&backend.storage),
            "Registered backend"
        );
    }
    Ok(builder.build())
}

fn client_name(config: &StorageConfig) -> &'static str {
    match config {
        StorageConfig::Filesystem { .. } => "filesystem",
        StorageConfig::S3 { .. } => "s3",
        StorageConfig::Memory => "memory",
    }
}
