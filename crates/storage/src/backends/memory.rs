//! In-memory storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::BackendClient;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

/// Process-local backend backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: DashMap<String, Bytes>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn upload(&self, name: &str, data: Bytes) -> StorageResult<()> {
        self.objects.insert(name.to_string(), data);
        Ok(())
    }

    async fn download(&self, name: &str) -> StorageResult<Bytes> {
        self.objects
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
