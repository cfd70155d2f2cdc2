//! Namespace-based backend routing.

use crate::error::{StorageError, StorageResult};
use crate::namespace::NamespacePattern;
use crate::traits::BackendClient;
use std::sync::Arc;

struct Route {
    pattern: NamespacePattern,
    client: Arc<dyn BackendClient>,
}

/// Collects backend registrations before the router is frozen.
#[derive(Default)]
pub struct BackendRouterBuilder {
    routes: Vec<Route>,
}

impl BackendRouterBuilder {
    /// Register `client` for tags matching `namespace`.
    ///
    /// Fails with [`StorageError::NamespaceConflict`] if the same pattern was
    /// already registered.
    pub fn register(
        &mut self,
        namespace: &str,
        client: Arc<dyn BackendClient>,
    ) -> StorageResult<&mut Self> {
        if self.routes.iter().any(|r| r.pattern.as_str() == namespace) {
            return Err(StorageError::NamespaceConflict(namespace.to_string()));
        }
        self.routes.push(Route {
            pattern: NamespacePattern::new(namespace)?,
            client,
        });
        Ok(self)
    }

    pub fn build(self) -> BackendRouter {
        BackendRouter {
            routes: self.routes,
        }
    }
}

/// Immutable map from namespace pattern to backend client.
///
/// When several patterns match a tag, the one registered first wins.
pub struct BackendRouter {
    routes: Vec<Route>,
}

impl BackendRouter {
    pub fn builder() -> BackendRouterBuilder {
        BackendRouterBuilder::default()
    }

    /// Resolve the backend responsible for `tag`.
    pub fn resolve(&self, tag: &str) -> StorageResult<Arc<dyn BackendClient>> {
        self.routes
            .iter()
            .find(|r| r.pattern.is_match(tag))
            .map(|r| r.client.clone())
            .ok_or_else(|| StorageError::BackendUnresolved(tag.to_string()))
    }

    /// Registered namespace patterns, in resolution order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.pattern.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run every backend's health check, failing on the first error.
    pub async fn health_check(&self) -> StorageResult<()> {
        for route in &self.routes {
            route.client.health_check().await.inspect_err(|e| {
                tracing::error!(
                    namespace = %route.pattern,
                    backend = route.client.backend_name(),
                    error = %e,
                    "Backend health check failed"
                );
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for BackendRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.routes
                    .iter()
                    .map(|r| (r.pattern.as_str(), r.client.backend_name())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use bytes::Bytes;

    #[test]
    fn test_duplicate_registration_conflicts() {
        let mut builder = BackendRouter::builder();
        builder
            .register("uber-usi/.*", Arc::new(MemoryBackend::new()))
            .unwrap();
        let err = builder
            .register("uber-usi/.*", Arc::new(MemoryBackend::new()))
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::NamespaceConflict(_)));
    }

    #[test]
    fn test_unmatched_tag_is_unresolved() {
        let mut builder = BackendRouter::builder();
        builder
            .register("uber-usi/.*", Arc::new(MemoryBackend::new()))
            .unwrap();
        let router = builder.build();

        let err = router.resolve("other/labrat").err().unwrap();
        assert!(matches!(err, StorageError::BackendUnresolved(_)));
    }

    #[tokio::test]
    async fn test_first_registered_match_wins() {
        let specific = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());

        let mut builder = BackendRouter::builder();
        builder.register("uber-usi/.*", specific.clone()).unwrap();
        builder.register(".*", fallback.clone()).unwrap();
        let router = builder.build();

        for tag in ["uber-usi/labrat", "uber-usi/other"] {
            router
                .resolve(tag)
                .unwrap()
                .upload(tag, Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        router
            .resolve("misc/thing")
            .unwrap()
            .upload("misc/thing", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert_eq!(specific.len(), 2);
        assert_eq!(fallback.len(), 1);
        assert_eq!(
            router.namespaces().collect::<Vec<_>>(),
            vec!["uber-usi/.*", ".*"]
        );
    }
}
