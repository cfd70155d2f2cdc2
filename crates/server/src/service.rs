//! Tag operations shared by the HTTP handlers.
//!
//! [`TagService`] composes the backend router, the read-through cache, the
//! remotes map, the replication queue and the local replica clients.

use crate::cache::{LoadError, TagCache};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::remotes::Remotes;
use crate::replication::{ReplicationTask, TaskManager};
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tagindex_client::TagClientProvider;
use tagindex_core::config::AppConfig;
use tagindex_core::{Digest, validate_tag};
use tagindex_storage::{BackendClient, BackendRouter, StorageError};

pub struct TagService {
    backends: BackendRouter,
    cache: TagCache,
    remotes: Remotes,
    tasks: Arc<dyn TaskManager>,
    replicas: Arc<dyn TagClientProvider>,
    local_replicas: Vec<String>,
    origin: String,
    stagger: Duration,
    best_effort_peers: bool,
}

impl TagService {
    pub fn new(
        config: &AppConfig,
        backends: BackendRouter,
        remotes: Remotes,
        tasks: Arc<dyn TaskManager>,
        replicas: Arc<dyn TagClientProvider>,
    ) -> Self {
        let advertise = config.server.advertise_addr.as_deref();
        let mut local_replicas: Vec<String> = Vec::new();
        for addr in &config.replication.local_replicas {
            if advertise.is_some_and(|own| same_addr(own, addr)) {
                tracing::debug!(replica = %addr, "Skipping own address in local replicas");
                continue;
            }
            if !local_replicas.iter().any(|a| same_addr(a, addr)) {
                local_replicas.push(addr.clone());
            }
        }

        Self {
            backends,
            cache: TagCache::new(),
            remotes,
            tasks,
            replicas,
            local_replicas,
            origin: config.server.origin.clone(),
            stagger: config.replication.duplicate_replicate_stagger(),
            best_effort_peers: config.replication.best_effort_peers,
        }
    }

    /// Local replicas that receive duplicate-replicate calls.
    pub fn local_replicas(&self) -> &[String] {
        &self.local_replicas
    }

    pub fn backends(&self) -> &BackendRouter {
        &self.backends
    }

    pub fn cache(&self) -> &TagCache {
        &self.cache
    }

    /// Bind `tag` to `digest` in the backend owning the tag's namespace.
    pub async fn put(&self, tag: &str, digest: &Digest) -> ApiResult<()> {
        validate_tag(tag)?;
        let backend = self.backends.resolve(tag)?;

        backend
            .upload(tag, Bytes::from(digest.to_string()))
            .await
            .map_err(|e| write_error(backend.as_ref(), e))?;
        self.cache.invalidate(tag);

        metrics::TAG_PUTS.inc();
        tracing::info!(tag = %tag, digest = %digest, "Tag stored");
        Ok(())
    }

    /// Put, then replicate. A replication failure does not undo the put.
    pub async fn put_and_replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
    ) -> ApiResult<()> {
        self.put(tag, digest).await?;
        self.replicate(tag, digest, dependencies).await
    }

    /// Resolve `tag`, serving from the cache when possible.
    pub async fn get(&self, tag: &str) -> ApiResult<Digest> {
        validate_tag(tag)?;
        metrics::TAG_GETS.inc();
        let backend = self.backends.resolve(tag)?;

        let name = tag.to_string();
        let digest = self
            .cache
            .get_or_load(tag, move || load_tag(backend, name))
            .await?;
        Ok(digest)
    }

    pub async fn has(&self, tag: &str) -> ApiResult<bool> {
        match self.get(tag).await {
            Ok(_) => Ok(true),
            Err(ApiError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Queue `tag` for every remote matching its namespace and ask each
    /// local replica to queue a staggered duplicate.
    ///
    /// Every remote and every replica is attempted. A submission error takes
    /// precedence over a peer error in the result.
    pub async fn replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
    ) -> ApiResult<()> {
        validate_tag(tag)?;
        let submitted = self.submit(tag, digest, dependencies, Duration::ZERO).await;
        let fanned_out = self.fan_out(tag, digest, dependencies).await;
        submitted?;
        fanned_out
    }

    /// Queue `tag` for every matching remote after `delay`. Never contacts
    /// other replicas.
    pub async fn duplicate_replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
        delay: Duration,
    ) -> ApiResult<()> {
        validate_tag(tag)?;
        self.submit(tag, digest, dependencies, delay).await
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    async fn submit(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
        delay: Duration,
    ) -> ApiResult<()> {
        let mut first_error = None;
        for remote in self.remotes.resolve(tag) {
            let task = ReplicationTask::new(tag, digest.clone(), dependencies.to_vec(), &remote)
                .with_delay(delay);
            if let Err(e) = self.tasks.add(task).await {
                tracing::error!(tag = %tag, remote = %remote, error = %e, "Failed to add replication task");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn fan_out(&self, tag: &str, digest: &Digest, dependencies: &[Digest]) -> ApiResult<()> {
        let calls = self.local_replicas.iter().map(|addr| async move {
            metrics::DUPLICATE_REPLICATE_CALLS.inc();
            let result = match self.replicas.provide(addr) {
                Ok(client) => {
                    client
                        .duplicate_replicate(tag, digest, dependencies, self.stagger)
                        .await
                }
                Err(e) => Err(e),
            };
            (addr, result)
        });

        let mut first_error = None;
        for (addr, result) in join_all(calls).await {
            if let Err(e) = result {
                metrics::DUPLICATE_REPLICATE_FAILURES.inc();
                tracing::warn!(
                    tag = %tag,
                    replica = %addr,
                    error = %e,
                    "Duplicate replicate to local replica failed"
                );
                if first_error.is_none() {
                    first_error = Some(ApiError::PeerUnreachable {
                        addr: addr.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        match first_error {
            Some(e) if !self.best_effort_peers => Err(e),
            _ => Ok(()),
        }
    }
}

async fn load_tag(backend: Arc<dyn BackendClient>, tag: String) -> Result<Digest, LoadError> {
    metrics::BACKEND_DOWNLOADS
        .with_label_values(&[backend.backend_name()])
        .inc();
    let data = backend.download(&tag).await.map_err(|e| match e {
        StorageError::NotFound(_) => LoadError::NotFound(tag.clone()),
        other => {
            metrics::BACKEND_ERRORS
                .with_label_values(&[backend.backend_name(), "download"])
                .inc();
            LoadError::Upstream(other.to_string())
        }
    })?;
    Digest::from_bytes(&data).map_err(|e| LoadError::Corrupt {
        tag: tag.clone(),
        reason: e.to_string(),
    })
}

fn write_error(backend: &dyn BackendClient, err: StorageError) -> ApiError {
    match err {
        StorageError::InvalidKey(msg) => ApiError::BadRequest(msg),
        other => {
            metrics::BACKEND_ERRORS
                .with_label_values(&[backend.backend_name(), "upload"])
                .inc();
            ApiError::Upstream(other.to_string())
        }
    }
}

/// Compare peer addresses ignoring scheme and trailing slashes.
fn same_addr(a: &str, b: &str) -> bool {
    fn normalize(addr: &str) -> &str {
        let addr = addr.trim();
        let addr = addr
            .strip_prefix("http://")
            .or_else(|| addr.strip_prefix("https://"))
            .unwrap_or(addr);
        addr.trim_end_matches('/')
    }
    normalize(a).eq_ignore_ascii_case(normalize(b))
}
