//! Read-through cache of resolved tags.

use crate::metrics;
use crate::singleflight::SingleFlight;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tagindex_core::Digest;

/// Why a tag could not be loaded. Cloneable so every waiter on a shared
/// load receives the same error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("tag not found: {0}")]
    NotFound(String),

    #[error("backend download failed: {0}")]
    Upstream(String),

    #[error("stored digest for {tag} is invalid: {reason}")]
    Corrupt { tag: String, reason: String },
}

/// Positive-only tag cache with single-flight loading.
///
/// Entries never expire. A miss is loaded at most once concurrently per tag;
/// failures are returned to every waiter and are not remembered. Writes go
/// through [`invalidate`](Self::invalidate), so the next read of a rewritten
/// tag downloads the new binding.
#[derive(Default)]
pub struct TagCache {
    entries: Arc<DashMap<String, Digest>>,
    /// Bumped by every invalidation. A load only caches its result if the
    /// tag's generation is unchanged since the load started.
    generations: Arc<DashMap<String, u64>>,
    loads: SingleFlight<String, Digest, LoadError>,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any cached or in-flight value for `tag`.
    pub fn invalidate(&self, tag: &str) {
        let mut generation = self.generations.entry(tag.to_string()).or_insert(0);
        *generation += 1;
        self.entries.remove(tag);
        drop(generation);
        self.loads.forget(&tag.to_string());
    }

    pub fn peek(&self, tag: &str) -> Option<Digest> {
        self.entries.get(tag).map(|d| d.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn generation(&self, tag: &str) -> u64 {
        self.generations.get(tag).map_or(0, |g| *g)
    }

    /// Return the cached digest for `tag`, or run `load` to fetch it.
    ///
    /// A load that overlaps an [`invalidate`](Self::invalidate) still returns
    /// its value to its waiters but leaves the cache empty.
    pub async fn get_or_load<F, Fut>(&self, tag: &str, load: F) -> Result<Digest, LoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Digest, LoadError>> + Send + 'static,
    {
        if let Some(digest) = self.peek(tag) {
            metrics::CACHE_HITS.inc();
            return Ok(digest);
        }
        metrics::CACHE_MISSES.inc();

        let entries = self.entries.clone();
        let generations = self.generations.clone();
        let started = self.generation(tag);
        let key = tag.to_string();
        self.loads
            .run(tag.to_string(), move || {
                let fetch = load();
                async move {
                    let digest = fetch.await?;
                    // Held across the insert so an invalidation cannot interleave.
                    let current = generations.entry(key.clone()).or_insert(0);
                    if *current == started {
                        entries.insert(key, digest.clone());
                    }
                    drop(current);
                    Ok(digest)
                }
            })
            .await
    }
}
