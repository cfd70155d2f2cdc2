//! Client for the tagindex HTTP API.
//!
//! [`TagClient`] is the contract used by the CLI and by the server itself when
//! it talks to local replicas and remote clusters. [`HttpTagClient`] is the
//! reqwest implementation; [`TagClientProvider`] maps an address to a client.

pub mod error;
pub mod http;
pub mod provider;
pub mod wire;

pub use error::{ClientError, ClientResult};
pub use http::HttpTagClient;
pub use provider::{HttpTagClientProvider, TagClientProvider};

use async_trait::async_trait;
use std::time::Duration;
use tagindex_core::Digest;

/// Operations exposed by a tag index instance.
#[async_trait]
pub trait TagClient: Send + Sync {
    /// Bind `tag` to `digest` without replicating.
    async fn put(&self, tag: &str, digest: &Digest) -> ClientResult<()>;

    /// Bind `tag` to `digest`, then replicate it with its dependencies.
    async fn put_and_replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
    ) -> ClientResult<()>;

    /// Resolve `tag`. Returns [`ClientError::NotFound`] for unknown tags.
    async fn get(&self, tag: &str) -> ClientResult<Digest>;

    /// Whether `tag` has a binding.
    async fn has(&self, tag: &str) -> ClientResult<bool>;

    /// Replicate `tag` to remotes and stagger duplicates across local replicas.
    async fn replicate(&self, tag: &str, digest: &Digest, dependencies: &[Digest])
    -> ClientResult<()>;

    /// Schedule a delayed replication task on this instance only.
    async fn duplicate_replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
        delay: Duration,
    ) -> ClientResult<()>;

    /// Origin identifier of the instance.
    async fn origin(&self) -> ClientResult<String>;

    /// Address this client talks to.
    fn addr(&self) -> &str;
}
