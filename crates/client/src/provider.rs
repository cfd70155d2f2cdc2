//! Address-to-client resolution for replicas and remotes.

use crate::error::{ClientError, ClientResult};
use crate::http::HttpTagClient;
use crate::TagClient;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Hands out a [`TagClient`] for a peer address.
pub trait TagClientProvider: Send + Sync + 'static {
    fn provide(&self, addr: &str) -> ClientResult<Arc<dyn TagClient>>;
}

/// Provider of [`HttpTagClient`]s that share one connection pool.
///
/// Clients are built on first use and reused for the same address.
pub struct HttpTagClientProvider {
    http: reqwest::Client,
    clients: DashMap<String, Arc<HttpTagClient>>,
}

impl HttpTagClientProvider {
    /// Create a provider whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self {
            http,
            clients: DashMap::new(),
        })
    }
}

impl TagClientProvider for HttpTagClientProvider {
    fn provide(&self, addr: &str) -> ClientResult<Arc<dyn TagClient>> {
        if let Some(client) = self.clients.get(addr) {
            return Ok(client.clone());
        }
        let client = Arc::new(HttpTagClient::with_http(addr, self.http.clone())?);
        let client = self
            .clients
            .entry(addr.to_string())
            .or_insert(client)
            .clone();
        Ok(client)
    }
}

impl std::fmt::Debug for HttpTagClientProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTagClientProvider")
            .field("clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}
