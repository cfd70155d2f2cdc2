//! Hand-written recording doubles for the server's collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tagindex_client::{ClientError, ClientResult, TagClient, TagClientProvider};
use tagindex_core::Digest;
use tagindex_server::replication::{ReplicationError, ReplicationResult, ReplicationTask, TaskManager};
use tagindex_storage::{BackendClient, MemoryBackend, StorageError, StorageResult};

/// In-memory backend that counts downloads and can be made slow or failing.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingBackend {
    inner: MemoryBackend,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    download_delay: Mutex<Option<Duration>>,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock().unwrap() = Some(delay);
    }

    /// Make every operation fail with an I/O error.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Store raw bytes without going through the server.
    pub async fn seed(&self, name: &str, data: &[u8]) {
        self.inner
            .upload(name, Bytes::copy_from_slice(data))
            .await
            .unwrap();
    }

    pub async fn stored(&self, name: &str) -> Option<String> {
        self.inner
            .download(name)
            .await
            .ok()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
    }

    fn check_failing(&self) -> StorageResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("backend unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendClient for RecordingBackend {
    async fn upload(&self, name: &str, data: Bytes) -> StorageResult<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.inner.upload(name, data).await
    }

    async fn download(&self, name: &str) -> StorageResult<Bytes> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failing()?;
        self.inner.download(name).await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

/// Task manager that records submitted tasks instead of running them.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockTaskManager {
    tasks: Mutex<Vec<ReplicationTask>>,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl MockTaskManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tasks(&self) -> Vec<ReplicationTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskManager for MockTaskManager {
    async fn add(&self, task: ReplicationTask) -> ReplicationResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReplicationError::Closed);
        }
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

/// A call observed by [`MockTagClient`].
#[allow(dead_code)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientCall {
    Put {
        tag: String,
        digest: Digest,
    },
    Get {
        tag: String,
    },
    DuplicateReplicate {
        tag: String,
        digest: Digest,
        dependencies: Vec<Digest>,
        delay: Duration,
    },
}

/// Tag client double backed by a map; records every call.
#[allow(dead_code)]
pub struct MockTagClient {
    addr: String,
    tags: Mutex<HashMap<String, Digest>>,
    calls: Mutex<Vec<ClientCall>>,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl MockTagClient {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            tags: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn insert(&self, tag: &str, digest: Digest) {
        self.tags.lock().unwrap().insert(tag.to_string(), digest);
    }

    pub fn lookup(&self, tag: &str) -> Option<Digest> {
        self.tags.lock().unwrap().get(tag).cloned()
    }

    fn record(&self, call: ClientCall) -> ClientResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Server {
                status: 503,
                code: "unavailable".to_string(),
                message: format!("{} is down", self.addr),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TagClient for MockTagClient {
    async fn put(&self, tag: &str, digest: &Digest) -> ClientResult<()> {
        self.record(ClientCall::Put {
            tag: tag.to_string(),
            digest: digest.clone(),
        })?;
        self.insert(tag, digest.clone());
        Ok(())
    }

    async fn put_and_replicate(
        &self,
        tag: &str,
        digest: &Digest,
        _dependencies: &[Digest],
    ) -> ClientResult<()> {
        self.put(tag, digest).await
    }

    async fn get(&self, tag: &str) -> ClientResult<Digest> {
        self.record(ClientCall::Get {
            tag: tag.to_string(),
        })?;
        self.lookup(tag).ok_or(ClientError::NotFound)
    }

    async fn has(&self, tag: &str) -> ClientResult<bool> {
        Ok(self.lookup(tag).is_some())
    }

    async fn replicate(
        &self,
        _tag: &str,
        _digest: &Digest,
        _dependencies: &[Digest],
    ) -> ClientResult<()> {
        Ok(())
    }

    async fn duplicate_replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
        delay: Duration,
    ) -> ClientResult<()> {
        self.record(ClientCall::DuplicateReplicate {
            tag: tag.to_string(),
            digest: digest.clone(),
            dependencies: dependencies.to_vec(),
            delay,
        })
    }

    async fn origin(&self) -> ClientResult<String> {
        Ok(String::new())
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

/// Provider handing out one [`MockTagClient`] per address.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockTagClientProvider {
    clients: Mutex<HashMap<String, Arc<MockTagClient>>>,
}

#[allow(dead_code)]
impl MockTagClientProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The client for `addr`, created on first use.
    pub fn client(&self, addr: &str) -> Arc<MockTagClient> {
        self.clients
            .lock()
            .unwrap()
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(MockTagClient::new(addr)))
            .clone()
    }

    /// Addresses that were handed a client, sorted.
    pub fn addresses(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.clients.lock().unwrap().keys().cloned().collect();
        addrs.sort();
        addrs
    }
}

impl TagClientProvider for MockTagClientProvider {
    fn provide(&self, addr: &str) -> ClientResult<Arc<dyn TagClient>> {
        Ok(self.client(addr))
    }
}
