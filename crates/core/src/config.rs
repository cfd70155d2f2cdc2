//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origin identifier returned by `GET /origin`. Clients treat it as the
    /// authoritative source for blobs referenced by this deployment.
    #[serde(default)]
    pub origin: String,
    /// Address other replicas use to reach this instance.
    /// Local replica entries equal to this address are skipped during fan-out.
    #[serde(default)]
    pub advertise_addr: Option<String>,
    /// Upper bound on the time spent handling a single request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            origin: String::new(),
            advertise_addr: None,
            request_timeout_secs: default_request_timeout_secs(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("server.request_timeout_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        access_key_id: Option<String>,
        /// AWS secret access key.
        secret_access_key: Option<String>,
        /// Force path-style URLs. Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
    /// Process-local memory. Contents are lost on restart; intended for tests
    /// and single-node experiments.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/tags"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// A backend registration: tags matching `namespace` are stored in `storage`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Namespace pattern (regular expression matched against the whole tag).
    pub namespace: String,
    /// Storage backend for this namespace.
    pub storage: StorageConfig,
}

/// A remote registration: tags matching `namespace` replicate to `addresses`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Namespace pattern (regular expression matched against the whole tag).
    pub namespace: String,
    /// Remote tag index addresses, in replication order.
    pub addresses: Vec<String>,
}

/// Replication configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Addresses of the other instances of this deployment.
    #[serde(default)]
    pub local_replicas: Vec<String>,
    /// Delay local replicas apply to the duplicate tasks they schedule.
    #[serde(default = "default_duplicate_replicate_stagger_secs")]
    pub duplicate_replicate_stagger_secs: u64,
    /// Keep going when a local replica rejects a duplicate-replicate call
    /// instead of failing the replicate request (default: false).
    #[serde(default)]
    pub best_effort_peers: bool,
    /// Maximum number of replication tasks executing at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Attempts after the first before a task is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential retry backoff, in milliseconds.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Cap on the retry backoff, in milliseconds.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// Interval between attempts once a task has used up `max_retries`.
    /// Such tasks are marked failed but keep running until delivered.
    #[serde(default = "default_failed_retry_interval_secs")]
    pub failed_retry_interval_secs: u64,
    /// Path of the JSON task store. Tasks are kept in memory when unset.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Timeout for calls to remotes and local replicas.
    #[serde(default = "default_client_timeout_secs")]
    pub client_timeout_secs: u64,
}

fn default_duplicate_replicate_stagger_secs() -> u64 {
    20 * 60
}

fn default_max_workers() -> usize {
    8
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_retry_max_ms() -> u64 {
    5 * 60 * 1000
}

fn default_failed_retry_interval_secs() -> u64 {
    5 * 60
}

fn default_client_timeout_secs() -> u64 {
    30
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            local_replicas: Vec::new(),
            duplicate_replicate_stagger_secs: default_duplicate_replicate_stagger_secs(),
            best_effort_peers: false,
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            failed_retry_interval_secs: default_failed_retry_interval_secs(),
            store_path: None,
            client_timeout_secs: default_client_timeout_secs(),
        }
    }
}

impl ReplicationConfig {
    pub fn duplicate_replicate_stagger(&self) -> Duration {
        Duration::from_secs(self.duplicate_replicate_stagger_secs)
    }

    pub fn failed_retry_interval(&self) -> Duration {
        Duration::from_secs(self.failed_retry_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("replication.max_workers cannot be 0".to_string());
        }
        if self.retry_base_ms == 0 {
            return Err("replication.retry_base_ms cannot be 0".to_string());
        }
        if self.retry_max_ms < self.retry_base_ms {
            return Err(format!(
                "replication.retry_max_ms ({}) is smaller than retry_base_ms ({})",
                self.retry_max_ms, self.retry_base_ms
            ));
        }
        if self.failed_retry_interval_secs == 0 {
            return Err("replication.failed_retry_interval_secs cannot be 0".to_string());
        }
        if self.client_timeout_secs == 0 {
            return Err("replication.client_timeout_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Backend registrations, in resolution order.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    /// Remote registrations.
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
    /// Replication configuration.
    #[serde(default)]
    pub replication: ReplicationConfig,
}

impl AppConfig {
    /// Create a test configuration with a single in-memory backend matching
    /// every tag.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                origin: "test-origin".to_string(),
                ..Default::default()
            },
            backends: vec![BackendConfig {
                namespace: ".*".to_string(),
                storage: StorageConfig::Memory,
            }],
            remotes: Vec::new(),
            replication: ReplicationConfig::default(),
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.replication.validate()?;

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.namespace.as_str()) {
                return Err(format!(
                    "backend namespace registered twice: {}",
                    backend.namespace
                ));
            }
            backend
                .storage
                .validate()
                .map_err(|e| format!("backend {}: {e}", backend.namespace))?;
        }

        for remote in &self.remotes {
            if remote.addresses.iter().any(|a| a.trim().is_empty()) {
                return Err(format!(
                    "remote namespace {} has an empty address",
                    remote.namespace
                ));
            }
        }

        Ok(())
    }
}
