//! Server test utilities.

use super::fixtures::{LOCAL_REPLICA, ORIGIN, REMOTE};
use super::mocks::{MockTagClientProvider, MockTaskManager, RecordingBackend};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tagindex_core::config::{AppConfig, BackendConfig, RemoteConfig, StorageConfig};
use tagindex_server::remotes::Remotes;
use tagindex_server::{AppState, TagService, create_router};
use tagindex_storage::BackendRouter;
use tower::ServiceExt;

/// A router wired to recording doubles.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub backend: Arc<RecordingBackend>,
    pub tasks: Arc<MockTaskManager>,
    pub replicas: Arc<MockTagClientProvider>,
}

/// Configuration for the replication scenario: tags under `uber-usi/`
/// replicate to one remote and one local replica with a 20 minute stagger.
#[allow(dead_code)]
pub fn scenario_config() -> AppConfig {
    let mut config = AppConfig::for_testing();
    config.server.origin = ORIGIN.to_string();
    config.backends = vec![BackendConfig {
        namespace: "uber-usi/.*".to_string(),
        storage: StorageConfig::Memory,
    }];
    config.remotes = vec![RemoteConfig {
        namespace: "uber-usi/.*".to_string(),
        addresses: vec![REMOTE.to_string()],
    }];
    config.replication.local_replicas = vec![LOCAL_REPLICA.to_string()];
    config.replication.duplicate_replicate_stagger_secs = 20 * 60;
    config
}

#[allow(dead_code)]
impl TestServer {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a test server with custom config modifications.
    ///
    /// Every configured backend namespace is served by the same
    /// [`RecordingBackend`].
    pub fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        tagindex_server::metrics::register_metrics();

        let mut config = scenario_config();
        modifier(&mut config);

        let backend = RecordingBackend::new();
        let mut builder = BackendRouter::builder();
        for registration in &config.backends {
            builder
                .register(&registration.namespace, backend.clone())
                .expect("Failed to register backend");
        }

        let remotes = Remotes::from_config(&config.remotes).expect("Invalid remotes");
        let tasks = MockTaskManager::new();
        let replicas = MockTagClientProvider::new();

        let service = TagService::new(
            &config,
            builder.build(),
            remotes,
            tasks.clone(),
            replicas.clone(),
        );
        let state = AppState::new(config, service);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            backend,
            tasks,
            replicas,
        }
    }

    /// Send a request and return the status and the body as text.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let request = builder.body(body).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body_bytes.to_vec()).unwrap())
    }

    /// Send a request and parse the body as JSON (`Null` when empty).
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, text) = self.request(method, uri, body).await;
        let json = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

/// Serve `router` on an ephemeral localhost port and return its base URL.
#[allow(dead_code)]
pub async fn spawn_router(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Test server failed");
    });
    format!("http://{addr}")
}
