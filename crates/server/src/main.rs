//! Tag index server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tagindex_client::{HttpTagClientProvider, TagClientProvider};
use tagindex_core::config::{AppConfig, ReplicationConfig};
use tagindex_server::remotes::Remotes;
use tagindex_server::replication::{
    FileTaskStore, ManagerSettings, MemoryTaskStore, RemoteExecutor, ReplicationManager,
    TaskStore,
};
use tagindex_server::{AppState, TagService, create_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// tagindexd - tag to digest index with replication
#[derive(Parser, Debug)]
#[command(name = "tagindexd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "TAGINDEX_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from the optional TOML file and `TAGINDEX_` variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    let has_config_file = std::path::Path::new(path).exists();

    if has_config_file {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("TAGINDEX_") && key != "TAGINDEX_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: tagindexd --config /path/to/config.toml\n  \
             2. Environment variables: TAGINDEX_SERVER__BIND=0.0.0.0:8080 tagindexd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set TAGINDEX_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("TAGINDEX_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn build_task_store(config: &ReplicationConfig) -> Result<Arc<dyn TaskStore>> {
    match &config.store_path {
        Some(path) => {
            let store = FileTaskStore::open(path)
                .await
                .with_context(|| format!("failed to open task store {}", path.display()))?;
            tracing::info!(path = %path.display(), "Using file task store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("No replication.store_path configured, pending tasks are lost on restart");
            Ok(Arc::new(MemoryTaskStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("tagindexd v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    tagindex_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let backends = tagindex_storage::router_from_config(&config.backends)
        .await
        .context("failed to initialize storage backends")?;
    if backends.is_empty() {
        tracing::warn!("No backends configured, every tag request will be rejected");
    }
    backends
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backends = backends.len(), "Storage backends verified");

    let remotes = Remotes::from_config(&config.remotes).context("invalid remotes configuration")?;
    if remotes.is_empty() {
        tracing::warn!("No remotes configured, replicate only fans out to local replicas");
    }

    let provider: Arc<dyn TagClientProvider> = Arc::new(
        HttpTagClientProvider::new(config.replication.client_timeout())
            .context("failed to build replica client")?,
    );

    let store = build_task_store(&config.replication).await?;
    let manager = ReplicationManager::new(
        store,
        Arc::new(RemoteExecutor::new(provider.clone())),
        ManagerSettings::from(&config.replication),
    );
    let recovered = manager
        .recover()
        .await
        .context("failed to recover replication tasks")?;
    tracing::info!(recovered, "Replication manager started");

    let tags = TagService::new(
        &config,
        backends,
        remotes,
        Arc::new(manager.clone()),
        provider,
    );
    tracing::info!(
        origin = %tags.origin(),
        local_replicas = ?tags.local_replicas(),
        "Tag service ready"
    );

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let app = create_router(AppState::new(config, tags));

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown();
    tracing::info!(pending = manager.pending_count(), "Replication manager stopped");
    Ok(())
}
