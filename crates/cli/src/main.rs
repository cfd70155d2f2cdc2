//! Command-line client for tagindex.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tagindex_client::wire::HealthResponse;
use tagindex_client::{ClientError, HttpTagClient, TagClient};
use tagindex_core::Digest;

#[derive(Parser)]
#[command(name = "tagindexctl")]
#[command(about = "Command-line client for the tagindex tag server")]
#[command(version)]
struct Cli {
    /// Server URL or host:port
    #[arg(long, env = "TAGINDEXCTL_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind a tag to a digest
    Put {
        tag: String,
        digest: Digest,
        /// Dependency digest (repeatable); only used with --replicate
        #[arg(long = "dep")]
        dependencies: Vec<Digest>,
        /// Replicate to remotes after the put succeeds
        #[arg(long)]
        replicate: bool,
    },
    /// Print the digest a tag is bound to
    Get { tag: String },
    /// Check whether a tag exists
    Has { tag: String },
    /// Replicate an existing binding to remotes and local replicas
    Replicate {
        tag: String,
        digest: Digest,
        /// Dependency digest (repeatable)
        #[arg(long = "dep")]
        dependencies: Vec<Digest>,
    },
    /// Print the server's origin identifier
    Origin,
    /// Check server health and version
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { server, command } = Cli::parse();
    let client = HttpTagClient::new(&server)
        .with_context(|| format!("invalid server address: {server}"))?;

    match command {
        Commands::Put {
            tag,
            digest,
            dependencies,
            replicate,
        } => handle_put(&client, &tag, &digest, &dependencies, replicate).await,
        Commands::Get { tag } => handle_get(&client, &tag).await,
        Commands::Has { tag } => handle_has(&client, &tag).await,
        Commands::Replicate {
            tag,
            digest,
            dependencies,
        } => {
            client
                .replicate(&tag, &digest, &dependencies)
                .await
                .with_context(|| format!("replicate {tag} failed"))?;
            println!("Replicated {tag} -> {digest}");
            Ok(())
        }
        Commands::Origin => {
            let origin = client.origin().await.context("origin request failed")?;
            println!("{origin}");
            Ok(())
        }
        Commands::Health => handle_health(&server).await,
    }
}

async fn handle_put(
    client: &HttpTagClient,
    tag: &str,
    digest: &Digest,
    dependencies: &[Digest],
    replicate: bool,
) -> Result<()> {
    if replicate {
        client
            .put_and_replicate(tag, digest, dependencies)
            .await
            .with_context(|| format!("put {tag} failed"))?;
        println!("Put {tag} -> {digest} (replicated)");
    } else {
        if !dependencies.is_empty() {
            eprintln!("Warning: --dep is ignored without --replicate");
        }
        client
            .put(tag, digest)
            .await
            .with_context(|| format!("put {tag} failed"))?;
        println!("Put {tag} -> {digest}");
    }
    Ok(())
}

async fn handle_get(client: &HttpTagClient, tag: &str) -> Result<()> {
    match client.get(tag).await {
        Ok(digest) => {
            println!("{digest}");
            Ok(())
        }
        Err(ClientError::NotFound) => anyhow::bail!("tag not found: {tag}"),
        Err(e) => Err(e).with_context(|| format!("get {tag} failed")),
    }
}

async fn handle_has(client: &HttpTagClient, tag: &str) -> Result<()> {
    let found = client
        .has(tag)
        .await
        .with_context(|| format!("has {tag} failed"))?;
    if found {
        println!("{tag}: present");
        Ok(())
    } else {
        println!("{tag}: absent");
        std::process::exit(1);
    }
}

async fn handle_health(server: &str) -> Result<()> {
    let base_url = normalize_base_url(server);
    let response = reqwest::Client::new()
        .get(format!("{base_url}/health"))
        .send()
        .await
        .context("health request failed")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("health check failed ({status}): {body}");
    }

    let health: HealthResponse = response.json().await?;
    println!("Status: {}", health.status);
    println!("Server version: {}", health.version);
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));
    if health.version != env!("CARGO_PKG_VERSION") {
        eprintln!(
            "Warning: version mismatch (server: {}, client: {})",
            health.version,
            env!("CARGO_PKG_VERSION")
        );
    }
    Ok(())
}

fn normalize_base_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else {
        format!("http://{server}")
    }
}
