//! reqwest-backed [`TagClient`].

use crate::error::{ClientError, ClientResult};
use crate::wire::{
    DuplicateReplicateRequest, ErrorResponse, NOT_FOUND_CODE, PutTagRequest, ReplicateRequest,
};
use crate::TagClient;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tagindex_core::Digest;
use tracing::instrument;

/// HTTP client for a single tag index instance.
#[derive(Clone, Debug)]
pub struct HttpTagClient {
    http: reqwest::Client,
    base_url: Url,
    addr: String,
}

impl HttpTagClient {
    /// Create a client for `addr` with its own connection pool.
    ///
    /// `addr` may be a full URL or a bare `host:port`, which is treated as
    /// plain HTTP.
    pub fn new(addr: &str) -> ClientResult<Self> {
        Self::with_http(addr, reqwest::Client::new())
    }

    /// Create a client for `addr` that shares an existing connection pool.
    pub fn with_http(addr: &str, http: reqwest::Client) -> ClientResult<Self> {
        let base_url = parse_base_url(addr)?;
        Ok(Self {
            http,
            base_url,
            addr: addr.to_string(),
        })
    }

    /// Build `<base>/<segments...>`, encoding each segment on its own so a
    /// tag containing `/` stays a single path segment.
    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidAddress(self.addr.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn tag_url(&self, tag: &str, action: Option<&str>) -> ClientResult<Url> {
        match action {
            Some(action) => self.url(&["tags", tag, action]),
            None => self.url(&["tags", tag]),
        }
    }

    async fn send_text(&self, req: reqwest::RequestBuilder) -> ClientResult<String> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }
        Ok(body)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> ClientResult<()> {
        self.send_text(req).await.map(|_| ())
    }

    async fn put_tag(&self, tag: &str, body: &PutTagRequest) -> ClientResult<()> {
        let url = self.tag_url(tag, None)?;
        self.send_empty(self.http.put(url).json(body)).await
    }
}

fn parse_base_url(addr: &str) -> ClientResult<Url> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(ClientError::InvalidAddress("empty address".to_string()));
    }
    let lower = addr.to_ascii_lowercase();
    let full = if lower.starts_with("http://") || lower.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    };
    let url = Url::parse(&full).map_err(|e| ClientError::InvalidAddress(format!("{addr}: {e}")))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ClientError::InvalidAddress(addr.to_string()));
    }
    Ok(url)
}

fn error_from_body(status: StatusCode, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) if status == StatusCode::NOT_FOUND && err.code == NOT_FOUND_CODE => {
            ClientError::NotFound
        }
        Ok(err) => ClientError::Server {
            status: status.as_u16(),
            code: err.code,
            message: err.message,
        },
        Err(_) => ClientError::Server {
            status: status.as_u16(),
            code: "unknown".to_string(),
            message: body.to_string(),
        },
    }
}

#[async_trait]
impl TagClient for HttpTagClient {
    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn put(&self, tag: &str, digest: &Digest) -> ClientResult<()> {
        self.put_tag(
            tag,
            &PutTagRequest {
                digest: digest.clone(),
                dependencies: Vec::new(),
                replicate: false,
            },
        )
        .await
    }

    #[instrument(skip(self, dependencies), fields(addr = %self.addr))]
    async fn put_and_replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
    ) -> ClientResult<()> {
        self.put_tag(
            tag,
            &PutTagRequest {
                digest: digest.clone(),
                dependencies: dependencies.to_vec(),
                replicate: true,
            },
        )
        .await
    }

    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn get(&self, tag: &str) -> ClientResult<Digest> {
        let url = self.tag_url(tag, None)?;
        let body = self.send_text(self.http.get(url)).await?;
        Digest::from_bytes(body.as_bytes())
            .map_err(|e| ClientError::InvalidResponse(format!("bad digest for {tag}: {e}")))
    }

    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn has(&self, tag: &str) -> ClientResult<bool> {
        let url = self.tag_url(tag, None)?;
        let response = self.http.head(url).send().await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(ClientError::Server {
                status: s.as_u16(),
                code: "unknown".to_string(),
                message: format!("HEAD /tags/{tag} failed"),
            }),
        }
    }

    #[instrument(skip(self, dependencies), fields(addr = %self.addr))]
    async fn replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
    ) -> ClientResult<()> {
        let url = self.tag_url(tag, Some("replicate"))?;
        let body = ReplicateRequest {
            digest: digest.clone(),
            dependencies: dependencies.to_vec(),
        };
        self.send_empty(self.http.post(url).json(&body)).await
    }

    #[instrument(skip(self, dependencies), fields(addr = %self.addr))]
    async fn duplicate_replicate(
        &self,
        tag: &str,
        digest: &Digest,
        dependencies: &[Digest],
        delay: Duration,
    ) -> ClientResult<()> {
        let url = self.tag_url(tag, Some("duplicate-replicate"))?;
        let body = DuplicateReplicateRequest {
            digest: digest.clone(),
            dependencies: dependencies.to_vec(),
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        };
        self.send_empty(self.http.post(url).json(&body)).await
    }

    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn origin(&self) -> ClientResult<String> {
        let url = self.url(&["origin"])?;
        let body = self.send_text(self.http.get(url)).await?;
        Ok(body.trim().to_string())
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}
