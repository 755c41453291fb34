//! Thin upstream HTTP client behind a trait so the dispatch engine can
//! be exercised without a network.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use http::Method;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream transport: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err.to_string())
    }
}

#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Ask for a live body on success instead of buffering.
    pub stream: bool,
}

pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: UpstreamBody,
}

pub enum UpstreamBody {
    Buffered(Bytes),
    Stream(BoxStream<'static, Result<Bytes, UpstreamError>>),
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, req: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

pub struct HttpUpstreamClient {
    client: reqwest::Client,
}

impl HttpUpstreamClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn send(&self, req: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut builder = self.client.request(req.method, &req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }
        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // Error bodies are buffered regardless so the dispatch loop can
        // inspect and re-forward them.
        let body = if req.stream && (200..300).contains(&status) {
            UpstreamBody::Stream(resp.bytes_stream().map_err(UpstreamError::from).boxed())
        } else {
            UpstreamBody::Buffered(resp.bytes().await?)
        };
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
