use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use std::time::Duration;

use crate::error::FetchError;

pub type BodyStream = BoxStream<'static, Result<Vec<u8>, FetchError>>;

/// Status and streaming body of a GET.
pub struct FetchResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

/// Shared network session used by every fetch of a batch.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Raw `Cookie` header of an authenticated browser session.
    pub cookie: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            user_agent: concat!("rmsync/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(10),
            cookie: None,
        }
    }
}

/// reqwest-backed session. Cloning shares the connection pool.
#[derive(Clone)]
pub struct HttpSession {
    client: Client,
}

impl HttpSession {
    pub fn new(options: &SessionOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &options.cookie {
            let mut value = HeaderValue::from_str(cookie).context("Invalid cookie header value")?;
            value.set_sensitive(true);
            headers.insert(header::COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(options.user_agent.as_str())
            .connect_timeout(options.connect_timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchClient for HttpSession {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(FetchError::from))
            .boxed();

        Ok(FetchResponse {
            status,
            content_length,
            body,
        })
    }
}
