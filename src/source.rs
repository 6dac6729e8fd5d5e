use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::{FetchError, Result};

/// Something tiles can be downloaded from.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetches the complete body behind `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Fetches tiles over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Builds the HTTP client. `None` disables the request timeout.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.append(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                "tile-cache-downloader/",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let client = builder.default_headers(headers).build()?;

        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TileSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }
}
