use crate::error::{DownloadError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tracing::debug;
use url::Url;

pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Where artifacts come from: a size probe plus a streamed body.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// `Ok(None)` when the resource answers but reports no usable length.
    async fn probe_size(&self, locator: &str) -> Result<Option<u64>>;

    async fn open_stream(&self, locator: &str) -> Result<ChunkStream>;
}

pub struct HttpSource {
    client: Client,
    base_url: Option<Url>,
}

impl HttpSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    pub fn builder() -> HttpSourceBuilder {
        HttpSourceBuilder::default()
    }

    /// Relative locators such as `/sample-app.apk` resolve against this URL.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn resolve(&self, locator: &str) -> Result<Url> {
        match Url::parse(locator) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .as_ref()
                .ok_or_else(|| DownloadError::InvalidLocator(format!("{} (no base URL)", locator)))?
                .join(locator)
                .map_err(|e| DownloadError::InvalidLocator(format!("{}: {}", locator, e))),
            Err(e) => Err(DownloadError::InvalidLocator(format!("{}: {}", locator, e))),
        }
    }
}

#[async_trait]
impl ArtifactSource for HttpSource {
    async fn probe_size(&self, locator: &str) -> Result<Option<u64>> {
        let url = self
            .resolve(locator)
            .map_err(|e| DownloadError::MetadataUnavailable(e.to_string()))?;

        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| DownloadError::MetadataUnavailable(format!("HEAD request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DownloadError::MetadataUnavailable(format!(
                "HEAD returned {}",
                response.status()
            )));
        }

        let total_bytes = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        debug!(locator, ?total_bytes, "size probe answered");
        Ok(total_bytes)
    }

    async fn open_stream(&self, locator: &str) -> Result<ChunkStream> {
        let url = self.resolve(locator)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| DownloadError::TransferFailed(e.to_string()))
            .boxed())
    }
}

#[derive(Default)]
pub struct HttpSourceBuilder {
    base_url: Option<Url>,
    proxy: Option<String>,
}

impl HttpSourceBuilder {
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn build(self) -> Result<HttpSource> {
        let mut client_builder = Client::builder();

        if let Some(proxy_url) = &self.proxy {
            client_builder = client_builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }

        let mut source = HttpSource::new(client_builder.build()?);
        source.base_url = self.base_url;
        Ok(source)
    }
}
