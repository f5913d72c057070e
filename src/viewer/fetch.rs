//! Asset retrieval for the decode pipelines.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Source of stored asset bytes, addressed by stable URL.
///
/// The paginated pipeline relies on [`fetch_range`] for cheap incremental
/// access; implementations without real range support may return the full
/// body and let the caller truncate.
///
/// [`fetch_range`]: AssetSource::fetch_range
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fetch the complete asset.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Fetch the inclusive byte range `start..=end` of the asset.
    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<Vec<u8>>;
}

/// HTTP asset source backed by reqwest.
pub struct HttpAssetSource {
    client: Client,
    base: Option<Url>,
}

impl HttpAssetSource {
    /// Build a source, optionally resolving relative locators against a base URL.
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("bookshelf-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base = match base_url {
            Some(raw) => Some(
                Url::parse(raw)
                    .map_err(|e| AppError::Config(format!("Invalid base URL {}: {}", raw, e)))?,
            ),
            None => None,
        };

        Ok(Self { client, base })
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        match &self.base {
            // Url::join keeps absolute inputs absolute, so full URLs pass
            // through unchanged.
            Some(base) => base
                .join(url)
                .map_err(|e| AppError::Load(format!("Invalid asset URL {}: {}", url, e))),
            None => Url::parse(url)
                .map_err(|e| AppError::Load(format!("Invalid asset URL {}: {}", url, e))),
        }
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.resolve(url)?;
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let url = self.resolve(url)?;
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await?;
        response.error_for_status_ref()?;

        let full_body = response.status() != StatusCode::PARTIAL_CONTENT;
        let mut body = response.bytes().await?.to_vec();

        if full_body {
            // Transport ignored the range request; trim to what was asked for.
            let len = (end - start + 1) as usize;
            let skip = start as usize;
            body = body.into_iter().skip(skip).take(len).collect();
        }

        Ok(body)
    }
}
