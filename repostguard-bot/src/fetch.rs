//! Image fetch collaborator and decoding.
//!
//! Fetch timeouts are this collaborator's responsibility; the pipeline sees
//! a timeout as an ordinary fetch failure and skips the item.

use std::time::Duration;

use async_trait::async_trait;
use image::GrayImage;
use reqwest::Client;

use crate::stream::Submission;

/// Extensions accepted as direct image links.
pub const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Pick the URL to fingerprint: the posted link when it is a direct image
/// link, otherwise the source-supplied thumbnail.
pub fn resolve_image_url(submission: &Submission) -> &str {
    let lowered = submission.url.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        &submission.url
    } else {
        &submission.thumbnail_url
    }
}

/// Fetch faults. Always item-scoped: log and skip.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetch returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Decode faults. Also item-scoped.
#[derive(Debug, thiserror::Error)]
#[error("image decode failed: {0}")]
pub struct DecodeError(#[from] image::ImageError);

/// Downloads a URL into raw bytes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpMediaFetcher {
    client: Client,
}

impl HttpMediaFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Decode raw bytes into a single-channel luminance buffer.
pub fn decode_luma(bytes: &[u8]) -> Result<GrayImage, DecodeError> {
    Ok(image::load_from_memory(bytes)?.to_luma8())
}
