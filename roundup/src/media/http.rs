//! Image candidates downloaded over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::StageError;
use crate::providers::ImageProvider;

/// Per-download timeout.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Finds image URLs for a keyword phrase.
#[async_trait]
pub trait ImageUrlSearch: Send + Sync {
    /// Returns up to `max_results` image URLs, best first.
    async fn image_urls(&self, keywords: &str, max_results: usize) -> Result<Vec<String>, StageError>;
}

/// Downloads candidate images found by an [`ImageUrlSearch`].
///
/// Candidates that fail to download, answer with a non-200 status or a
/// non-`image/*` content type are skipped rather than failing the stage.
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    search: Arc<dyn ImageUrlSearch>,
}

impl HttpImageFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    ///
    /// Returns a permanent error if the HTTP client cannot be built.
    pub fn new(search: Arc<dyn ImageUrlSearch>) -> Result<Self, StageError> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| StageError::permanent(format!("http client: {e}")))?;
        Ok(Self { client, search })
    }

    async fn download(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url, error = %e, "Image download failed");
                return None;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            tracing::debug!(url, status = response.status().as_u16(), "Skipping image candidate");
            return None;
        }
        let is_image = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("image/"));
        if !is_image {
            tracing::debug!(url, "Skipping non-image content type");
            return None;
        }
        response.bytes().await.ok().map(|b| b.to_vec())
    }
}

#[async_trait]
impl ImageProvider for HttpImageFetcher {
    async fn fetch_candidates(
        &self,
        keywords: &str,
        max_candidates: usize,
    ) -> Result<Vec<Vec<u8>>, StageError> {
        let urls = self.search.image_urls(keywords, max_candidates).await?;
        let mut candidates = Vec::new();
        for url in urls.iter().take(max_candidates) {
            if let Some(bytes) = self.download(url).await {
                candidates.push(bytes);
            }
        }
        Ok(candidates)
    }
}

impl std::fmt::Debug for HttpImageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpImageFetcher").finish_non_exhaustive()
    }
}
