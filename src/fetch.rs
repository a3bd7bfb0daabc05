//! Image fetching

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Fetched image bytes plus mime type
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl FetchedImage {
    /// File extension matching the mime type, for upload naming
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            _ => "jpg",
        }
    }
}

/// Source/style image fetcher
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

/// HTTP fetcher over a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| PipelineError::FetchError {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::HttpStatusError {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .map(|v| v.to_string())
            .unwrap_or_else(|| infer_mime_from_url(url));

        let bytes = response
            .bytes()
            .await
            .map_err(|source| PipelineError::FetchError {
                url: url.to_string(),
                source,
            })?
            .to_vec();

        Ok(FetchedImage { bytes, mime_type })
    }
}

/// Fall back to the URL extension when the server sends no usable
/// content-type; jpeg is the default.
fn infer_mime_from_url(url: &str) -> String {
    let extension = url
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_mime_from_url() {
        assert_eq!(infer_mime_from_url("https://x.test/a.png"), "image/png");
        assert_eq!(infer_mime_from_url("https://x.test/a.JPG"), "image/jpeg");
        assert_eq!(infer_mime_from_url("https://x.test/a"), "image/jpeg");
    }

    #[test]
    fn test_extension_matches_mime() {
        let image = FetchedImage {
            bytes: vec![],
            mime_type: "image/png".to_string(),
        };
        assert_eq!(image.extension(), "png");
    }
}
