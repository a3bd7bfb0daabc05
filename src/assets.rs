//! Asset storage
//!
//! Generated illustrations are uploaded under a deterministic per-page key
//! with overwrite semantics, so a retried job re-uploads to the same place
//! instead of leaking duplicates.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Upload parameters
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub folder: String,
    pub public_id: String,
    pub tags: Vec<String>,
}

/// Stored asset reference
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub secure_url: String,
}

/// Asset store the illustration worker uploads into
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload_image(&self, bytes: &[u8], opts: &UploadOptions) -> Result<UploadedAsset>;
}

#[derive(Debug, Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: Option<String>,
    error: Option<CloudinaryError>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryError {
    message: String,
}

/// Cloudinary unsigned-preset uploader
#[derive(Debug, Clone)]
pub struct CloudinaryStore {
    client: reqwest::Client,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryStore {
    pub fn new(cloud_name: &str, upload_preset: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            cloud_name: cloud_name.to_string(),
            upload_preset: upload_preset.to_string(),
        })
    }

    /// Create from CLOUDINARY_CLOUD_NAME / CLOUDINARY_UPLOAD_PRESET
    pub fn from_env() -> Result<Self> {
        let cloud_name = std::env::var("CLOUDINARY_CLOUD_NAME")
            .map_err(|_| PipelineError::ConfigError("CLOUDINARY_CLOUD_NAME not set".to_string()))?;
        let upload_preset = std::env::var("CLOUDINARY_UPLOAD_PRESET").map_err(|_| {
            PipelineError::ConfigError("CLOUDINARY_UPLOAD_PRESET not set".to_string())
        })?;

        Self::new(&cloud_name, &upload_preset)
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        )
    }
}

#[async_trait]
impl AssetStore for CloudinaryStore {
    async fn upload_image(&self, bytes: &[u8], opts: &UploadOptions) -> Result<UploadedAsset> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(format!("{}.png", opts.public_id))
            .mime_str("image/png")
            .map_err(|e| PipelineError::UploadError(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", opts.folder.clone())
            .text("public_id", opts.public_id.clone())
            .text("overwrite", "true")
            .text("tags", opts.tags.join(","));

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::UploadError(e.to_string()))?;

        let status = response.status();
        let body: CloudinaryUploadResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::UploadError(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(PipelineError::UploadError(error.message));
        }

        body.secure_url
            .map(|secure_url| UploadedAsset { secure_url })
            .ok_or_else(|| {
                PipelineError::UploadError(format!(
                    "upload response ({}) did not contain a secure URL",
                    status
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_url_embeds_cloud_name() {
        let store = CloudinaryStore::new("demo-cloud", "preset").unwrap();
        assert_eq!(
            store.upload_url(),
            "https://api.cloudinary.com/v1_1/demo-cloud/image/upload"
        );
    }
}
