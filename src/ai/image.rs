//! Image-generation model client
//!
//! Wraps the OpenAI images/edits endpoint: reference images plus a text
//! prompt in, at most one output image out. A response with no image
//! payload is reported as `Ok(None)` so the caller can record a blocked
//! outcome instead of retrying a generation the model refused.

use crate::error::{PipelineError, Result};
use crate::fetch::FetchedImage;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Default illustration model
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const IMAGE_SIZE: &str = "1024x1024";

/// Image-edit call: reference images plus prompt, zero or one output image
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn edit_image(&self, images: &[FetchedImage], prompt: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Deserialize)]
struct ImageEditResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

/// OpenAI images/edits client
pub struct OpenAiImageModel {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiImageModel {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Create client from OPENAI_API_KEY
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::ConfigError("OPENAI_API_KEY not set".to_string()))?;

        Self::new(&api_key, DEFAULT_IMAGE_MODEL)
    }
}

#[async_trait]
impl ImageModel for OpenAiImageModel {
    async fn edit_image(&self, images: &[FetchedImage], prompt: &str) -> Result<Option<Vec<u8>>> {
        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("prompt", prompt.to_string())
            .text("n", "1")
            .text("size", IMAGE_SIZE);

        for (index, image) in images.iter().enumerate() {
            let part = reqwest::multipart::Part::bytes(image.bytes.clone())
                .file_name(format!("input_{}.{}", index, image.extension()))
                .mime_str(&image.mime_type)
                .map_err(|e| PipelineError::ImageModelError(e.to_string()))?;
            form = form.part("image[]", part);
        }

        debug!(
            "Calling {} images/edits with {} reference images, prompt {} chars",
            self.model,
            images.len(),
            prompt.len()
        );

        let response = self
            .client
            .post(format!("{}/images/edits", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::ImageModelError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ImageModelError(format!(
                "images/edits returned {}: {}",
                status, body
            )));
        }

        let body: ImageEditResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ImageModelError(e.to_string()))?;

        let Some(b64) = body.data.into_iter().next().and_then(|d| d.b64_json) else {
            warn!("images/edits response contained no image payload");
            return Ok(None);
        };

        let bytes = BASE64
            .decode(b64.as_bytes())
            .map_err(|e| PipelineError::ImageModelError(format!("invalid base64 payload: {}", e)))?;

        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_data_deserializes() {
        let body: ImageEditResponse = serde_json::from_str("{}").unwrap();
        assert!(body.data.is_empty());
    }

    #[test]
    fn test_b64_payload_deserializes() {
        let body: ImageEditResponse =
            serde_json::from_str(r#"{"data": [{"b64_json": "aGk="}]}"#).unwrap();
        assert_eq!(body.data[0].b64_json.as_deref(), Some("aGk="));
    }
}
