//! Text-generation model client for story writing

use crate::error::{PipelineError, Result};
use crate::prompts::MessagePart;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use tracing::debug;

/// Default story model
pub const DEFAULT_STORY_MODEL: &str = "gpt-4o";

const MAX_COMPLETION_TOKENS: u32 = 1500;
const STORY_TEMPERATURE: f32 = 0.7;

/// Completion text plus token usage
#[derive(Debug, Clone)]
pub struct StoryCompletion {
    pub text: String,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
}

/// Text-completion call: system prompt plus a structured multi-part user
/// message, returning a JSON-string completion.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate_story(&self, system: &str, parts: &[MessagePart]) -> Result<StoryCompletion>;
}

/// OpenAI chat-completions client
pub struct OpenAiTextModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTextModel {
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    /// Create client from OPENAI_API_KEY
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::ConfigError("OPENAI_API_KEY not set".to_string()))?;

        Ok(Self::new(&api_key, DEFAULT_STORY_MODEL))
    }
}

#[async_trait]
impl TextModel for OpenAiTextModel {
    async fn generate_story(&self, system: &str, parts: &[MessagePart]) -> Result<StoryCompletion> {
        let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        for part in parts {
            match part {
                MessagePart::Text { text } => {
                    content_parts.push(
                        ChatCompletionRequestMessageContentPartTextArgs::default()
                            .text(text.clone())
                            .build()?
                            .into(),
                    );
                }
                MessagePart::ImageUrl { url } => {
                    content_parts.push(
                        ChatCompletionRequestMessageContentPartImageArgs::default()
                            .image_url(
                                ImageUrlArgs::default()
                                    .url(url.clone())
                                    .detail(ImageDetail::High)
                                    .build()?,
                            )
                            .build()?
                            .into(),
                    );
                }
            }
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(MAX_COMPLETION_TOKENS)
            .temperature(STORY_TEMPERATURE)
            .response_format(ResponseFormat::JsonObject)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(content_parts)
                    .build()?
                    .into(),
            ])
            .build()?;

        debug!("Calling {} with {} message parts", self.model, parts.len());
        let response = self.client.chat().create(request).await?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or(PipelineError::EmptyCompletion)?;

        let usage = response.usage;
        Ok(StoryCompletion {
            text,
            prompt_tokens: usage.as_ref().map(|u| u.prompt_tokens as i32).unwrap_or(0),
            completion_tokens: usage
                .as_ref()
                .map(|u| u.completion_tokens as i32)
                .unwrap_or(0),
            total_tokens: usage.as_ref().map(|u| u.total_tokens as i32).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    // Live completion calls require an API key; the story processor is
    // covered with a scripted TextModel fake in worker/story.rs.
}
