//! Error types for storybook-builder

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to fetch image: {url}")]
    FetchError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for URL: {url}")]
    HttpStatusError { url: String, status: u16 },

    #[error("Unknown art style: {0}")]
    UnknownStyle(String),

    #[error("Text model returned an empty response")]
    EmptyCompletion,

    #[error("Failed to parse or validate story response: {0}")]
    StoryParseError(String),

    #[error("Image model error: {0}")]
    ImageModelError(String),

    #[error("Asset upload failed: {0}")]
    UploadError(String),

    #[error("Invalid job payload: {0}")]
    InvalidJob(String),

    #[error("Book not found or access denied: {0}")]
    BookNotFound(uuid::Uuid),

    #[error("Invalid status transition for book {book_id}: {detail}")]
    InvalidTransition { book_id: uuid::Uuid, detail: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("OpenAI API error: {0}")]
    OpenAiError(#[from] async_openai::error::OpenAIError),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job timeout")]
    JobTimeout,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
