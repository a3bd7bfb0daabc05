//! Story generation processor
//!
//! One job per book: a single vision call produces text for every story
//! page, parsed from a JSON object keyed by page number. A page missing
//! from the response is skipped with a warning; it is not fatal to the job.

use crate::ai::TextModel;
use crate::db::models::{BookStatus, TokenUsage};
use crate::db::{books, pages, DbPool};
use crate::error::{PipelineError, Result};
use crate::prompts;
use crate::queue::payload::StoryJob;
use crate::story;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Processes story generation jobs
pub struct StoryProcessor {
    text_model: Arc<dyn TextModel>,
}

impl StoryProcessor {
    pub fn new(text_model: Arc<dyn TextModel>) -> Self {
        Self { text_model }
    }

    /// Process one story job
    ///
    /// On any failure the book is marked FAILED (best effort) and the error
    /// re-raised so the queue retries per its policy.
    pub async fn process(&self, pool: &DbPool, job: &StoryJob) -> Result<()> {
        if job.story_pages.is_empty() {
            return Err(PipelineError::InvalidJob(
                "story job carries no story pages".to_string(),
            ));
        }

        info!(
            "Processing story generation for book {} ({} pages)",
            job.book_id,
            job.story_pages.len()
        );

        match self.run(pool, job).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Story generation failed for book {}: {}", job.book_id, e);
                if let Err(db_err) =
                    books::set_status(pool, job.book_id, BookStatus::Failed).await
                {
                    error!(
                        "Failed to mark book {} as FAILED: {}",
                        job.book_id, db_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(&self, pool: &DbPool, job: &StoryJob) -> Result<()> {
        // The trigger already flipped the book to GENERATING; re-assert
        // defensively since the write is idempotent.
        books::set_status(pool, job.book_id, BookStatus::Generating).await?;

        let parts = prompts::build_story_prompt(job);
        info!(
            "Calling text model for book {} with {} prompt parts",
            job.book_id,
            parts.len()
        );
        let completion = self
            .text_model
            .generate_story(prompts::story_system_prompt(), &parts)
            .await?;

        let story_pages = story::parse_story_response(&completion.text, job.is_winkify_enabled)?;
        info!(
            "Parsed story response for book {}: {} pages",
            job.book_id,
            story_pages.len()
        );

        let mut updated = 0usize;
        for page in &job.story_pages {
            let Some(page_text) = story_pages.get(&(page.page_number as u32)) else {
                warn!(
                    "No text in response for page {} of book {}, skipping update",
                    page.page_number, job.book_id
                );
                continue;
            };

            let notes = if job.is_winkify_enabled {
                page_text.illustration_notes.as_deref()
            } else {
                None
            };

            pages::apply_story_text(pool, page.page_id, &page_text.text, notes).await?;
            updated += 1;
        }

        if updated == 0 {
            warn!(
                "No pages of book {} matched the response keys",
                job.book_id
            );
        }

        let usage = TokenUsage {
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
            total_tokens: completion.total_tokens,
        };
        books::mark_story_completed(pool, job.book_id, usage).await?;

        info!(
            "Story generation completed for book {}: {}/{} pages updated",
            job.book_id,
            updated,
            job.story_pages.len()
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::StoryCompletion;
    use crate::prompts::MessagePart;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted text model returning a canned completion (or error)
    pub(crate) struct FakeTextModel {
        pub response: std::result::Result<String, String>,
        pub calls: Mutex<usize>,
    }

    impl FakeTextModel {
        pub fn returning(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl TextModel for FakeTextModel {
        async fn generate_story(
            &self,
            _system: &str,
            _parts: &[MessagePart],
        ) -> Result<StoryCompletion> {
            *self.calls.lock().unwrap() += 1;
            match &self.response {
                Ok(text) => Ok(StoryCompletion {
                    text: text.clone(),
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                }),
                Err(msg) => Err(PipelineError::StoryParseError(msg.clone())),
            }
        }
    }

    // End-to-end story processing (status transitions, per-page writes,
    // missing-key skips) needs page rows to exist - see tests/pipeline_db.rs.
}
