//! Illustration generation processor
//!
//! One job per page, fully independent of sibling pages. Source-image
//! fetch failures fail the job (retryable); everything downstream of the
//! fetches (model refusal, model error, upload failure) collapses to a
//! terminal FLAGGED outcome on the page so the book can still finalize
//! with partial results.

use crate::assets::{AssetStore, UploadOptions};
use crate::db::models::ModerationStatus;
use crate::db::{pages, DbPool};
use crate::error::{PipelineError, Result};
use crate::fetch::ImageFetcher;
use crate::prompts::{self, IllustrationPromptOptions};
use crate::queue::payload::IllustrationJob;
use crate::styles;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Terminal per-page outcome of one illustration job
#[derive(Debug, Clone, PartialEq)]
pub struct IllustrationOutcome {
    pub generated_image_url: Option<String>,
    pub status: ModerationStatus,
    pub reason: Option<String>,
}

impl IllustrationOutcome {
    fn ok(url: String) -> Self {
        Self {
            generated_image_url: Some(url),
            status: ModerationStatus::Ok,
            reason: None,
        }
    }

    fn blocked(reason: String) -> Self {
        Self {
            generated_image_url: None,
            status: ModerationStatus::Flagged,
            reason: Some(reason),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == ModerationStatus::Flagged
    }
}

/// Processes illustration generation jobs
pub struct IllustrationProcessor {
    fetcher: Arc<dyn ImageFetcher>,
    image_model: Arc<dyn crate::ai::ImageModel>,
    asset_store: Arc<dyn AssetStore>,
}

impl IllustrationProcessor {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        image_model: Arc<dyn crate::ai::ImageModel>,
        asset_store: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            fetcher,
            image_model,
            asset_store,
        }
    }

    /// Process one illustration job
    ///
    /// Any error escaping the run (fetch failure, outcome-write failure)
    /// leaves a best-effort FAILED marker on the page, then re-raises for
    /// the queue's retry policy. The marker write happens here and nowhere
    /// else, so one job execution records at most one failure.
    pub async fn process(&self, pool: &DbPool, job: &IllustrationJob) -> Result<()> {
        info!(
            "Processing illustration for book {} page {} (page_id {})",
            job.book_id, job.page_number, job.page_id
        );

        match self.run(pool, job).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    "Illustration job failed for page {} of book {}: {}",
                    job.page_number, job.book_id, e
                );
                if let Err(db_err) =
                    pages::mark_page_failed(pool, job.page_id, &e.to_string()).await
                {
                    error!(
                        "Failed to record FAILED marker on page {}: {}",
                        job.page_id, db_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(&self, pool: &DbPool, job: &IllustrationJob) -> Result<()> {
        let outcome = self.generate(job).await?;

        if let Some(reason) = &outcome.reason {
            warn!(
                "Page {} of book {} flagged: {}",
                job.page_number, job.book_id, reason
            );
        }

        // The authoritative terminal write; losing it would leave the
        // pipeline state inconsistent, so failures escalate.
        pages::record_illustration_outcome(pool, job.page_id, &outcome).await?;

        info!(
            "Page {} of book {} recorded as {}",
            job.page_number,
            job.book_id,
            outcome.status.as_str()
        );
        Ok(())
    }

    /// Run generation for one page without touching the store
    ///
    /// Errors are only returned for steps with nothing meaningful to
    /// record: missing/unfetchable source material. Every later failure
    /// becomes a blocked outcome.
    pub async fn generate(&self, job: &IllustrationJob) -> Result<IllustrationOutcome> {
        // Step A: content source image.
        let original_url = job.original_image_url.as_deref().ok_or_else(|| {
            PipelineError::InvalidJob(format!(
                "page {} has no original image URL",
                job.page_id
            ))
        })?;
        let content_image = self.fetcher.fetch(original_url).await?;

        // Step B: style reference image.
        let style_key = job.art_style.as_deref().ok_or_else(|| {
            PipelineError::InvalidJob(format!("book {} has no art style set", job.book_id))
        })?;
        let style = styles::resolve(style_key)?;
        let style_image = self.fetcher.fetch(style.reference_image_url).await?;

        // Step C: prompt.
        let prompt = prompts::build_illustration_prompt(&IllustrationPromptOptions {
            style,
            page_text: job.text.as_deref(),
            book_title: job.book_title.as_deref(),
            is_title_page: job.is_title_page,
            illustration_notes: job.illustration_notes.as_deref(),
            is_winkify_enabled: job.is_winkify_enabled,
        });

        // Step D: model call. A refusal (no payload) and a thrown API error
        // both downgrade to blocked.
        let generated = match self
            .image_model
            .edit_image(&[content_image, style_image], &prompt)
            .await
        {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Ok(IllustrationOutcome::blocked(
                    "Image generation failed or blocked by content policy.".to_string(),
                ));
            }
            Err(e) => {
                return Ok(IllustrationOutcome::blocked(e.to_string()));
            }
        };

        // Step E: upload under the deterministic per-page key; retries
        // overwrite the same asset.
        let upload = UploadOptions {
            folder: format!("storybook/{}/generated", job.book_id),
            public_id: format!("page_{}", job.page_number),
            tags: vec![
                format!("book:{}", job.book_id),
                format!("page:{}", job.page_id),
                format!("pageNum:{}", job.page_number),
            ],
        };
        match self.asset_store.upload_image(&generated, &upload).await {
            Ok(asset) => Ok(IllustrationOutcome::ok(asset.secure_url)),
            Err(e) => Ok(IllustrationOutcome::blocked(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::UploadedAsset;
    use crate::fetch::FetchedImage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeFetcher {
        fail_urls: Vec<String>,
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage> {
            if self.fail_urls.iter().any(|f| url.contains(f.as_str())) {
                return Err(PipelineError::HttpStatusError {
                    url: url.to_string(),
                    status: 404,
                });
            }
            Ok(FetchedImage {
                bytes: vec![1, 2, 3],
                mime_type: "image/jpeg".to_string(),
            })
        }
    }

    enum ModelScript {
        Image(Vec<u8>),
        NoPayload,
        ApiError(String),
    }

    struct FakeImageModel {
        script: ModelScript,
    }

    #[async_trait]
    impl crate::ai::ImageModel for FakeImageModel {
        async fn edit_image(
            &self,
            images: &[FetchedImage],
            _prompt: &str,
        ) -> Result<Option<Vec<u8>>> {
            assert_eq!(images.len(), 2, "content + style reference expected");
            match &self.script {
                ModelScript::Image(bytes) => Ok(Some(bytes.clone())),
                ModelScript::NoPayload => Ok(None),
                ModelScript::ApiError(msg) => {
                    Err(PipelineError::ImageModelError(msg.clone()))
                }
            }
        }
    }

    struct FakeAssetStore {
        fail: bool,
        uploads: Mutex<Vec<UploadOptions>>,
    }

    #[async_trait]
    impl AssetStore for FakeAssetStore {
        async fn upload_image(
            &self,
            _bytes: &[u8],
            opts: &UploadOptions,
        ) -> Result<UploadedAsset> {
            self.uploads.lock().unwrap().push(opts.clone());
            if self.fail {
                return Err(PipelineError::UploadError("disk full".to_string()));
            }
            Ok(UploadedAsset {
                secure_url: format!("https://cdn.test/{}/{}.png", opts.folder, opts.public_id),
            })
        }
    }

    fn job() -> IllustrationJob {
        IllustrationJob {
            user_id: "user_1".to_string(),
            book_id: Uuid::new_v4(),
            page_id: Uuid::new_v4(),
            page_number: 3,
            text: Some("Splash! Maya jumps in.".to_string()),
            art_style: Some("watercolor".to_string()),
            book_title: Some("Maya at the Beach".to_string()),
            is_title_page: false,
            illustration_notes: None,
            original_image_url: Some("https://img.test/p3.jpg".to_string()),
            is_winkify_enabled: false,
        }
    }

    fn processor(script: ModelScript, upload_fails: bool) -> IllustrationProcessor {
        IllustrationProcessor::new(
            Arc::new(FakeFetcher { fail_urls: vec![] }),
            Arc::new(FakeImageModel { script }),
            Arc::new(FakeAssetStore {
                fail: upload_fails,
                uploads: Mutex::new(vec![]),
            }),
        )
    }

    #[tokio::test]
    async fn test_successful_generation() {
        let p = processor(ModelScript::Image(vec![9, 9]), false);
        let outcome = p.generate(&job()).await.unwrap();

        assert_eq!(outcome.status, ModerationStatus::Ok);
        assert!(outcome
            .generated_image_url
            .as_deref()
            .unwrap()
            .contains("page_3"));
        assert_eq!(outcome.reason, None);
    }

    #[tokio::test]
    async fn test_no_payload_is_blocked_not_error() {
        let p = processor(ModelScript::NoPayload, false);
        let outcome = p.generate(&job()).await.unwrap();

        assert!(outcome.is_blocked());
        assert_eq!(outcome.generated_image_url, None);
        assert!(outcome.reason.unwrap().contains("content policy"));
    }

    #[tokio::test]
    async fn test_model_error_is_blocked_with_reason() {
        let p = processor(ModelScript::ApiError("429 rate limited".to_string()), false);
        let outcome = p.generate(&job()).await.unwrap();

        assert!(outcome.is_blocked());
        assert!(outcome.reason.unwrap().contains("429 rate limited"));
    }

    #[tokio::test]
    async fn test_upload_failure_is_blocked() {
        // Late-stage failure; still a well-defined terminal page state.
        let p = processor(ModelScript::Image(vec![9]), true);
        let outcome = p.generate(&job()).await.unwrap();

        assert!(outcome.is_blocked());
        assert_eq!(outcome.generated_image_url, None);
        assert!(outcome.reason.unwrap().contains("upload failed"));
    }

    #[tokio::test]
    async fn test_missing_source_image_fails_job() {
        let p = processor(ModelScript::Image(vec![9]), false);
        let mut job = job();
        job.original_image_url = None;

        assert!(p.generate(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_unfetchable_source_image_fails_job() {
        let p = IllustrationProcessor::new(
            Arc::new(FakeFetcher {
                fail_urls: vec!["img.test".to_string()],
            }),
            Arc::new(FakeImageModel {
                script: ModelScript::Image(vec![9]),
            }),
            Arc::new(FakeAssetStore {
                fail: false,
                uploads: Mutex::new(vec![]),
            }),
        );

        assert!(p.generate(&job()).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_style_fails_job() {
        let p = processor(ModelScript::Image(vec![9]), false);
        let mut job = job();
        job.art_style = Some("oilPainting".to_string());

        assert!(matches!(
            p.generate(&job).await,
            Err(PipelineError::UnknownStyle(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_key_is_deterministic() {
        let store = Arc::new(FakeAssetStore {
            fail: false,
            uploads: Mutex::new(vec![]),
        });
        let p = IllustrationProcessor::new(
            Arc::new(FakeFetcher { fail_urls: vec![] }),
            Arc::new(FakeImageModel {
                script: ModelScript::Image(vec![9]),
            }),
            store.clone(),
        );

        let job = job();
        p.generate(&job).await.unwrap();
        p.generate(&job).await.unwrap();

        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 2);
        // A retried job writes the same key; the store overwrites in place.
        assert_eq!(uploads[0].public_id, uploads[1].public_id);
        assert_eq!(uploads[0].folder, uploads[1].folder);
    }
}
