//! Pipeline entry points
//!
//! The two user-facing triggers. Each validates ownership and
//! preconditions, flips the book status through a compare-and-set guard,
//! and only then enqueues work, so double-submits and stale UI retries
//! race on the status row instead of the queue.

use crate::db::models::{Book, BookStatus};
use crate::db::{books, pages, DbPool};
use crate::error::{PipelineError, Result};
use crate::queue::{
    FlowChild, FlowProducer, FinalizeJob, IllustrationJob, JobOptions, JobQueue, QueueName,
    JobPayload, StoryJob, StoryPageRef, StoryPromptContext,
};
use tracing::{error, info};
use uuid::Uuid;

async fn load_owned_book(pool: &DbPool, book_id: Uuid, user_id: &str) -> Result<Book> {
    books::get_book_for_user(pool, book_id, user_id)
        .await?
        .ok_or(PipelineError::BookNotFound(book_id))
}

/// Kick off story generation for a book
///
/// Accepted from DRAFT (first run) and FAILED (explicit user retry). The
/// DRAFT/FAILED -> GENERATING flip is conditional; losing the race means
/// another trigger got there first and this call reports the conflict
/// instead of double-enqueueing.
pub async fn enqueue_story_generation(
    pool: &DbPool,
    queue: &JobQueue,
    book_id: Uuid,
    user_id: &str,
) -> Result<i64> {
    let book = load_owned_book(pool, book_id, user_id).await?;

    let book_title = book
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| PipelineError::InvalidJob("book has no title".to_string()))?;
    let child_name = book
        .child_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| PipelineError::InvalidJob("book has no child name".to_string()))?;
    let art_style = book
        .art_style
        .clone()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| PipelineError::InvalidJob("book has no art style".to_string()))?;

    let status = book.pipeline_status();
    if !matches!(status, BookStatus::Draft | BookStatus::Failed) {
        return Err(PipelineError::InvalidTransition {
            book_id,
            detail: format!(
                "story generation requires DRAFT or FAILED, book is {}",
                status.as_str()
            ),
        });
    }

    let story_pages = pages::list_story_pages(pool, book_id, book.cover_asset_id).await?;
    if story_pages.is_empty() {
        return Err(PipelineError::InvalidJob(
            "book has no story pages".to_string(),
        ));
    }

    // Story numbering is positional over the cover-excluded list, not the
    // stored page_number, so a removed cover never leaves a gap.
    let story_pages: Vec<StoryPageRef> = story_pages
        .iter()
        .enumerate()
        .map(|(index, page)| StoryPageRef {
            page_id: page.id,
            page_number: index as i32 + 1,
            asset_id: page.asset_id,
            original_image_url: page.original_image_url.clone(),
        })
        .collect();

    let flipped = books::transition_status(
        pool,
        book_id,
        &[BookStatus::Draft, BookStatus::Failed],
        BookStatus::Generating,
    )
    .await?;
    if !flipped {
        return Err(PipelineError::InvalidTransition {
            book_id,
            detail: "book status changed while starting story generation".to_string(),
        });
    }

    let payload = JobPayload::StoryGeneration(StoryJob {
        book_id,
        user_id: user_id.to_string(),
        prompt_context: StoryPromptContext {
            book_title,
            child_name,
            art_style: Some(art_style),
        },
        story_pages,
        is_winkify_enabled: book.is_winkify_enabled,
    });

    let enqueued = queue
        .enqueue(
            QueueName::StoryGeneration,
            &format!("story-{}", book_id),
            &payload,
            &JobOptions::with_retries(),
        )
        .await;
    let job_id = match enqueued {
        Ok(id) => id,
        Err(e) => {
            // The book is GENERATING but no job exists; undo the flip so
            // the trigger stays retryable. Conditional, to leave any
            // concurrent worker write alone.
            if let Err(revert_err) = books::transition_status(
                pool,
                book_id,
                &[BookStatus::Generating],
                BookStatus::Failed,
            )
            .await
            {
                error!(
                    "Failed to revert book {} after enqueue error: {}",
                    book_id, revert_err
                );
            }
            return Err(e);
        }
    };

    info!(
        "Story generation enqueued for book {} as job {}",
        book_id, job_id
    );
    Ok(job_id)
}

/// Kick off illustration generation for every page of a book
///
/// Builds one atomic flow: a finalize parent waiting on one illustration
/// child per page. Children never fail the parent; a terminally failed
/// child is pruned from the wait-set so finalization always runs and can
/// judge the book from whatever the pages actually recorded.
pub async fn enqueue_illustration_flow(
    pool: &DbPool,
    flow: &FlowProducer,
    book_id: Uuid,
    user_id: &str,
) -> Result<i64> {
    let book = load_owned_book(pool, book_id, user_id).await?;

    let status = book.pipeline_status();
    if status != BookStatus::Completed {
        return Err(PipelineError::InvalidTransition {
            book_id,
            detail: format!(
                "illustration requires a COMPLETED story, book is {}",
                status.as_str()
            ),
        });
    }

    let book_pages = pages::list_pages(pool, book_id).await?;
    if book_pages.is_empty() {
        return Err(PipelineError::InvalidJob(
            "book has no pages to illustrate".to_string(),
        ));
    }

    let flipped = books::transition_status(
        pool,
        book_id,
        &[BookStatus::Completed],
        BookStatus::Illustrating,
    )
    .await?;
    if !flipped {
        return Err(PipelineError::InvalidTransition {
            book_id,
            detail: "book status changed while starting illustration".to_string(),
        });
    }

    let child_opts = JobOptions {
        remove_dependency_on_failure: true,
        fail_parent_on_failure: false,
        ..JobOptions::with_retries()
    };

    let children: Vec<FlowChild> = book_pages
        .iter()
        .map(|page| FlowChild {
            queue: QueueName::IllustrationGeneration,
            name: format!("illustrate-{}-p{}", book_id, page.page_number),
            payload: JobPayload::IllustrationGeneration(IllustrationJob {
                user_id: user_id.to_string(),
                book_id,
                page_id: page.id,
                page_number: page.page_number,
                text: page.text.clone(),
                art_style: book.art_style.clone(),
                book_title: book.title.clone(),
                is_title_page: page.page_index == 0,
                illustration_notes: page.illustration_notes.clone(),
                original_image_url: page.original_image_url.clone(),
                is_winkify_enabled: book.is_winkify_enabled,
            }),
            opts: child_opts.clone(),
        })
        .collect();

    let parent_payload = JobPayload::BookFinalize(FinalizeJob {
        book_id,
        user_id: user_id.to_string(),
    });

    let parent_id = flow
        .add_flow(
            QueueName::BookFinalize,
            &format!("finalize-book-{}", book_id),
            &parent_payload,
            &JobOptions::with_retries(),
            &children,
        )
        .await?;

    info!(
        "Illustration flow enqueued for book {}: parent job {} with {} pages",
        book_id,
        parent_id,
        children.len()
    );
    Ok(parent_id)
}
