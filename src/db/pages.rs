//! Page database operations

use crate::db::models::{ModerationStatus, Page, PageModerationRow};
use crate::db::DbPool;
use crate::error::Result;
use crate::worker::illustration::IllustrationOutcome;
use uuid::Uuid;

/// List all pages of a book in display order
pub async fn list_pages(pool: &DbPool, book_id: Uuid) -> Result<Vec<Page>> {
    let pages = sqlx::query_as::<_, Page>(
        "SELECT * FROM pages WHERE book_id = $1 ORDER BY page_index ASC",
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(pages)
}

/// List the story pages of a book, excluding the designated cover page
///
/// The cover is the page whose asset matches the book's cover_asset_id; it
/// carries no story text and is skipped when numbering pages for the text
/// model.
pub async fn list_story_pages(
    pool: &DbPool,
    book_id: Uuid,
    cover_asset_id: Option<Uuid>,
) -> Result<Vec<Page>> {
    let pages = sqlx::query_as::<_, Page>(
        r#"
        SELECT * FROM pages
        WHERE book_id = $1
          AND ($2::uuid IS NULL OR asset_id IS DISTINCT FROM $2)
        ORDER BY page_index ASC
        "#,
    )
    .bind(book_id)
    .bind(cover_asset_id)
    .fetch_all(pool)
    .await?;

    Ok(pages)
}

/// Write generated story text onto a page
///
/// Resets text_confirmed so the user is forced to re-review regenerated
/// text. illustration_notes are only written when present (winkify mode).
pub async fn apply_story_text(
    pool: &DbPool,
    page_id: Uuid,
    text: &str,
    illustration_notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pages
        SET text = $2,
            text_confirmed = FALSE,
            illustration_notes = COALESCE($3, illustration_notes),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(page_id)
    .bind(text)
    .bind(illustration_notes)
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist the terminal outcome of an illustration job on its page row
///
/// This single write is the authoritative signal the finalize worker
/// aggregates over; callers escalate any failure here.
pub async fn record_illustration_outcome(
    pool: &DbPool,
    page_id: Uuid,
    outcome: &IllustrationOutcome,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pages
        SET generated_image_url = $2,
            moderation_status = $3,
            moderation_reason = $4,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(page_id)
    .bind(outcome.generated_image_url.as_deref())
    .bind(outcome.status.as_str())
    .bind(outcome.reason.as_deref())
    .execute(pool)
    .await?;

    Ok(())
}

/// Best-effort terminal FAILED marker for a page whose job errored out
///
/// Called from exactly one place (the illustration processor's outer error
/// path) so the real failure is never masked by redundant writes.
pub async fn mark_page_failed(pool: &DbPool, page_id: Uuid, reason: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pages
        SET generated_image_url = NULL,
            moderation_status = $2,
            moderation_reason = $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(page_id)
    .bind(ModerationStatus::Failed.as_str())
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fresh per-page moderation snapshot for finalization
///
/// Reloaded from the store rather than taken from job results: failed
/// children produce no result payload.
pub async fn moderation_snapshot(pool: &DbPool, book_id: Uuid) -> Result<Vec<PageModerationRow>> {
    let rows = sqlx::query_as::<_, PageModerationRow>(
        r#"
        SELECT id, page_number, generated_image_url, moderation_status
        FROM pages
        WHERE book_id = $1
        ORDER BY page_index ASC
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    // Row-level behavior requires a database - see tests/pipeline_db.rs
}
