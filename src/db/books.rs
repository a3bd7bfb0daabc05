//! Book database operations

use crate::db::models::{Book, BookStatus, TokenUsage};
use crate::db::DbPool;
use crate::error::Result;
use uuid::Uuid;

/// Get a book by ID
pub async fn get_book(pool: &DbPool, book_id: Uuid) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
        .bind(book_id)
        .fetch_optional(pool)
        .await?;

    Ok(book)
}

/// Get a book by ID, scoped to its owner
pub async fn get_book_for_user(
    pool: &DbPool,
    book_id: Uuid,
    user_id: &str,
) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 AND user_id = $2")
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(book)
}

/// Set book status unconditionally
pub async fn set_status(pool: &DbPool, book_id: Uuid, status: BookStatus) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE books
        SET status = $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(book_id)
    .bind(status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Conditionally transition book status
///
/// Returns true if the row was updated, false if the book was no longer in
/// one of the expected states. This is the compare-and-set guard that keeps
/// concurrent edits from clobbering an in-flight pipeline transition.
pub async fn transition_status(
    pool: &DbPool,
    book_id: Uuid,
    expected: &[BookStatus],
    next: BookStatus,
) -> Result<bool> {
    let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();

    let result = sqlx::query(
        r#"
        UPDATE books
        SET status = $2,
            updated_at = NOW()
        WHERE id = $1
          AND status = ANY($3)
        "#,
    )
    .bind(book_id)
    .bind(next.as_str())
    .bind(&expected)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark story generation complete: terminal status plus token counters in
/// one statement.
pub async fn mark_story_completed(pool: &DbPool, book_id: Uuid, usage: TokenUsage) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE books
        SET status = $2,
            prompt_tokens = $3,
            completion_tokens = $4,
            total_tokens = $5,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(book_id)
    .bind(BookStatus::Completed.as_str())
    .bind(usage.prompt_tokens)
    .bind(usage.completion_tokens)
    .bind(usage.total_tokens)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    // Status transition behavior requires a database - see tests/pipeline_db.rs
}
