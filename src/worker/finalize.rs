//! Book finalization processor
//!
//! Runs once all illustration children of a book have settled. Pure
//! aggregation over the recorded page outcomes; it performs no model or
//! network calls, so re-running it against the same page rows always
//! produces the same book status.

use crate::db::models::{BookStatus, PageModerationRow};
use crate::db::{books, pages, DbPool};
use crate::error::Result;
use crate::queue::payload::FinalizeJob;
use tracing::{info, warn};

/// Resolve the final book status from the recorded page outcomes
///
/// A page only counts as successful when it is OK AND has a stored image
/// URL; an OK row without an image is as unusable as a failed one. Rules,
/// in order:
/// - no pages at all is a failure (nothing was ever illustrated)
/// - every page successful completes the book
/// - any successful or flagged page keeps the book partially usable
/// - otherwise every page failed outright
pub fn resolve_final_status(pages: &[PageModerationRow]) -> (BookStatus, Option<String>) {
    if pages.is_empty() {
        return (BookStatus::Failed, Some("No pages found".to_string()));
    }

    let usable = usable_count(pages);
    if usable == pages.len() {
        return (BookStatus::Completed, None);
    }

    let flagged = pages
        .iter()
        .filter(|p| p.moderation_status.as_deref() == Some("FLAGGED"))
        .count();
    if usable > 0 || flagged > 0 {
        return (
            BookStatus::Partial,
            Some(format!(
                "{} of {} pages need review",
                pages.len() - usable,
                pages.len()
            )),
        );
    }

    (
        BookStatus::Failed,
        Some("All pages failed illustration".to_string()),
    )
}

fn usable_count(pages: &[PageModerationRow]) -> usize {
    pages
        .iter()
        .filter(|p| p.moderation_status.as_deref() == Some("OK") && p.generated_image_url.is_some())
        .count()
}

/// Processes book finalization jobs
pub struct FinalizeProcessor;

impl FinalizeProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate page outcomes and write the terminal book status
    pub async fn process(&self, pool: &DbPool, job: &FinalizeJob) -> Result<()> {
        info!("Finalizing book {}", job.book_id);

        let snapshot = pages::moderation_snapshot(pool, job.book_id).await?;
        let (status, reason) = resolve_final_status(&snapshot);

        if let Some(reason) = &reason {
            warn!("Book {} finalized as {}: {}", job.book_id, status.as_str(), reason);
        }

        books::set_status(pool, job.book_id, status).await?;

        info!(
            "Book {} finalized: {} ({} pages)",
            job.book_id,
            status.as_str(),
            snapshot.len()
        );
        Ok(())
    }
}

impl Default for FinalizeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn page(status: Option<&str>, url: Option<&str>) -> PageModerationRow {
        PageModerationRow {
            id: Uuid::new_v4(),
            page_number: 1,
            generated_image_url: url.map(|u| u.to_string()),
            moderation_status: status.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_no_pages_fails() {
        let (status, reason) = resolve_final_status(&[]);
        assert_eq!(status, BookStatus::Failed);
        assert_eq!(reason.as_deref(), Some("No pages found"));
    }

    #[test]
    fn test_all_ok_completes() {
        let pages = vec![
            page(Some("OK"), Some("https://cdn.test/1.png")),
            page(Some("OK"), Some("https://cdn.test/2.png")),
        ];
        let (status, reason) = resolve_final_status(&pages);
        assert_eq!(status, BookStatus::Completed);
        assert_eq!(reason, None);
    }

    #[test]
    fn test_ok_without_url_is_not_complete() {
        // An OK row with no stored image cannot count as done.
        let pages = vec![
            page(Some("OK"), Some("https://cdn.test/1.png")),
            page(Some("OK"), None),
        ];
        let (status, _) = resolve_final_status(&pages);
        assert_eq!(status, BookStatus::Partial);
    }

    #[test]
    fn test_ok_without_url_alone_fails() {
        // No stored image and nothing flagged: there is nothing usable to
        // ship, even though the status column says OK.
        let pages = vec![page(Some("OK"), None)];
        let (status, reason) = resolve_final_status(&pages);
        assert_eq!(status, BookStatus::Failed);
        assert_eq!(reason.as_deref(), Some("All pages failed illustration"));
    }

    #[test]
    fn test_flagged_page_yields_partial() {
        let pages = vec![
            page(Some("OK"), Some("https://cdn.test/1.png")),
            page(Some("FLAGGED"), None),
        ];
        let (status, reason) = resolve_final_status(&pages);
        assert_eq!(status, BookStatus::Partial);
        assert!(reason.unwrap().contains("need review"));
    }

    #[test]
    fn test_all_failed_fails() {
        let pages = vec![page(Some("FAILED"), None), page(Some("FAILED"), None)];
        let (status, reason) = resolve_final_status(&pages);
        assert_eq!(status, BookStatus::Failed);
        assert_eq!(reason.as_deref(), Some("All pages failed illustration"));
    }

    #[test]
    fn test_pending_only_fails() {
        // Pages never reached by any worker are neither usable nor flagged.
        let pages = vec![page(Some("PENDING"), None), page(None, None)];
        let (status, _) = resolve_final_status(&pages);
        assert_eq!(status, BookStatus::Failed);
    }

    #[test]
    fn test_single_flagged_page_is_partial() {
        let pages = vec![page(Some("FLAGGED"), None)];
        let (status, _) = resolve_final_status(&pages);
        assert_eq!(status, BookStatus::Partial);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let pages = vec![
            page(Some("OK"), Some("https://cdn.test/1.png")),
            page(Some("FLAGGED"), None),
            page(Some("FAILED"), None),
        ];
        let first = resolve_final_status(&pages);
        let second = resolve_final_status(&pages);
        assert_eq!(first, second);
    }
}
