//! Database models for books and pages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Books
// ============================================================================

/// Book - matches the books table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub user_id: String,
    pub title: Option<String>,
    pub child_name: Option<String>,
    pub art_style: Option<String>,
    pub status: String,
    pub page_length: i32,
    pub cover_asset_id: Option<Uuid>,
    pub is_winkify_enabled: bool,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Parsed pipeline status; rows written by this service always hold a
    /// known value, anything else maps to Draft.
    pub fn pipeline_status(&self) -> BookStatus {
        BookStatus::parse(&self.status).unwrap_or(BookStatus::Draft)
    }
}

/// Book pipeline status
///
/// Transitions: DRAFT -> GENERATING -> (COMPLETED | FAILED) ->
/// ILLUSTRATING -> (COMPLETED | PARTIAL | FAILED). FAILED may re-enter
/// GENERATING via an explicit user retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookStatus {
    Draft,
    Generating,
    Completed,
    Illustrating,
    Partial,
    Failed,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Draft => "DRAFT",
            BookStatus::Generating => "GENERATING",
            BookStatus::Completed => "COMPLETED",
            BookStatus::Illustrating => "ILLUSTRATING",
            BookStatus::Partial => "PARTIAL",
            BookStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(BookStatus::Draft),
            "GENERATING" => Some(BookStatus::Generating),
            "COMPLETED" => Some(BookStatus::Completed),
            "ILLUSTRATING" => Some(BookStatus::Illustrating),
            "PARTIAL" => Some(BookStatus::Partial),
            "FAILED" => Some(BookStatus::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// Pages
// ============================================================================

/// Page - matches the pages table
///
/// `page_index` is the 0-based ordering (unique per book); `page_number` is
/// the 1-based equivalent. The page whose asset_id matches the book's
/// cover_asset_id is the cover/title page and is excluded from story-text
/// numbering.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub book_id: Uuid,
    pub page_index: i32,
    pub page_number: i32,
    pub asset_id: Option<Uuid>,
    pub original_image_url: Option<String>,
    pub generated_image_url: Option<String>,
    pub text: Option<String>,
    pub text_confirmed: bool,
    pub illustration_notes: Option<String>,
    pub is_title_page: bool,
    pub moderation_status: Option<String>,
    pub moderation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-page terminal outcome of illustration generation
///
/// Pending is the implicit state of a page no illustration job has touched
/// yet (NULL column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationStatus {
    Pending,
    Ok,
    Flagged,
    Failed,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "PENDING",
            ModerationStatus::Ok => "OK",
            ModerationStatus::Flagged => "FLAGGED",
            ModerationStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ModerationStatus::Pending),
            "OK" => Some(ModerationStatus::Ok),
            "FLAGGED" => Some(ModerationStatus::Flagged),
            "FAILED" => Some(ModerationStatus::Failed),
            _ => None,
        }
    }
}

/// Token usage reported by the text model (informational only)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
}

/// Minimal per-page snapshot the finalize worker aggregates over
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PageModerationRow {
    pub id: Uuid,
    pub page_number: i32,
    pub generated_image_url: Option<String>,
    pub moderation_status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_status_round_trip() {
        for status in [
            BookStatus::Draft,
            BookStatus::Generating,
            BookStatus::Completed,
            BookStatus::Illustrating,
            BookStatus::Partial,
            BookStatus::Failed,
        ] {
            assert_eq!(BookStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookStatus::parse("bogus"), None);
    }

    #[test]
    fn test_moderation_status_parse() {
        assert_eq!(ModerationStatus::parse("OK"), Some(ModerationStatus::Ok));
        assert_eq!(
            ModerationStatus::parse("FLAGGED"),
            Some(ModerationStatus::Flagged)
        );
        assert_eq!(ModerationStatus::parse(""), None);
    }
}
