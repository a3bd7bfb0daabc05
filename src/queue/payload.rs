//! Job payloads - the wire contract between the orchestrator and workers
//!
//! A closed set of tagged variants; every dispatch site matches
//! exhaustively, so adding a job type is a compile-time event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed job payload stored as JSONB on the jobs table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    StoryGeneration(StoryJob),
    IllustrationGeneration(IllustrationJob),
    BookFinalize(FinalizeJob),
}

impl JobPayload {
    /// Queue this payload belongs on
    pub fn queue(&self) -> crate::queue::QueueName {
        match self {
            JobPayload::StoryGeneration(_) => crate::queue::QueueName::StoryGeneration,
            JobPayload::IllustrationGeneration(_) => {
                crate::queue::QueueName::IllustrationGeneration
            }
            JobPayload::BookFinalize(_) => crate::queue::QueueName::BookFinalize,
        }
    }
}

/// One job per book: generate text for every story page in a single model
/// call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryJob {
    pub book_id: Uuid,
    pub user_id: String,
    pub prompt_context: StoryPromptContext,
    pub story_pages: Vec<StoryPageRef>,
    pub is_winkify_enabled: bool,
}

/// Book-level context the story prompt builder needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryPromptContext {
    pub book_title: String,
    pub child_name: String,
    pub art_style: Option<String>,
}

/// A story page needing text, in story order (cover excluded, 1-based)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryPageRef {
    pub page_id: Uuid,
    pub page_number: i32,
    pub asset_id: Option<Uuid>,
    pub original_image_url: Option<String>,
}

/// One job per page, fully independent of sibling pages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IllustrationJob {
    pub user_id: String,
    pub book_id: Uuid,
    pub page_id: Uuid,
    pub page_number: i32,
    pub text: Option<String>,
    pub art_style: Option<String>,
    pub book_title: Option<String>,
    pub is_title_page: bool,
    pub illustration_notes: Option<String>,
    pub original_image_url: Option<String>,
    pub is_winkify_enabled: bool,
}

/// Parent job: aggregate per-page outcomes once all children settle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalizeJob {
    pub book_id: Uuid,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tag_dispatch() {
        let payload = JobPayload::BookFinalize(FinalizeJob {
            book_id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
        });

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "book_finalize");

        let restored: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let json = serde_json::json!({ "type": "pdf_export", "book_id": "x" });
        assert!(serde_json::from_value::<JobPayload>(json).is_err());
    }
}
