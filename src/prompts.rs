//! Prompt builders for the story and illustration models
//!
//! Consumed as opaque pure functions by the workers: page/style context in,
//! prompt out. No side effects.

use crate::queue::payload::StoryJob;
use crate::styles::StyleDefinition;
use serde::{Deserialize, Serialize};

/// gpt-image-1 safe prompt ceiling
const MAX_PROMPT_CHARS: usize = 30_000;

/// One part of a structured multi-part user message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    ImageUrl { url: String },
}

/// System prompt for story generation
pub fn story_system_prompt() -> &'static str {
    "You are an expert children's picture-book author for toddlers (ages 2-5). \
     Your task is to write engaging story text for a personalised picture book \
     based on the user's photos and inputs."
}

/// Build the single vision prompt covering every story page of a book
///
/// The storyboard interleaves a page marker with the page's photo so the
/// model writes text grounded in the actual image sequence.
pub fn build_story_prompt(job: &StoryJob) -> Vec<MessagePart> {
    let ctx = &job.prompt_context;
    let mut parts = Vec::new();

    parts.push(MessagePart::Text {
        text: format!(
            "# Configuration\nChild's Name: {}\nBook Title: {}\nPage Count: {}",
            ctx.child_name, ctx.book_title, job.story_pages.len()
        ),
    });

    parts.push(MessagePart::Text {
        text: "# Storyboard Sequence".to_string(),
    });
    for page in &job.story_pages {
        parts.push(MessagePart::Text {
            text: format!("--- Page {} ---", page.page_number),
        });
        match &page.original_image_url {
            Some(url) => parts.push(MessagePart::ImageUrl { url: url.clone() }),
            None => parts.push(MessagePart::Text {
                text: format!("[No Image Provided for Page {}]", page.page_number),
            }),
        }
    }
    parts.push(MessagePart::Text {
        text: "--- End Storyboard ---".to_string(),
    });

    let mut instructions = vec![
        "# Instructions & Guiding Principles:".to_string(),
        "- Craft a cohesive and delightful story matching the provided sequence of \
         user-uploaded images, with a clear beginning, middle, and end."
            .to_string(),
        "- Write from a toddler's perspective: short, simple, concrete sentences with \
         vivid nouns, strong action verbs, and sensory language."
            .to_string(),
        "- Use rhythm, repetition, and fun sounds naturally to enhance read-aloud appeal."
            .to_string(),
        format!(
            "- Weave in the child's name \"{}\" and echo the book title \"{}\" where it fits.",
            ctx.child_name, ctx.book_title
        ),
        "- Generate 1-3 simple sentences per page, keeping good narrative flow across pages."
            .to_string(),
    ];

    if job.is_winkify_enabled {
        instructions.push(
            "- For each page, also suggest one subtle dynamic visual effect (zoom lines, \
             sparkles, motion blur) fitting the action, as a short illustration note; use \
             null when no effect fits."
                .to_string(),
        );
        instructions.push(
            "# Output Format\nRespond with ONLY a valid JSON object. Keys are the page \
             numbers as strings (\"1\", \"2\", ...). Each value is an object with a \
             \"text\" field (the story text) and an \"illustrationNotes\" field (the \
             effect suggestion or null)."
                .to_string(),
        );
    } else {
        instructions.push(
            "# Output Format\nRespond with ONLY a valid JSON object. Keys are the page \
             numbers as strings (\"1\", \"2\", ...); each value is that page's story \
             text as a plain string."
                .to_string(),
        );
    }

    parts.push(MessagePart::Text {
        text: instructions.join("\n"),
    });

    parts
}

/// Inputs to the illustration prompt builder
#[derive(Debug, Clone)]
pub struct IllustrationPromptOptions<'a> {
    pub style: &'a StyleDefinition,
    pub page_text: Option<&'a str>,
    pub book_title: Option<&'a str>,
    pub is_title_page: bool,
    pub illustration_notes: Option<&'a str>,
    pub is_winkify_enabled: bool,
}

/// Build the text prompt for one page's image-edit call
///
/// The model receives two images: the content source (the user photo) and
/// the style reference. The prompt pins down which image plays which role,
/// then adds winkify effect instructions and the page-role text treatment.
pub fn build_illustration_prompt(opts: &IllustrationPromptOptions<'_>) -> String {
    let mut sections = vec![
        "Task: Apply the artistic style from the second input image (Style Reference) to \
         the content of the first input image (Content Source)."
            .to_string(),
        "Content Source (Image 1): Use this image EXCLUSIVELY for all content elements: \
         characters, objects, faces, poses, and the overall background layout. Preserve \
         these content elements and their composition exactly as they appear in Image 1. \
         Do not add, remove, or significantly alter any content from Image 1."
            .to_string(),
        format!(
            "Style Source (Image 2): Use this image PURELY as the visual reference for the \
             artistic style. Apply its color palette, texture, line work, shading, rendering \
             techniques, and overall aesthetic faithfully to the content derived from \
             Image 1. The style should ONLY come from Image 2.{}",
            match opts.style.notes {
                Some(notes) => format!(" Specific Style Notes: {}", notes),
                None => String::new(),
            }
        ),
    ];

    if opts.is_winkify_enabled {
        if let Some(notes) = opts.illustration_notes {
            sections.push(
                "Subtle Dynamic Effects: Enhance the action with effects like zoom lines, \
                 sparkles, or motion blur, covering less than 20% of the scene. These effects \
                 should NOT alter the core characters, faces, or poses derived from Image 1. \
                 Apply effects in the style derived from Image 2."
                    .to_string(),
            );
            sections.push(format!("Specific Effect Request: {}.", notes));
        }
    }

    if opts.is_title_page {
        sections.push(format!(
            "Book Title Integration: Integrate the book title \"{}\" naturally within the \
             scene. Ensure it is highly legible and does not obscure key details from \
             Image 1 content. The title's visual style should be inspired by text elements \
             or the overall aesthetic found in the Style Source (Image 2).",
            opts.book_title.unwrap_or("")
        ));
    } else {
        sections.push(format!(
            "Text Rendering: Render the following text exactly once within the image: \
             \"{}\". Replicate the font style, size, color, and positioning characteristics \
             demonstrated by the text elements present in the Style Source (Image 2). \
             Ensure all provided text is fully visible and not cut off.",
            opts.page_text.unwrap_or("").trim()
        ));
    }

    let prompt = sections.join(" ");
    if prompt.len() > MAX_PROMPT_CHARS {
        let mut truncated: String = prompt.chars().take(MAX_PROMPT_CHARS - 1).collect();
        truncated.push('…');
        truncated
    } else {
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::payload::{StoryPageRef, StoryPromptContext};
    use crate::styles;
    use uuid::Uuid;

    fn story_job(winkify: bool) -> StoryJob {
        StoryJob {
            book_id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
            prompt_context: StoryPromptContext {
                book_title: "Maya at the Beach".to_string(),
                child_name: "Maya".to_string(),
                art_style: Some("watercolor".to_string()),
            },
            story_pages: vec![
                StoryPageRef {
                    page_id: Uuid::new_v4(),
                    page_number: 1,
                    asset_id: Some(Uuid::new_v4()),
                    original_image_url: Some("https://img.test/p1.jpg".to_string()),
                },
                StoryPageRef {
                    page_id: Uuid::new_v4(),
                    page_number: 2,
                    asset_id: None,
                    original_image_url: None,
                },
            ],
            is_winkify_enabled: winkify,
        }
    }

    #[test]
    fn test_story_prompt_interleaves_images() {
        let parts = build_story_prompt(&story_job(false));

        let has_image = parts
            .iter()
            .any(|p| matches!(p, MessagePart::ImageUrl { url } if url.contains("p1.jpg")));
        assert!(has_image);

        // Page 2 has no asset; the prompt says so instead of dropping the slot.
        let has_placeholder = parts.iter().any(
            |p| matches!(p, MessagePart::Text { text } if text.contains("No Image Provided for Page 2")),
        );
        assert!(has_placeholder);
    }

    #[test]
    fn test_story_prompt_output_schema_follows_flag() {
        let plain = build_story_prompt(&story_job(false));
        let winkified = build_story_prompt(&story_job(true));

        let last_text = |parts: &[MessagePart]| match parts.last().unwrap() {
            MessagePart::Text { text } => text.clone(),
            _ => panic!("instructions should be the final text part"),
        };

        assert!(last_text(&plain).contains("plain string"));
        assert!(last_text(&winkified).contains("illustrationNotes"));
    }

    #[test]
    fn test_illustration_prompt_title_page() {
        let style = styles::resolve("pen").unwrap();
        let prompt = build_illustration_prompt(&IllustrationPromptOptions {
            style,
            page_text: None,
            book_title: Some("Maya at the Beach"),
            is_title_page: true,
            illustration_notes: None,
            is_winkify_enabled: false,
        });

        assert!(prompt.contains("Book Title Integration"));
        assert!(prompt.contains("Maya at the Beach"));
        assert!(!prompt.contains("Text Rendering"));
    }

    #[test]
    fn test_illustration_prompt_story_page_overlays_text() {
        let style = styles::resolve("pen").unwrap();
        let prompt = build_illustration_prompt(&IllustrationPromptOptions {
            style,
            page_text: Some("Splash! Maya jumps in."),
            book_title: Some("Maya at the Beach"),
            is_title_page: false,
            illustration_notes: None,
            is_winkify_enabled: false,
        });

        assert!(prompt.contains("Text Rendering"));
        assert!(prompt.contains("Splash! Maya jumps in."));
    }

    #[test]
    fn test_illustration_prompt_winkify_needs_notes() {
        let style = styles::resolve("anime").unwrap();
        let without_notes = build_illustration_prompt(&IllustrationPromptOptions {
            style,
            page_text: Some("Zoom!"),
            book_title: None,
            is_title_page: false,
            illustration_notes: None,
            is_winkify_enabled: true,
        });
        assert!(!without_notes.contains("Subtle Dynamic Effects"));

        let with_notes = build_illustration_prompt(&IllustrationPromptOptions {
            style,
            page_text: Some("Zoom!"),
            book_title: None,
            is_title_page: false,
            illustration_notes: Some("zoom lines behind the bike"),
            is_winkify_enabled: true,
        });
        assert!(with_notes.contains("Subtle Dynamic Effects"));
        assert!(with_notes.contains("zoom lines behind the bike"));
    }

    #[test]
    fn test_illustration_prompt_includes_style_notes() {
        let style = styles::resolve("bwPlusOne").unwrap();
        let prompt = build_illustration_prompt(&IllustrationPromptOptions {
            style,
            page_text: Some("Hello"),
            book_title: None,
            is_title_page: false,
            illustration_notes: None,
            is_winkify_enabled: false,
        });
        assert!(prompt.contains("Specific Style Notes"));
    }
}
