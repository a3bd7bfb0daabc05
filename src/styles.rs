//! Art style library
//!
//! Maps the style keys stored on a book to the style-reference image the
//! illustration model consumes. An unknown key is fatal to the job: without
//! a style reference there is nothing meaningful to generate.

use crate::error::{PipelineError, Result};

/// One entry in the style library
#[derive(Debug, Clone, Copy)]
pub struct StyleDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub reference_image_url: &'static str,
    /// Extra style notes appended to the illustration prompt
    pub notes: Option<&'static str>,
}

const STYLE_LIBRARY: &[StyleDefinition] = &[
    StyleDefinition {
        key: "anime",
        label: "Anime",
        reference_image_url:
            "https://res.cloudinary.com/storybook-styles/image/upload/v1746284318/Anime_USETHIS_qmgm0i.png",
        notes: None,
    },
    StyleDefinition {
        key: "pen",
        label: "Pen",
        reference_image_url:
            "https://res.cloudinary.com/storybook-styles/image/upload/v1746283996/pen_USETHIS_nqfnel.png",
        notes: None,
    },
    StyleDefinition {
        key: "watercolor",
        label: "Watercolor",
        reference_image_url:
            "https://res.cloudinary.com/storybook-styles/image/upload/v1746284308/Watercolor_USETHIS3_n2giqf.png",
        notes: None,
    },
    StyleDefinition {
        key: "modern",
        label: "Modern",
        reference_image_url:
            "https://res.cloudinary.com/storybook-styles/image/upload/v1746283996/modern_USETHIS_dukxgz.png",
        notes: None,
    },
    StyleDefinition {
        key: "pencil",
        label: "Pencil",
        reference_image_url:
            "https://res.cloudinary.com/storybook-styles/image/upload/v1746283997/pencil_USEHTIS_htcslm.png",
        notes: None,
    },
    StyleDefinition {
        key: "bwPlusOne",
        label: "B&W +1 Color",
        reference_image_url:
            "https://res.cloudinary.com/storybook-styles/image/upload/v1746283997/bw_1col_USETHIS_pvbovo.png",
        notes: Some(
            "As per the reference image, black and white EXCEPT exactly one prominent object \
             (not people) of the model's choosing",
        ),
    },
];

/// Resolve a style key to its definition
pub fn resolve(key: &str) -> Result<&'static StyleDefinition> {
    STYLE_LIBRARY
        .iter()
        .find(|s| s.key == key)
        .ok_or_else(|| PipelineError::UnknownStyle(key.to_string()))
}

/// All known styles, for listings
pub fn all() -> &'static [StyleDefinition] {
    STYLE_LIBRARY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_style() {
        let style = resolve("watercolor").unwrap();
        assert_eq!(style.label, "Watercolor");
        assert!(style.reference_image_url.starts_with("https://"));
    }

    #[test]
    fn test_resolve_unknown_style_is_error() {
        assert!(resolve("oilPainting").is_err());
    }

    #[test]
    fn test_keys_unique() {
        for (i, a) in all().iter().enumerate() {
            for b in &all()[i + 1..] {
                assert_ne!(a.key, b.key);
            }
        }
    }
}
