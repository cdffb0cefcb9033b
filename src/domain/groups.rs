//! Group form rules.

use super::slug::{SlugError, derive_slug, validate_slug};
use super::validation::{FieldErrors, REQUIRED_MESSAGE, non_blank};

pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDraft {
    pub title: String,
    /// `None` asks the caller to derive a unique slug from the title.
    pub slug: Option<String>,
    pub description: String,
}

impl GroupDraft {
    pub fn parse(title: &str, slug: Option<&str>, description: &str) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let title = non_blank(title);
        match title.as_deref() {
            None => errors.add("title", REQUIRED_MESSAGE),
            Some(title) if title.chars().count() > MAX_TITLE_LEN => errors.add(
                "title",
                format!("Ensure this value has at most {MAX_TITLE_LEN} characters."),
            ),
            Some(title) => {
                if slug.and_then(non_blank).is_none() && derive_slug(title).is_err() {
                    errors.add("slug", "A slug cannot be derived from this title.");
                }
            }
        }

        let slug = slug.and_then(non_blank);
        if let Some(candidate) = slug.as_deref()
            && let Err(err) = validate_slug(candidate)
        {
            errors.add("slug", slug_message(&err));
        }

        let description = non_blank(description);
        if description.is_none() {
            errors.add("description", REQUIRED_MESSAGE);
        }

        errors.into_result(()).map(|()| Self {
            title: title.unwrap_or_default(),
            slug,
            description: description.unwrap_or_default(),
        })
    }
}

fn slug_message(err: &SlugError) -> String {
    match err {
        SlugError::InvalidCharacters { .. } => {
            "Enter a valid slug consisting of letters, numbers, underscores or hyphens.".to_string()
        }
        other => other.to_string(),
    }
}
