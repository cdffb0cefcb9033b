//! Post and comment form rules.

use super::validation::{FieldErrors, REQUIRED_MESSAGE, non_blank};

pub const INVALID_GROUP_MESSAGE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// Raw values submitted through the post form, kept verbatim so that a failed
/// submission can be shown back to the author.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostInput {
    pub text: String,
    pub group: String,
}

/// Validated post content, before storage-dependent checks (group existence).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub text: String,
    pub group_id: Option<i64>,
}

impl PostDraft {
    pub fn parse(input: &PostInput) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let text = non_blank(&input.text);
        if text.is_none() {
            errors.add("text", REQUIRED_MESSAGE);
        }

        let group_id = match non_blank(&input.group) {
            None => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) if id > 0 => Some(id),
                _ => {
                    errors.add("group", INVALID_GROUP_MESSAGE);
                    None
                }
            },
        };

        errors.into_result(()).map(|()| Self {
            text: text.unwrap_or_default(),
            group_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentDraft {
    pub text: String,
}

impl CommentDraft {
    pub fn parse(text: &str) -> Result<Self, FieldErrors> {
        match non_blank(text) {
            Some(text) => Ok(Self { text }),
            None => Err(FieldErrors::single("text", REQUIRED_MESSAGE)),
        }
    }
}
