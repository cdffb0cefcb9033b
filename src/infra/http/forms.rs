//! Form payloads accepted by the HTML handlers.

use axum_extra::extract::{Multipart, multipart::MultipartError};
use serde::Deserialize;

use crate::application::posts::{ImageChange, ImageUpload};
use crate::domain::posts::PostInput;

const FIELD_TEXT: &str = "text";
const FIELD_GROUP: &str = "group";
const FIELD_IMAGE: &str = "image";
const FIELD_IMAGE_CLEAR: &str = "image-clear";

/// A submitted create/edit post form.
#[derive(Debug, Clone, Default)]
pub struct PostFormSubmission {
    pub input: PostInput,
    pub image: Option<ImageUpload>,
    pub clear_image: bool,
}

impl PostFormSubmission {
    /// How an edit treats the current image. A new file wins over `image-clear`.
    pub fn image_change(&mut self) -> ImageChange {
        match self.image.take() {
            Some(upload) => ImageChange::Replace(upload),
            None if self.clear_image => ImageChange::Clear,
            None => ImageChange::Keep,
        }
    }
}

pub async fn read_post_form(mut multipart: Multipart) -> Result<PostFormSubmission, MultipartError> {
    let mut submission = PostFormSubmission::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            FIELD_TEXT => submission.input.text = field.text().await?,
            FIELD_GROUP => submission.input.group = field.text().await?,
            FIELD_IMAGE => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                // browsers send an empty part when no file was chosen
                if !(file_name.is_empty() && data.is_empty()) {
                    submission.image = Some(ImageUpload { file_name, data });
                }
            }
            FIELD_IMAGE_CLEAR => {
                let value = field.text().await?;
                submission.clear_image = !matches!(value.trim(), "" | "false" | "0" | "off");
            }
            _ => {}
        }
    }

    Ok(submission)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NextQuery {
    pub next: Option<String>,
}
