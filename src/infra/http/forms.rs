//! Request body parsing for the post and comment forms.

use axum::http::StatusCode;
use axum_extra::extract::{Multipart, multipart::MultipartError};
use serde::Deserialize;

use crate::application::error::HttpError;
use crate::application::posts::{ImageUpload, PostDraft};

const SOURCE: &str = "infra::http::forms::read_post_draft";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

/// Read the multipart post form: `text`, `group`, `image` and `image-clear`.
pub async fn read_post_draft(multipart: &mut Multipart) -> Result<PostDraft, HttpError> {
    let mut draft = PostDraft::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("text") => draft.text = field.text().await.map_err(multipart_error)?,
            Some("group") => draft.group_id = Some(field.text().await.map_err(multipart_error)?),
            Some("image-clear") => {
                let value = field.text().await.map_err(multipart_error)?;
                draft.clear_image = matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "on" | "true" | "1" | "yes"
                );
            }
            Some("image") => {
                let filename = field
                    .file_name()
                    .map(|value| value.trim().to_string())
                    .unwrap_or_default();
                let data = field.bytes().await.map_err(multipart_error)?;
                // Browsers send an empty part when no file was chosen.
                if !filename.is_empty() || !data.is_empty() {
                    let filename = if filename.is_empty() {
                        "image".to_string()
                    } else {
                        filename
                    };
                    draft.image = Some(ImageUpload { filename, data });
                }
            }
            _ => continue,
        }
    }

    Ok(draft)
}

fn multipart_error(err: MultipartError) -> HttpError {
    let status = err.status();
    let public_message = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "Uploaded file is too large"
    } else {
        "Invalid form submission"
    };
    HttpError::from_error(SOURCE, status, public_message, &err)
}
