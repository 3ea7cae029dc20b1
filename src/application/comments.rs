//! Comment submission.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::forms::{FormErrors, REQUIRED_MESSAGE};
use crate::application::repos::{CommentsWriteRepo, CreateCommentParams, PostsRepo, RepoError};
use crate::domain::entities::CommentRecord;
use crate::domain::posts::{normalize_text, preview};
use crate::domain::types::Viewer;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("post not found")]
    PostNotFound,
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("invalid comment form: {0}")]
    Invalid(FormErrors),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct CommentService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn CommentsWriteRepo>,
}

impl CommentService {
    pub fn new(posts: Arc<dyn PostsRepo>, writer: Arc<dyn CommentsWriteRepo>) -> Self {
        Self { posts, writer }
    }

    /// Attach a comment from the viewer to the post.
    pub async fn add_comment(
        &self,
        viewer: &Viewer,
        post_id: Uuid,
        text: &str,
    ) -> Result<CommentRecord, CommentError> {
        let author = viewer.user().ok_or(CommentError::AuthenticationRequired)?;

        if self.posts.find_post(post_id).await?.is_none() {
            return Err(CommentError::PostNotFound);
        }

        let Some(text) = normalize_text(text) else {
            let mut errors = FormErrors::new();
            errors.add("text", REQUIRED_MESSAGE);
            return Err(CommentError::Invalid(errors));
        };

        let comment = self
            .writer
            .create_comment(CreateCommentParams {
                post_id,
                author_id: author.id,
                text,
            })
            .await?;

        info!(
            target = "yatube::application::comments",
            comment_id = %comment.id,
            post_id = %post_id,
            author = %author.username,
            preview = %preview(&comment.text),
            "comment created"
        );

        Ok(comment)
    }
}
