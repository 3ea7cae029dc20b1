//! Post detail, creation and editing.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::forms::{
    FormErrors, INVALID_CHOICE_MESSAGE, INVALID_IMAGE_MESSAGE, REQUIRED_MESSAGE,
};
use crate::application::repos::{
    CommentsRepo, CreatePostParams, GroupsRepo, MediaStore, PostScope, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentListing, GroupRecord, PostListing, PostRecord, UserRecord};
use crate::domain::posts::{normalize_text, preview};
use crate::domain::types::Viewer;

const SOURCE: &str = "yatube::application::posts";

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Bytes,
}

/// Submitted post form.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub text: String,
    /// Raw `group` select value; empty means "no group".
    pub group_id: Option<String>,
    pub image: Option<ImageUpload>,
    pub clear_image: bool,
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post not found")]
    NotFound,
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("post {post_id} is not owned by the viewer")]
    NotAuthor { post_id: Uuid },
    #[error("invalid post form: {0}")]
    Invalid(FormErrors),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub listing: PostListing,
    pub comment_count: u64,
    pub author_post_count: u64,
    /// Newest first.
    pub comments: Vec<CommentListing>,
}

struct ValidatedPost {
    text: String,
    group_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    media: Arc<dyn MediaStore>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
            media,
        }
    }

    pub async fn detail(&self, id: Uuid) -> Result<PostDetail, PostError> {
        let listing = self.posts.find_post(id).await?.ok_or(PostError::NotFound)?;
        let comments = self.comments.list_comments(id).await?;
        let author_post_count = self
            .posts
            .count_posts(PostScope::Author(listing.post.author_id))
            .await?;

        Ok(PostDetail {
            comment_count: comments.len() as u64,
            author_post_count,
            comments,
            listing,
        })
    }

    /// Groups offered by the post form.
    pub async fn groups(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    /// Load a post for editing, enforcing that the viewer is its author.
    pub async fn load_for_edit(
        &self,
        viewer: &Viewer,
        id: Uuid,
    ) -> Result<PostListing, PostError> {
        let user = viewer.user().ok_or(PostError::AuthenticationRequired)?;
        let listing = self.posts.find_post(id).await?.ok_or(PostError::NotFound)?;
        if listing.post.author_id != user.id {
            return Err(PostError::NotAuthor { post_id: id });
        }
        Ok(listing)
    }

    pub async fn create(
        &self,
        viewer: &Viewer,
        draft: PostDraft,
    ) -> Result<PostRecord, PostError> {
        let author = viewer.user().ok_or(PostError::AuthenticationRequired)?;
        let validated = self.validate(&draft).await?;

        let image = match draft.image {
            Some(upload) => Some(self.store_upload(upload).await?),
            None => None,
        };

        let params = CreatePostParams {
            author_id: author.id,
            text: validated.text,
            group_id: validated.group_id,
            image: image.clone(),
        };

        let post = match self.writer.create_post(params).await {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                return Err(err.into());
            }
        };

        log_post_change("post created", author, &post);
        Ok(post)
    }

    pub async fn edit(
        &self,
        viewer: &Viewer,
        id: Uuid,
        draft: PostDraft,
    ) -> Result<PostRecord, PostError> {
        let existing = self.load_for_edit(viewer, id).await?;
        let validated = self.validate(&draft).await?;

        let previous_image = existing.post.image;
        let image = match draft.image {
            Some(upload) => Some(self.store_upload(upload).await?),
            None if draft.clear_image => None,
            None => previous_image.clone(),
        };

        let params = UpdatePostParams {
            id,
            text: validated.text,
            group_id: validated.group_id,
            image: image.clone(),
        };

        let post = match self.writer.update_post(params).await {
            Ok(post) => post,
            Err(err) => {
                if image != previous_image {
                    self.discard_image(image.as_deref()).await;
                }
                return Err(err.into());
            }
        };

        if previous_image != post.image {
            self.discard_image(previous_image.as_deref()).await;
        }

        if let Some(author) = viewer.user() {
            log_post_change("post updated", author, &post);
        }
        Ok(post)
    }

    async fn validate(&self, draft: &PostDraft) -> Result<ValidatedPost, PostError> {
        let mut errors = FormErrors::new();

        let text = normalize_text(&draft.text);
        if text.is_none() {
            errors.add("text", REQUIRED_MESSAGE);
        }

        let group_id = match draft.group_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) if self.groups.find_group_by_id(id).await?.is_some() => Some(id),
                _ => {
                    errors.add("group", INVALID_CHOICE_MESSAGE);
                    None
                }
            },
        };

        let image_invalid = draft
            .image
            .as_ref()
            .is_some_and(|upload| imagesize::blob_size(&upload.data).is_err());
        if image_invalid {
            errors.add("image", INVALID_IMAGE_MESSAGE);
        }

        errors.into_result().map_err(PostError::Invalid)?;

        Ok(ValidatedPost {
            text: text.unwrap_or_default(),
            group_id,
        })
    }

    async fn store_upload(&self, upload: ImageUpload) -> Result<String, RepoError> {
        self.media.store_image(&upload.filename, upload.data).await
    }

    async fn discard_image(&self, stored_path: Option<&str>) {
        let Some(path) = stored_path else {
            return;
        };
        if let Err(err) = self.media.remove(path).await {
            warn!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to remove stored image"
            );
        }
    }
}

fn log_post_change(message: &'static str, author: &UserRecord, post: &PostRecord) {
    info!(
        target = SOURCE,
        post_id = %post.id,
        author = %author.username,
        group_id = ?post.group_id,
        preview = %preview(&post.text),
        "{message}"
    );
}
