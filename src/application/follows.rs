//! Follow and unfollow actions between users.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{FollowsWriteRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::Viewer;

const SOURCE: &str = "yatube::application::follows";

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("authentication required")]
    AuthenticationRequired,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    /// Target is the viewer; nothing was written.
    SelfFollow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Removed,
    NotFollowing,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    writer: Arc<dyn FollowsWriteRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, writer: Arc<dyn FollowsWriteRepo>) -> Self {
        Self { users, writer }
    }

    pub async fn follow(
        &self,
        viewer: &Viewer,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let user = viewer.user().ok_or(FollowError::AuthenticationRequired)?;
        let author = self.find_author(username).await?;

        if author.id == user.id {
            return Ok(FollowOutcome::SelfFollow);
        }

        let outcome = if self.writer.follow(user.id, author.id).await? {
            FollowOutcome::Created
        } else {
            FollowOutcome::AlreadyFollowing
        };

        info!(
            target = SOURCE,
            follower = %user.username,
            author = %author.username,
            outcome = ?outcome,
            "follow requested"
        );
        Ok(outcome)
    }

    pub async fn unfollow(
        &self,
        viewer: &Viewer,
        username: &str,
    ) -> Result<UnfollowOutcome, FollowError> {
        let user = viewer.user().ok_or(FollowError::AuthenticationRequired)?;
        let author = self.find_author(username).await?;

        let outcome = if self.writer.unfollow(user.id, author.id).await? {
            UnfollowOutcome::Removed
        } else {
            UnfollowOutcome::NotFollowing
        };

        info!(
            target = SOURCE,
            follower = %user.username,
            author = %author.username,
            outcome = ?outcome,
            "unfollow requested"
        );
        Ok(outcome)
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}
