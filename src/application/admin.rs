//! Operator-facing management of users, groups and posts.
//!
//! Driven from the command line; there is no web surface for these actions.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::{
    CreateGroupParams, CreateUserParams, GroupsRepo, GroupsWriteRepo, MediaStore, PostsRepo,
    PostsWriteRepo, RepoError, UsersRepo, UsersWriteRepo,
};
use crate::domain::entities::{GroupRecord, UserRecord};
use crate::domain::posts::GROUP_TITLE_MAX_CHARS;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async, validate_slug};

const SOURCE: &str = "yatube::application::admin";
const USERNAME_MAX_CHARS: usize = 150;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub title: String,
    pub description: String,
    /// Explicit slug; derived from the title when absent.
    pub slug: Option<String>,
}

/// Repositories the admin service writes through.
#[derive(Clone)]
pub struct AdminRepos {
    pub users: Arc<dyn UsersRepo>,
    pub users_write: Arc<dyn UsersWriteRepo>,
    pub groups: Arc<dyn GroupsRepo>,
    pub groups_write: Arc<dyn GroupsWriteRepo>,
    pub posts: Arc<dyn PostsRepo>,
    pub posts_write: Arc<dyn PostsWriteRepo>,
    pub media: Arc<dyn MediaStore>,
}

#[derive(Clone)]
pub struct AdminService {
    repos: AdminRepos,
}

impl AdminService {
    pub fn new(repos: AdminRepos) -> Self {
        Self { repos }
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, AdminError> {
        Ok(self.repos.users.list_users().await?)
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, AdminError> {
        Ok(self.repos.groups.list_groups().await?)
    }

    pub async fn create_user(&self, username: &str) -> Result<UserRecord, AdminError> {
        let username = username.trim();
        validate_username(username)?;

        let user = self
            .repos
            .users_write
            .create_user(CreateUserParams {
                username: username.to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AdminError::ConstraintViolation("username"),
                other => AdminError::Repo(other),
            })?;

        info!(target = SOURCE, user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    /// Remove the user along with everything that references them.
    pub async fn delete_user(&self, username: &str) -> Result<UserRecord, AdminError> {
        let user = self
            .repos
            .users
            .find_user_by_username(username)
            .await?
            .ok_or(AdminError::NotFound("user"))?;

        let images = self.repos.users_write.delete_user(user.id).await?;
        for image in &images {
            self.discard_image(image).await;
        }

        info!(
            target = SOURCE,
            user_id = %user.id,
            username = %user.username,
            removed_images = images.len(),
            "user deleted"
        );
        Ok(user)
    }

    pub async fn create_group(
        &self,
        command: CreateGroupCommand,
    ) -> Result<GroupRecord, AdminError> {
        let CreateGroupCommand {
            title,
            description,
            slug,
        } = command;

        let title = title.trim().to_string();
        ensure_non_empty(&title, "title")?;
        if title.chars().count() > GROUP_TITLE_MAX_CHARS {
            return Err(AdminError::ConstraintViolation("title"));
        }

        let description = description.trim().to_string();
        ensure_non_empty(&description, "description")?;

        let slug = match slug.map(|value| value.trim().to_string()) {
            Some(slug) => {
                validate_slug(&slug)?;
                if self.repos.groups.find_group_by_slug(&slug).await?.is_some() {
                    return Err(AdminError::ConstraintViolation("slug"));
                }
                slug
            }
            None => self.derive_group_slug(&title).await?,
        };

        let group = self
            .repos
            .groups_write
            .create_group(CreateGroupParams {
                title,
                slug,
                description,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AdminError::ConstraintViolation("slug"),
                other => AdminError::Repo(other),
            })?;

        info!(target = SOURCE, group_id = %group.id, slug = %group.slug, "group created");
        Ok(group)
    }

    /// Remove the group. Its posts remain, detached from any group.
    pub async fn delete_group(&self, slug: &str) -> Result<GroupRecord, AdminError> {
        let group = self
            .repos
            .groups
            .find_group_by_slug(slug)
            .await?
            .ok_or(AdminError::NotFound("group"))?;

        self.repos.groups_write.delete_group(group.id).await?;
        info!(target = SOURCE, group_id = %group.id, slug = %group.slug, "group deleted");
        Ok(group)
    }

    pub async fn delete_post(&self, id: Uuid) -> Result<(), AdminError> {
        if self.repos.posts.find_post(id).await?.is_none() {
            return Err(AdminError::NotFound("post"));
        }

        if let Some(image) = self.repos.posts_write.delete_post(id).await? {
            self.discard_image(&image).await;
        }

        info!(target = SOURCE, post_id = %id, "post deleted");
        Ok(())
    }

    async fn derive_group_slug(&self, title: &str) -> Result<String, AdminError> {
        let groups = self.repos.groups.clone();
        let result = generate_unique_slug_async(title, move |candidate| {
            let groups = groups.clone();
            let candidate = candidate.to_string();
            async move {
                groups
                    .find_group_by_slug(&candidate)
                    .await
                    .map(|existing| existing.is_none())
            }
        })
        .await;

        match result {
            Ok(slug) => Ok(slug),
            Err(SlugAsyncError::Slug(err)) => Err(AdminError::Slug(err)),
            Err(SlugAsyncError::Predicate(err)) => Err(AdminError::Repo(err)),
        }
    }

    async fn discard_image(&self, stored_path: &str) {
        if let Err(err) = self.repos.media.remove(stored_path).await {
            warn!(
                target = SOURCE,
                path = %stored_path,
                error = %err,
                "failed to remove stored image"
            );
        }
    }
}

fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), AdminError> {
    if value.trim().is_empty() {
        return Err(AdminError::ConstraintViolation(field));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), AdminError> {
    ensure_non_empty(username, "username")?;

    let valid = username.chars().count() <= USERNAME_MAX_CHARS
        && username
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'));
    if !valid {
        return Err(AdminError::ConstraintViolation("username"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_follow_the_allowed_alphabet() {
        assert!(validate_username("leo.tolstoy+1").is_ok());
        assert!(validate_username("лев_толстой").is_ok());
        assert!(validate_username("two words").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
    }
}
