//! Feed assembly: which posts a viewer sees for a given view, in what order.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::pagination::{Page, PageNumber, Paginator};
use crate::application::repos::{
    FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{GroupRecord, PostListing, UserRecord};
use crate::domain::types::{FollowStatus, Viewer};

const SOURCE: &str = "yatube::application::feed";

/// The view a feed is assembled for.
#[derive(Debug, Clone, Copy)]
pub enum FeedKind<'a> {
    Global,
    Group(&'a str),
    Author(&'a str),
    Followed(&'a Viewer),
}

/// The entity a resolved feed is about.
#[derive(Debug, Clone)]
pub enum FeedSubject {
    Global,
    Group(GroupRecord),
    Author(UserRecord),
    /// Feed of authors followed by this user.
    Followed(UserRecord),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("authentication required")]
    AuthenticationRequired,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GlobalFeed {
    pub page: Page<PostListing>,
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostListing>,
}

#[derive(Debug, Clone)]
pub struct AuthorFeed {
    pub author: UserRecord,
    pub post_count: u64,
    pub follower_count: u64,
    pub follow_status: FollowStatus,
    pub page: Page<PostListing>,
}

#[derive(Debug, Clone)]
pub struct FollowedFeed {
    pub viewer: UserRecord,
    /// How many authors the viewer follows.
    pub follow_count: u64,
    pub page: Page<PostListing>,
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    paginator: Paginator,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        paginator: Paginator,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            paginator,
        }
    }

    /// Resolve a feed kind to the storage scope and the entity it describes.
    pub async fn resolve(
        &self,
        kind: FeedKind<'_>,
    ) -> Result<(PostScope, FeedSubject), FeedError> {
        match kind {
            FeedKind::Global => Ok((PostScope::All, FeedSubject::Global)),
            FeedKind::Group(slug) => {
                let group = self
                    .groups
                    .find_group_by_slug(slug)
                    .await?
                    .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;
                Ok((PostScope::Group(group.id), FeedSubject::Group(group)))
            }
            FeedKind::Author(username) => {
                let author = self.find_author(username).await?;
                Ok((PostScope::Author(author.id), FeedSubject::Author(author)))
            }
            FeedKind::Followed(viewer) => {
                let user = viewer.user().ok_or(FeedError::AuthenticationRequired)?;
                Ok((
                    PostScope::FollowedBy(user.id),
                    FeedSubject::Followed(user.clone()),
                ))
            }
        }
    }

    /// Load one page of posts for the scope, newest first.
    pub async fn page(
        &self,
        scope: PostScope,
        page: PageNumber,
    ) -> Result<Page<PostListing>, FeedError> {
        let total = self.posts.count_posts(scope).await?;
        let window = self.paginator.window(total, page);

        let items = if window.limit == 0 {
            Vec::new()
        } else {
            self.posts.list_posts(scope, window).await?
        };

        debug!(
            target = SOURCE,
            scope = ?scope,
            page = window.meta.number,
            total_items = total,
            returned = items.len(),
            "feed page loaded"
        );

        Ok(Page {
            items,
            meta: window.meta,
        })
    }

    pub async fn feed(
        &self,
        kind: FeedKind<'_>,
        page: PageNumber,
    ) -> Result<(FeedSubject, Page<PostListing>), FeedError> {
        let (scope, subject) = self.resolve(kind).await?;
        let page = self.page(scope, page).await?;
        Ok((subject, page))
    }

    pub async fn global_feed(&self, page: PageNumber) -> Result<GlobalFeed, FeedError> {
        let (_, page) = self.feed(FeedKind::Global, page).await?;
        Ok(GlobalFeed { page })
    }

    pub async fn group_feed(&self, slug: &str, page: PageNumber) -> Result<GroupFeed, FeedError> {
        match self.feed(FeedKind::Group(slug), page).await? {
            (FeedSubject::Group(group), page) => Ok(GroupFeed { group, page }),
            _ => Err(FeedError::UnknownGroup(slug.to_string())),
        }
    }

    pub async fn author_feed(
        &self,
        username: &str,
        viewer: &Viewer,
        page: PageNumber,
    ) -> Result<AuthorFeed, FeedError> {
        let (FeedSubject::Author(author), page) =
            self.feed(FeedKind::Author(username), page).await?
        else {
            return Err(FeedError::UnknownAuthor(username.to_string()));
        };
        let post_count = page.meta.total_items;
        let follower_count = self.follows.count_followers(author.id).await?;
        let follow_status = follow_status(self.follows.as_ref(), viewer, &author).await?;

        Ok(AuthorFeed {
            author,
            post_count,
            follower_count,
            follow_status,
            page,
        })
    }

    pub async fn followed_feed(
        &self,
        viewer: &Viewer,
        page: PageNumber,
    ) -> Result<FollowedFeed, FeedError> {
        let (scope, subject) = self.resolve(FeedKind::Followed(viewer)).await?;
        let FeedSubject::Followed(user) = subject else {
            return Err(FeedError::AuthenticationRequired);
        };

        let page = self.page(scope, page).await?;
        let follow_count = self.follows.count_following(user.id).await?;

        Ok(FollowedFeed {
            viewer: user,
            follow_count,
            page,
        })
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, FeedError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))
    }
}

/// Describe how `viewer` relates to `author`.
pub async fn follow_status(
    follows: &dyn FollowsRepo,
    viewer: &Viewer,
    author: &UserRecord,
) -> Result<FollowStatus, RepoError> {
    let Some(user) = viewer.user() else {
        return Ok(FollowStatus::Anonymous);
    };

    if user.id == author.id {
        return Ok(FollowStatus::OwnProfile);
    }

    if follows.is_following(user.id, author.id).await? {
        Ok(FollowStatus::Following)
    } else {
        Ok(FollowStatus::NotFollowing)
    }
}
