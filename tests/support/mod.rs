//! In-memory repositories used by the service and HTTP tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use time::{Duration, OffsetDateTime, macros::datetime};
use tokio::sync::Mutex;
use uuid::Uuid;

use yatube::application::comments::CommentService;
use yatube::application::feed::FeedService;
use yatube::application::follows::FollowService;
use yatube::application::pagination::{PageWindow, Paginator};
use yatube::application::posts::PostService;
use yatube::application::repos::{
    CommentsRepo, CommentsWriteRepo, CreateCommentParams, CreateGroupParams, CreatePostParams,
    CreateUserParams, FollowsRepo, FollowsWriteRepo, GroupsRepo, GroupsWriteRepo, HealthRepo,
    MediaStore, PostScope, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams, UsersRepo,
    UsersWriteRepo,
};
use yatube::domain::entities::{
    CommentListing, CommentRecord, FollowRecord, GroupRecord, GroupSummary, PostListing,
    PostRecord, UserRecord,
};
use yatube::domain::types::Viewer;

/// 1x1 transparent GIF.
pub const TINY_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Default)]
struct State {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
    media: Vec<(String, Bytes)>,
    ticks: i64,
}

impl State {
    /// Strictly increasing timestamps keep ordering deterministic.
    fn next_timestamp(&mut self) -> OffsetDateTime {
        self.ticks += 1;
        datetime!(2025-03-01 12:00 UTC) + Duration::seconds(self.ticks)
    }

    fn listing(&self, post: &PostRecord) -> Result<PostListing, RepoError> {
        let author = self
            .users
            .iter()
            .find(|user| user.id == post.author_id)
            .ok_or_else(|| RepoError::Integrity {
                message: "post author missing".to_string(),
            })?;
        let group = post.group_id.and_then(|id| {
            self.groups.iter().find(|group| group.id == id).map(|group| GroupSummary {
                slug: group.slug.clone(),
                title: group.title.clone(),
            })
        });
        Ok(PostListing {
            post: post.clone(),
            author_username: author.username.clone(),
            group,
        })
    }

    fn in_scope(&self, post: &PostRecord, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(id) => post.group_id == Some(id),
            PostScope::Author(id) => post.author_id == id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|follow| follow.user_id == user_id && follow.author_id == post.author_id),
        }
    }

    fn scoped_newest_first(&self, scope: PostScope) -> Vec<&PostRecord> {
        let mut posts: Vec<&PostRecord> = self
            .posts
            .iter()
            .filter(|post| self.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, username: &str) -> UserRecord {
        self.create_user(CreateUserParams {
            username: username.to_string(),
        })
        .await
        .expect("create user")
    }

    pub async fn add_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        })
        .await
        .expect("create group")
    }

    pub async fn add_post(&self, author: &UserRecord, text: &str) -> PostRecord {
        self.add_post_in(author, text, None).await
    }

    pub async fn add_post_in(
        &self,
        author: &UserRecord,
        text: &str,
        group: Option<&GroupRecord>,
    ) -> PostRecord {
        self.create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id: group.map(|group| group.id),
            image: None,
        })
        .await
        .expect("create post")
    }

    pub async fn add_follow(&self, user: &UserRecord, author: &UserRecord) {
        self.follow(user.id, author.id).await.expect("follow");
    }

    pub async fn post(&self, id: Uuid) -> Option<PostRecord> {
        let state = self.state.lock().await;
        state.posts.iter().find(|post| post.id == id).cloned()
    }

    pub async fn remove_post(&self, id: Uuid) {
        self.delete_post(id).await.expect("delete post");
    }

    pub async fn comment_count(&self) -> usize {
        self.state.lock().await.comments.len()
    }

    pub async fn follow_count(&self) -> usize {
        self.state.lock().await.follows.len()
    }

    pub async fn stored_media(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.media.iter().map(|(path, _)| path.clone()).collect()
    }

    pub fn feed_service(&self, paginator: Paginator) -> FeedService {
        let store = Arc::new(self.clone());
        FeedService::new(store.clone(), store.clone(), store.clone(), store, paginator)
    }

    pub fn post_service(&self) -> PostService {
        let store = Arc::new(self.clone());
        PostService::new(store.clone(), store.clone(), store.clone(), store.clone(), store)
    }

    pub fn comment_service(&self) -> CommentService {
        let store = Arc::new(self.clone());
        CommentService::new(store.clone(), store)
    }

    pub fn follow_service(&self) -> FollowService {
        let store = Arc::new(self.clone());
        FollowService::new(store.clone(), store)
    }
}

pub fn viewer(user: &UserRecord) -> Viewer {
    Viewer::Authenticated(user.clone())
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut users = state.users.clone();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }
}

#[async_trait]
impl UsersWriteRepo for MemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: params.username,
            created_at: state.next_timestamp(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> Result<Vec<String>, RepoError> {
        let mut state = self.state.lock().await;
        if !state.users.iter().any(|user| user.id == id) {
            return Err(RepoError::NotFound);
        }

        let owned: Vec<Uuid> = state
            .posts
            .iter()
            .filter(|post| post.author_id == id)
            .map(|post| post.id)
            .collect();
        let images = state
            .posts
            .iter()
            .filter(|post| post.author_id == id)
            .filter_map(|post| post.image.clone())
            .collect();

        state
            .comments
            .retain(|comment| comment.author_id != id && !owned.contains(&comment.post_id));
        state.posts.retain(|post| post.author_id != id);
        state
            .follows
            .retain(|follow| follow.user_id != id && follow.author_id != id);
        state.users.retain(|user| user.id != id);
        Ok(images)
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn find_group_by_id(&self, id: Uuid) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut groups = state.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }
}

#[async_trait]
impl GroupsWriteRepo for MemoryStore {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: Uuid::new_v4(),
            title: params.title,
            slug: params.slug,
            description: params.description,
            created_at: state.next_timestamp(),
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_group(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let before = state.groups.len();
        state.groups.retain(|group| group.id != id);
        if state.groups.len() == before {
            return Err(RepoError::NotFound);
        }
        for post in state.posts.iter_mut().filter(|post| post.group_id == Some(id)) {
            post.group_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let state = self.state.lock().await;
        Ok(state.scoped_newest_first(scope).len() as u64)
    }

    async fn list_posts(
        &self,
        scope: PostScope,
        window: PageWindow,
    ) -> Result<Vec<PostListing>, RepoError> {
        let state = self.state.lock().await;
        state
            .scoped_newest_first(scope)
            .into_iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .map(|post| state.listing(post))
            .collect()
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<PostListing>, RepoError> {
        let state = self.state.lock().await;
        state
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| state.listing(post))
            .transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let post = PostRecord {
            id: Uuid::new_v4(),
            text: params.text,
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
            created_at: state.next_timestamp(),
        };
        state.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let post = state
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<Option<String>, RepoError> {
        let mut state = self.state.lock().await;
        let index = state
            .posts
            .iter()
            .position(|post| post.id == id)
            .ok_or(RepoError::NotFound)?;
        let post = state.posts.remove(index);
        state.comments.retain(|comment| comment.post_id != id);
        Ok(post.image)
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<CommentListing>, RepoError> {
        let state = self.state.lock().await;
        let mut comments: Vec<&CommentRecord> = state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments
            .into_iter()
            .map(|comment| CommentListing {
                comment: comment.clone(),
                author_username: state
                    .users
                    .iter()
                    .find(|user| user.id == comment.author_id)
                    .map(|user| user.username.clone())
                    .unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl CommentsWriteRepo for MemoryStore {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut state = self.state.lock().await;
        let comment = CommentRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text,
            created_at: state.next_timestamp(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id))
    }

    async fn count_following(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let state = self.state.lock().await;
        Ok(state.follows.iter().filter(|f| f.user_id == user_id).count() as u64)
    }

    async fn count_followers(&self, author_id: Uuid) -> Result<u64, RepoError> {
        let state = self.state.lock().await;
        Ok(state.follows.iter().filter(|f| f.author_id == author_id).count() as u64)
    }
}

#[async_trait]
impl FollowsWriteRepo for MemoryStore {
    async fn follow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        let exists = state
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id);
        if exists {
            return Ok(false);
        }
        let created_at = state.next_timestamp();
        state.follows.push(FollowRecord {
            id: Uuid::new_v4(),
            user_id,
            author_id,
            created_at,
        });
        Ok(true)
    }

    async fn unfollow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        let before = state.follows.len();
        state
            .follows
            .retain(|follow| !(follow.user_id == user_id && follow.author_id == author_id));
        Ok(state.follows.len() != before)
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn store_image(&self, original_name: &str, data: Bytes) -> Result<String, RepoError> {
        let mut state = self.state.lock().await;
        let path = format!("posts/{}-{original_name}", Uuid::new_v4());
        state.media.push((path.clone(), data));
        Ok(path)
    }

    async fn remove(&self, stored_path: &str) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        state.media.retain(|(path, _)| path != stored_path);
        Ok(())
    }
}
