//! Repository traits describing persistence adapters.
//!
//! Every handler reaches storage through these traits. Implementations own the
//! referential actions of the data model:
//!
//! * deleting a user deletes their posts, comments, follow edges and sessions;
//! * deleting a group clears `group_id` on its posts;
//! * deleting a post clears `post_id` on its comments.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{
    CommentRecord, FollowRecord, GroupRecord, PostRecord, SessionRecord, UserRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Which posts a listing covers. Every listing is ordered newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Group(i64),
    Author(i64),
    /// Posts by the authors this user follows.
    FollowedBy(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
}

/// A post joined with the names needed to display it.
#[derive(Debug, Clone, PartialEq)]
pub struct PostListRecord {
    pub post: PostRecord,
    pub author_username: String,
    pub group: Option<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentListRecord {
    pub comment: CommentRecord,
    pub author_username: String,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct CreateGroupParams {
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub author_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

/// Editable post fields. Author and publication date are never updated.
#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub user_id: i64,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub expires_at: OffsetDateTime,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn delete_user(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait GroupsRepo: Send + Sync {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError>;

    /// All groups ordered by title.
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError>;

    async fn delete_group(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn list_posts(
        &self,
        filter: PostFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PostListRecord>, RepoError>;

    async fn count_posts(&self, filter: PostFilter) -> Result<u64, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<PostListRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    async fn delete_post(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    async fn create_comment(&self, params: CreateCommentParams)
    -> Result<CommentRecord, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<CommentRecord>, RepoError>;

    /// Comments on a post, oldest first.
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentListRecord>, RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    async fn create_follow(&self, user_id: i64, author_id: i64)
    -> Result<FollowRecord, RepoError>;

    /// Remove every `user_id → author_id` edge, returning how many were removed.
    async fn delete_follows(&self, user_id: i64, author_id: i64) -> Result<u64, RepoError>;

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn create_session(&self, params: CreateSessionParams)
    -> Result<SessionRecord, RepoError>;

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError>;

    async fn delete_session(&self, prefix: &str) -> Result<(), RepoError>;
}

/// Storage liveness check used by the health endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
