use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("author not found")]
    AuthorNotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Whether a follow or unfollow request changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Changed,
    Unchanged,
}

#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { follows, users }
    }

    pub async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, FollowError> {
        self.follows
            .is_following(user_id, author_id)
            .await
            .map_err(FollowError::from)
    }

    /// Follow `author`. Following oneself or an author already followed is a no-op.
    pub async fn follow(
        &self,
        user_id: i64,
        author: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.author(author).await?;
        if author.id == user_id || self.follows.is_following(user_id, author.id).await? {
            return Ok(FollowOutcome::Unchanged);
        }

        self.follows.create_follow(user_id, author.id).await?;
        info!(target: "yatube::follows", user_id, author_id = author.id, "author followed");
        Ok(FollowOutcome::Changed)
    }

    pub async fn unfollow(
        &self,
        user_id: i64,
        author: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.author(author).await?;
        let removed = self.follows.delete_follows(user_id, author.id).await?;
        if removed == 0 {
            return Ok(FollowOutcome::Unchanged);
        }

        info!(target: "yatube::follows", user_id, author_id = author.id, "author unfollowed");
        Ok(FollowOutcome::Changed)
    }

    async fn author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(FollowError::AuthorNotFound)
    }
}
