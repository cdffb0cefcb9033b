use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::info;

use crate::application::repos::{CommentsRepo, CreateCommentParams, PostsRepo, RepoError};
use crate::domain::entities::CommentRecord;
use crate::domain::posts::CommentDraft;
use crate::domain::validation::FieldErrors;
use crate::infra::telemetry::METRIC_COMMENTS_CREATED;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("post not found")]
    PostNotFound,
    #[error("invalid comment: {0}")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentsRepo>,
    posts: Arc<dyn PostsRepo>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentsRepo>, posts: Arc<dyn PostsRepo>) -> Self {
        Self { comments, posts }
    }

    pub async fn add(
        &self,
        post_id: i64,
        author_id: i64,
        text: &str,
    ) -> Result<CommentRecord, CommentError> {
        if self.posts.find_by_id(post_id).await?.is_none() {
            return Err(CommentError::PostNotFound);
        }
        let draft = CommentDraft::parse(text).map_err(CommentError::Invalid)?;

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id,
                author_id,
                text: draft.text,
            })
            .await?;

        counter!(METRIC_COMMENTS_CREATED).increment(1);
        info!(
            target: "yatube::comments",
            comment_id = comment.id,
            post_id,
            author_id,
            "comment added"
        );
        Ok(comment)
    }
}
