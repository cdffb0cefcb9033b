//! Post listings, detail pages and author-only editing.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{
    CommentListRecord, CommentsRepo, CreatePostParams, GroupsRepo, PostFilter, PostListRecord,
    PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams, UsersRepo,
};
use crate::domain::entities::{GroupRecord, PostRecord, UserRecord};
use crate::domain::posts::{INVALID_GROUP_MESSAGE, PostDraft, PostInput};
use crate::domain::validation::FieldErrors;
use crate::infra::telemetry::{METRIC_POST_EDIT_DENIED, METRIC_POSTS_CREATED, METRIC_POSTS_UPDATED};
use crate::infra::uploads::{UploadStorage, UploadStorageError};

pub const INVALID_IMAGE_MESSAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post not found")]
    NotFound,
    #[error("invalid post: {0}")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Storage(#[from] UploadStorageError),
}

/// An image file received with a post form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
}

/// What an edit does to the image already attached to a post.
#[derive(Debug, Clone, Default)]
pub enum ImageChange {
    #[default]
    Keep,
    Clear,
    Replace(ImageUpload),
}

/// Outcome of checking whether a visitor may edit a post.
#[derive(Debug, Clone, PartialEq)]
pub enum EditAccess {
    NotFound,
    /// The post exists but belongs to someone else.
    Denied,
    Allowed(PostListRecord),
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostListRecord,
    pub author_post_count: u64,
    pub comments: Vec<CommentListRecord>,
}

#[derive(Clone)]
pub struct PostService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    comments: Arc<dyn CommentsRepo>,
    storage: Arc<UploadStorage>,
    paginator: Paginator,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        comments: Arc<dyn CommentsRepo>,
        storage: Arc<UploadStorage>,
    ) -> Self {
        Self {
            reader,
            writer,
            groups,
            users,
            comments,
            storage,
            paginator: Paginator::default(),
        }
    }

    pub async fn index(&self, page: Option<&str>) -> Result<Page<PostListRecord>, PostError> {
        self.listing(PostFilter::All, page).await
    }

    pub async fn group_feed(
        &self,
        slug: &str,
        page: Option<&str>,
    ) -> Result<(GroupRecord, Page<PostListRecord>), PostError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(PostError::NotFound)?;
        let page = self.listing(PostFilter::Group(group.id), page).await?;
        Ok((group, page))
    }

    pub async fn profile(
        &self,
        username: &str,
        page: Option<&str>,
    ) -> Result<(UserRecord, Page<PostListRecord>), PostError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(PostError::NotFound)?;
        let page = self.listing(PostFilter::Author(author.id), page).await?;
        Ok((author, page))
    }

    /// Posts by every author `user_id` follows.
    pub async fn follow_feed(
        &self,
        user_id: i64,
        page: Option<&str>,
    ) -> Result<Page<PostListRecord>, PostError> {
        self.listing(PostFilter::FollowedBy(user_id), page).await
    }

    pub async fn detail(&self, post_id: i64) -> Result<PostDetail, PostError> {
        let post = self
            .reader
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::NotFound)?;
        let author_post_count = self
            .reader
            .count_posts(PostFilter::Author(post.post.author_id))
            .await?;
        let comments = self.comments.list_for_post(post_id).await?;

        Ok(PostDetail {
            post,
            author_post_count,
            comments,
        })
    }

    /// Groups offered by the post form, ordered by title.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostError> {
        self.groups.list_groups().await.map_err(PostError::from)
    }

    pub async fn create(
        &self,
        author_id: i64,
        input: &PostInput,
        image: Option<ImageUpload>,
    ) -> Result<PostRecord, PostError> {
        let draft = self.validate(input, image.as_ref()).await?;
        let image = match image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };

        let created = self
            .writer
            .create_post(CreatePostParams {
                author_id,
                text: draft.text,
                group_id: draft.group_id,
                image: image.clone(),
            })
            .await;

        let post = match created {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                return Err(err.into());
            }
        };

        counter!(METRIC_POSTS_CREATED).increment(1);
        info!(target: "yatube::posts", post_id = post.id, author_id, "post created");
        Ok(post)
    }

    pub async fn edit_access(&self, viewer_id: i64, post_id: i64) -> Result<EditAccess, PostError> {
        let Some(post) = self.reader.find_by_id(post_id).await? else {
            return Ok(EditAccess::NotFound);
        };

        if post.post.author_id != viewer_id {
            counter!(METRIC_POST_EDIT_DENIED).increment(1);
            info!(target: "yatube::posts", post_id, viewer_id, "post edit denied to non-author");
            return Ok(EditAccess::Denied);
        }

        Ok(EditAccess::Allowed(post))
    }

    /// Apply an author's edit. Author and publication date never change.
    pub async fn update(
        &self,
        existing: &PostRecord,
        input: &PostInput,
        image: ImageChange,
    ) -> Result<PostRecord, PostError> {
        let upload = match &image {
            ImageChange::Replace(upload) => Some(upload),
            ImageChange::Keep | ImageChange::Clear => None,
        };
        let draft = self.validate(input, upload).await?;

        let new_image = match image {
            ImageChange::Keep => existing.image.clone(),
            ImageChange::Clear => None,
            ImageChange::Replace(upload) => Some(self.store_image(upload).await?),
        };

        let updated = self
            .writer
            .update_post(UpdatePostParams {
                id: existing.id,
                text: draft.text,
                group_id: draft.group_id,
                image: new_image.clone(),
            })
            .await;

        let post = match updated {
            Ok(post) => post,
            Err(err) => {
                if new_image != existing.image {
                    self.discard_image(new_image.as_deref()).await;
                }
                return Err(err.into());
            }
        };

        if existing.image != post.image {
            self.discard_image(existing.image.as_deref()).await;
        }

        counter!(METRIC_POSTS_UPDATED).increment(1);
        info!(target: "yatube::posts", post_id = post.id, "post updated");
        Ok(post)
    }

    async fn listing(
        &self,
        filter: PostFilter,
        page: Option<&str>,
    ) -> Result<Page<PostListRecord>, PostError> {
        let total = self.reader.count_posts(filter).await?;
        let window = self.paginator.window(total, page);
        let items = self
            .reader
            .list_posts(filter, window.limit(), window.offset())
            .await?;
        Ok(Page::from_window(items, window))
    }

    async fn validate(
        &self,
        input: &PostInput,
        image: Option<&ImageUpload>,
    ) -> Result<PostDraft, PostError> {
        let mut errors = FieldErrors::new();

        let draft = match PostDraft::parse(input) {
            Ok(draft) => Some(draft),
            Err(err) => {
                errors.merge(err);
                None
            }
        };

        if let Some(group_id) = draft.as_ref().and_then(|draft| draft.group_id)
            && self.groups.find_by_id(group_id).await?.is_none()
        {
            errors.add("group", INVALID_GROUP_MESSAGE);
        }

        if let Some(upload) = image
            && UploadStorage::probe_image(&upload.data).is_err()
        {
            errors.add("image", INVALID_IMAGE_MESSAGE);
        }

        match draft {
            Some(draft) if errors.is_empty() => Ok(draft),
            _ => Err(PostError::Invalid(errors)),
        }
    }

    async fn store_image(&self, upload: ImageUpload) -> Result<String, PostError> {
        let stored = self
            .storage
            .store_image(&upload.file_name, upload.data)
            .await?;
        info!(
            target: "yatube::posts",
            stored_path = %stored.stored_path,
            size_bytes = stored.size_bytes,
            width = stored.width,
            height = stored.height,
            "post image stored"
        );
        Ok(stored.stored_path)
    }

    async fn discard_image(&self, stored_path: Option<&str>) {
        if let Some(path) = stored_path
            && let Err(err) = self.storage.delete(path).await
        {
            warn!(
                target: "yatube::posts",
                stored_path = path,
                error = %err,
                "failed to remove post image"
            );
        }
    }
}
