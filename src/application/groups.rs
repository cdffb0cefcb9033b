use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::error::DomainError;
use crate::domain::groups::GroupDraft;
use crate::domain::slug::{SlugAsyncError, generate_unique_slug_async};
use crate::domain::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("invalid group: {0}")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
}

/// Group administration. Groups have no web form; they are managed from the CLI.
#[derive(Clone)]
pub struct GroupService {
    repo: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(repo: Arc<dyn GroupsRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<GroupRecord>, GroupError> {
        self.repo.list_groups().await.map_err(GroupError::from)
    }

    pub async fn create(&self, cmd: CreateGroupCommand) -> Result<GroupRecord, GroupError> {
        let draft = GroupDraft::parse(&cmd.title, cmd.slug.as_deref(), &cmd.description)
            .map_err(GroupError::Invalid)?;

        let slug = match draft.slug {
            Some(slug) => {
                if self.repo.find_by_slug(&slug).await?.is_some() {
                    return Err(GroupError::Invalid(FieldErrors::single(
                        "slug",
                        "Group with this Slug already exists.",
                    )));
                }
                slug
            }
            None => {
                let repo = self.repo.clone();
                match generate_unique_slug_async(&draft.title, move |candidate| {
                    let repo = repo.clone();
                    let candidate = candidate.to_string();
                    async move {
                        repo.find_by_slug(&candidate)
                            .await
                            .map(|existing| existing.is_none())
                    }
                })
                .await
                {
                    Ok(slug) => slug,
                    Err(SlugAsyncError::Slug(err)) => {
                        return Err(GroupError::Invalid(FieldErrors::single(
                            "slug",
                            err.to_string(),
                        )));
                    }
                    Err(SlugAsyncError::Predicate(err)) => return Err(GroupError::Repo(err)),
                }
            }
        };

        let group = self
            .repo
            .create_group(CreateGroupParams {
                title: draft.title,
                slug,
                description: draft.description,
            })
            .await?;

        info!(target: "yatube::groups", group_id = group.id, slug = %group.slug, "group created");
        Ok(group)
    }

    /// Delete a group by slug. Its posts stay, without a group.
    pub async fn delete(&self, slug: &str) -> Result<GroupRecord, GroupError> {
        let group = self
            .repo
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::not_found("group"))?;
        self.repo.delete_group(group.id).await?;

        info!(target: "yatube::groups", group_id = group.id, slug = %group.slug, "group deleted");
        Ok(group)
    }
}
