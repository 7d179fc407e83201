//! Group administration used by the operator CLI.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async, validate_slug};

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("group slug `{0}` is already taken")]
    SlugTaken(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for GroupError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(err) => GroupError::Slug(err),
            SlugAsyncError::Predicate(err) => GroupError::Repo(err),
        }
    }
}

#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupsRepo>) -> Self {
        Self { groups }
    }

    /// Create a group. Without an explicit slug one is derived from the title.
    pub async fn create_group(
        &self,
        title: &str,
        slug: Option<&str>,
        description: &str,
    ) -> Result<GroupRecord, GroupError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SlugError::EmptyInput.into());
        }

        let slug = match slug {
            Some(slug) => {
                validate_slug(slug)?;
                if self.groups.find_by_slug(slug).await?.is_some() {
                    return Err(GroupError::SlugTaken(slug.to_string()));
                }
                slug.to_string()
            }
            None => {
                let groups = self.groups.clone();
                generate_unique_slug_async(title, move |candidate| {
                    let groups = groups.clone();
                    let candidate = candidate.to_string();
                    async move {
                        let existing = groups.find_by_slug(&candidate).await?;
                        Ok::<bool, RepoError>(existing.is_none())
                    }
                })
                .await?
            }
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title: title.to_string(),
                slug,
                description: description.trim().to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => GroupError::SlugTaken(title.to_string()),
                other => GroupError::Repo(other),
            })?;

        info!(group = %group, slug = %group.slug, "group created");
        Ok(group)
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, GroupError> {
        Ok(self.groups.list_groups().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::InMemoryRepositories;

    fn service() -> GroupService {
        GroupService::new(Arc::new(InMemoryRepositories::new()))
    }

    #[tokio::test]
    async fn derives_slug_and_suffixes_collisions() {
        let service = service();
        let first = service
            .create_group("Book Club", None, "")
            .await
            .expect("first");
        let second = service
            .create_group("Book Club", None, "")
            .await
            .expect("second");

        assert_eq!(first.slug, "book-club");
        assert_eq!(second.slug, "book-club-2");
    }

    #[tokio::test]
    async fn explicit_slug_must_be_canonical_and_free() {
        let service = service();
        service
            .create_group("Group", Some("grp"), "desc")
            .await
            .expect("created");

        assert!(matches!(
            service.create_group("Other", Some("grp"), "").await,
            Err(GroupError::SlugTaken(slug)) if slug == "grp"
        ));
        assert!(matches!(
            service.create_group("Other", Some("Not A Slug"), "").await,
            Err(GroupError::Slug(SlugError::Malformed { .. }))
        ));
    }
}
