//! Post and comment authoring.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, PostRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::posts::normalize_body;

const INVALID_GROUP_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// Submitted post fields, exactly as they arrive from the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    /// Group id; blank means "no group".
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl PostForm {
    pub fn from_post(post: &PostRecord) -> Self {
        Self {
            text: post.text.clone(),
            group: post.group.as_ref().map(|group| group.id.to_string()),
            image: post.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

/// Field name to messages, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<&'static str, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    fn absorb(&mut self, error: DomainError) -> Result<(), DomainError> {
        match error {
            DomainError::Validation { field, message } => {
                self.add(field, message);
                Ok(())
            }
            other => Err(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post {0} not found")]
    NotFound(i64),
    #[error("user `{editor}` may not edit post {post_id}")]
    Forbidden { post_id: i64, editor: String },
    #[error("form is invalid")]
    Invalid(FormErrors),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Validated post fields ready to persist.
struct CleanPost {
    text: String,
    group_id: Option<i64>,
    image: Option<String>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
        }
    }

    pub async fn create_post(
        &self,
        author: &UserRecord,
        form: &PostForm,
    ) -> Result<PostRecord, PostError> {
        let clean = self.clean_post(form).await?;
        let post = self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                text: clean.text,
                group_id: clean.group_id,
                image: clean.image,
            })
            .await?;
        info!(post = %post, post_id = post.id, author = %author, "post created");
        Ok(post)
    }

    /// Load a post for editing, refusing anyone but its author.
    pub async fn editable_post(
        &self,
        editor: &UserRecord,
        post_id: i64,
    ) -> Result<PostRecord, PostError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::NotFound(post_id))?;

        if !post.is_authored_by(editor) {
            return Err(PostError::Forbidden {
                post_id,
                editor: editor.username.clone(),
            });
        }
        Ok(post)
    }

    pub async fn edit_post(
        &self,
        editor: &UserRecord,
        post_id: i64,
        form: &PostForm,
    ) -> Result<PostRecord, PostError> {
        let post = self.editable_post(editor, post_id).await?;
        let clean = self.clean_post(form).await?;
        let updated = self
            .writer
            .update_post(UpdatePostParams {
                id: post.id,
                text: clean.text,
                group_id: clean.group_id,
                image: clean.image.or(post.image),
            })
            .await?;
        info!(post = %updated, post_id = updated.id, "post updated");
        Ok(updated)
    }

    pub async fn add_comment(
        &self,
        author: &UserRecord,
        post_id: i64,
        form: &CommentForm,
    ) -> Result<CommentRecord, PostError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::NotFound(post_id))?;

        let mut errors = FormErrors::default();
        let text = match normalize_body("text", &form.text) {
            Ok(text) => Some(text),
            Err(err) => {
                errors.absorb(err)?;
                None
            }
        };
        let Some(text) = text else {
            return Err(PostError::Invalid(errors));
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;
        info!(comment = %comment, post_id = post.id, author = %author, "comment added");
        Ok(comment)
    }

    async fn clean_post(&self, form: &PostForm) -> Result<CleanPost, PostError> {
        let mut errors = FormErrors::default();

        let text = match normalize_body("text", &form.text) {
            Ok(text) => text,
            Err(err) => {
                errors.absorb(err)?;
                String::new()
            }
        };

        let group_id = match form.group.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let found = match raw.parse::<i64>() {
                    Ok(id) => self.groups.find_by_id(id).await?.map(|group| group.id),
                    Err(_) => None,
                };
                if found.is_none() {
                    errors.add("group", INVALID_GROUP_CHOICE);
                }
                found
            }
        };

        if !errors.is_empty() {
            return Err(PostError::Invalid(errors));
        }

        let image = form
            .image
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(CleanPost {
            text,
            group_id,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{CreateGroupParams, UsersRepo};
    use crate::infra::memory::InMemoryRepositories;

    async fn setup() -> (Arc<InMemoryRepositories>, PostService, UserRecord) {
        let store = Arc::new(InMemoryRepositories::new());
        let author = store.create_user("auth").await.expect("user");
        let service = PostService::new(store.clone(), store.clone(), store.clone(), store.clone());
        (store, service, author)
    }

    fn form(text: &str, group: Option<&str>) -> PostForm {
        PostForm {
            text: text.to_string(),
            group: group.map(str::to_string),
            image: None,
        }
    }

    #[tokio::test]
    async fn create_post_attaches_group() {
        let (store, service, author) = setup().await;
        let group = store
            .create_group(CreateGroupParams {
                title: "Тестовая группа".to_string(),
                slug: "test-slug".to_string(),
                description: String::new(),
            })
            .await
            .expect("group");

        let post = service
            .create_post(&author, &form("Тестовый текст", Some(&group.id.to_string())))
            .await
            .expect("post");

        assert_eq!(post.text, "Тестовый текст");
        assert_eq!(post.group.map(|g| g.slug), Some("test-slug".to_string()));
        assert_eq!(post.author.username, "auth");
    }

    #[tokio::test]
    async fn blank_text_and_unknown_group_are_field_errors() {
        let (store, service, author) = setup().await;

        let err = service
            .create_post(&author, &form("   ", Some("999")))
            .await
            .expect_err("invalid form");

        let PostError::Invalid(errors) = err else {
            panic!("expected validation failure, got {err:?}");
        };
        assert_eq!(errors.field("text"), ["This field is required."]);
        assert_eq!(errors.field("group"), [INVALID_GROUP_CHOICE]);
        assert_eq!(
            store.count_posts(&Default::default()).await.expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn non_author_cannot_edit() {
        let (store, service, author) = setup().await;
        let other = store.create_user("other").await.expect("user");
        let post = service
            .create_post(&author, &form("original", None))
            .await
            .expect("post");

        let err = service
            .edit_post(&other, post.id, &form("hijacked", None))
            .await
            .expect_err("forbidden");
        assert!(matches!(err, PostError::Forbidden { post_id, .. } if post_id == post.id));

        let stored = PostsRepo::find_by_id(store.as_ref(), post.id)
            .await
            .expect("lookup")
            .expect("post exists");
        assert_eq!(stored.text, "original");
    }

    #[tokio::test]
    async fn author_edit_keeps_id_and_updates_text() {
        let (_, service, author) = setup().await;
        let post = service
            .create_post(&author, &form("original", None))
            .await
            .expect("post");

        let edited = service
            .edit_post(&author, post.id, &form("changed", None))
            .await
            .expect("edited");
        assert_eq!(edited.id, post.id);
        assert_eq!(edited.text, "changed");
        assert_eq!(edited.created_at, post.created_at);
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_not_found() {
        let (_, service, author) = setup().await;
        let err = service
            .add_comment(&author, 7, &CommentForm { text: "hi".into() })
            .await
            .expect_err("missing post");
        assert!(matches!(err, PostError::NotFound(7)));
    }

    #[tokio::test]
    async fn blank_comment_persists_nothing() {
        let (store, service, author) = setup().await;
        let post = service
            .create_post(&author, &form("post", None))
            .await
            .expect("post");

        let err = service
            .add_comment(&author, post.id, &CommentForm { text: " ".into() })
            .await
            .expect_err("blank comment");
        assert!(matches!(err, PostError::Invalid(_)));
        assert!(store.list_for_post(post.id).await.expect("list").is_empty());
    }
}
