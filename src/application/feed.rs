use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::application::pagination::{DEFAULT_PAGE_SIZE, Page, PageRequest};
use crate::application::repos::{
    CommentsRepo, GroupsRepo, PostQueryFilter, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

/// Posts of one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupListing {
    pub group: GroupRecord,
    pub page_obj: Page<PostRecord>,
}

/// Posts of one author plus the author's overall post count.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorListing {
    pub author: UserRecord,
    pub post_count: u64,
    pub page_obj: Page<PostRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: PostRecord,
    pub author_post_count: u64,
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("unknown post {0}")]
    UnknownPost(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Read-only listings over posts. Nothing here mutates the store.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    comments: Arc<dyn CommentsRepo>,
    page_size: u32,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            comments,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Map the raw `?page=` value onto a request using the configured size.
    pub fn page_request(&self, raw: Option<&str>) -> PageRequest {
        PageRequest::from_query(raw, self.page_size)
    }

    pub async fn list_index(&self, page: PageRequest) -> Result<Page<PostRecord>, FeedError> {
        let page = self.posts.list_posts(&PostQueryFilter::all(), page).await?;
        Ok(page)
    }

    pub async fn list_by_group(
        &self,
        slug: &str,
        page: PageRequest,
    ) -> Result<GroupListing, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;

        let page_obj = self
            .posts
            .list_posts(&PostQueryFilter::group(group.id), page)
            .await?;

        Ok(GroupListing { group, page_obj })
    }

    pub async fn list_by_author(
        &self,
        username: &str,
        page: PageRequest,
    ) -> Result<AuthorListing, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))?;

        let filter = PostQueryFilter::author(author.id);
        let page_obj = self.posts.list_posts(&filter, page).await?;

        Ok(AuthorListing {
            author,
            post_count: page_obj.total,
            page_obj,
        })
    }

    /// Posts by every author `user` follows.
    pub async fn list_followed_feed(
        &self,
        user: &UserRecord,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, FeedError> {
        let page = self
            .posts
            .list_posts(&PostQueryFilter::followed_by(user.id), page)
            .await?;
        Ok(page)
    }

    pub async fn post_detail(&self, post_id: i64) -> Result<PostDetail, FeedError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(FeedError::UnknownPost(post_id))?;

        let author_post_count = self
            .posts
            .count_posts(&PostQueryFilter::author(post.author.id))
            .await?;
        let comments = self.comments.list_for_post(post.id).await?;

        Ok(PostDetail {
            post,
            author_post_count,
            comments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{CreateGroupParams, CreatePostParams, PostsWriteRepo};
    use crate::infra::memory::InMemoryRepositories;

    struct Fixture {
        store: Arc<InMemoryRepositories>,
        service: FeedService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRepositories::new());
        let service = FeedService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        Fixture { store, service }
    }

    async fn post(store: &InMemoryRepositories, author: &UserRecord, text: &str) -> PostRecord {
        store
            .create_post(CreatePostParams {
                author_id: author.id,
                text: text.to_string(),
                group_id: None,
                image: None,
            })
            .await
            .expect("create post")
    }

    #[tokio::test]
    async fn index_lists_newest_first() {
        let Fixture { store, service } = fixture();
        let alice = UsersRepo::create_user(store.as_ref(), "alice")
            .await
            .expect("user");
        post(&store, &alice, "first").await;
        post(&store, &alice, "second").await;
        let hello = post(&store, &alice, "Hello").await;

        let page = service
            .list_index(PageRequest::first(10))
            .await
            .expect("index");

        assert_eq!(page.items.first().map(|p| p.id), Some(hello.id));
        let keys: Vec<_> = page.items.iter().map(PostRecord::recency_key).collect();
        let mut sorted = keys.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn group_listing_for_new_group_is_empty() {
        let Fixture { store, service } = fixture();
        let alice = UsersRepo::create_user(store.as_ref(), "alice")
            .await
            .expect("user");
        post(&store, &alice, "Hello").await;
        store
            .create_group(CreateGroupParams {
                title: "Group".to_string(),
                slug: "grp".to_string(),
                description: String::new(),
            })
            .await
            .expect("group");

        let listing = service
            .list_by_group("grp", PageRequest::first(10))
            .await
            .expect("listing");
        assert!(listing.page_obj.is_empty());
    }

    #[tokio::test]
    async fn unknown_group_and_author_are_reported() {
        let Fixture { service, .. } = fixture();
        assert!(matches!(
            service.list_by_group("missing", PageRequest::first(10)).await,
            Err(FeedError::UnknownGroup(_))
        ));
        assert!(matches!(
            service.list_by_author("nobody", PageRequest::first(10)).await,
            Err(FeedError::UnknownAuthor(_))
        ));
        assert!(matches!(
            service.post_detail(42).await,
            Err(FeedError::UnknownPost(42))
        ));
    }

    #[tokio::test]
    async fn author_listing_counts_all_posts() {
        let Fixture { store, service } = fixture();
        let alice = UsersRepo::create_user(store.as_ref(), "alice")
            .await
            .expect("user");
        for n in 0..13 {
            post(&store, &alice, &format!("post {n}")).await;
        }

        let listing = service
            .list_by_author("alice", service.page_request(Some("2")))
            .await
            .expect("listing");
        assert_eq!(listing.post_count, 13);
        assert_eq!(listing.page_obj.len(), 3);
    }
}
