//! In-process repository adapter.
//!
//! Backs the service when no database URL is configured and drives the test
//! suite. All tables live behind a single lock, so every trait method is one
//! critical section and referential rules hold exactly as they do in Postgres.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::pagination::{Page, PageRequest, paginate};
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, FollowsRepo,
    GroupsRepo, PostQueryFilter, PostsRepo, PostsWriteRepo, RepoError, StoreHealth,
    UpdatePostParams, UsersRepo,
};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::{
    AuthorSummary, CommentRecord, FollowRecord, GroupRecord, GroupSummary, PostRecord, UserRecord,
};

const SOURCE: &str = "infra::memory";

#[derive(Debug, Clone)]
struct PostRow {
    id: i64,
    text: String,
    created_at: OffsetDateTime,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: String,
    created_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Tables {
    sequence: i64,
    last_created: Option<OffsetDateTime>,
    users: BTreeMap<i64, UserRecord>,
    groups: BTreeMap<i64, GroupRecord>,
    posts: BTreeMap<i64, PostRow>,
    comments: BTreeMap<i64, CommentRow>,
    follows: BTreeMap<i64, FollowRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    /// Wall clock, clamped so creation times never run backwards.
    fn now(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let now = self.last_created.map_or(now, |last| now.max(last));
        self.last_created = Some(now);
        now
    }

    fn author_summary(&self, author_id: i64) -> Result<AuthorSummary, RepoError> {
        self.users
            .get(&author_id)
            .map(|user| AuthorSummary {
                id: user.id,
                username: user.username.clone(),
            })
            .ok_or_else(|| RepoError::Integrity {
                message: format!("user {author_id} referenced but missing"),
            })
    }

    fn post_record(&self, row: &PostRow) -> Result<PostRecord, RepoError> {
        let group = row.group_id.and_then(|id| self.groups.get(&id)).map(|group| GroupSummary {
            id: group.id,
            slug: group.slug.clone(),
            title: group.title.clone(),
        });

        Ok(PostRecord {
            id: row.id,
            text: row.text.clone(),
            created_at: row.created_at,
            author: self.author_summary(row.author_id)?,
            group,
            image: row.image.clone(),
        })
    }

    fn comment_record(&self, row: &CommentRow) -> Result<CommentRecord, RepoError> {
        Ok(CommentRecord {
            id: row.id,
            post_id: row.post_id,
            text: row.text.clone(),
            created_at: row.created_at,
            author: self.author_summary(row.author_id)?,
        })
    }

    fn matches(&self, row: &PostRow, filter: &PostQueryFilter) -> bool {
        if filter.group_id.is_some() && row.group_id != filter.group_id {
            return false;
        }
        if filter.author_id.is_some_and(|id| id != row.author_id) {
            return false;
        }
        if let Some(user_id) = filter.followed_by {
            return self
                .follows
                .values()
                .any(|edge| edge.user_id == user_id && edge.author_id == row.author_id);
        }
        true
    }

    /// Filtered rows in listing order.
    fn select_posts(&self, filter: &PostQueryFilter) -> Vec<&PostRow> {
        let mut rows: Vec<&PostRow> = self
            .posts
            .values()
            .filter(|row| self.matches(row, filter))
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows
    }

    fn find_follow(&self, user_id: i64, author_id: i64) -> Option<i64> {
        self.follows
            .values()
            .find(|edge| edge.user_id == user_id && edge.author_id == author_id)
            .map(|edge| edge.id)
    }

    fn remove_post(&mut self, post_id: i64) {
        self.posts.remove(&post_id);
        self.comments.retain(|_, comment| comment.post_id != post_id);
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRepositories {
    tables: RwLock<Tables>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsersRepo for InMemoryRepositories {
    async fn create_user(&self, username: &str) -> Result<UserRecord, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "create_user");
        if tables.users.values().any(|user| user.username == username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let id = tables.next_id();
        let user = UserRecord {
            id,
            username: username.to_string(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(rw_read(&self.tables, SOURCE, "find_user").users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "find_user_by_username");
        Ok(tables
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "delete_user");
        if tables.users.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }

        let authored: Vec<i64> = tables
            .posts
            .values()
            .filter(|post| post.author_id == id)
            .map(|post| post.id)
            .collect();
        for post_id in authored {
            tables.remove_post(post_id);
        }
        tables.comments.retain(|_, comment| comment.author_id != id);
        tables
            .follows
            .retain(|_, edge| edge.user_id != id && edge.author_id != id);
        Ok(())
    }
}

#[async_trait]
impl GroupsRepo for InMemoryRepositories {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "create_group");
        if tables.groups.values().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let id = tables.next_id();
        let group = GroupRecord {
            id,
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        Ok(rw_read(&self.tables, SOURCE, "find_group").groups.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "find_group_by_slug");
        Ok(tables.groups.values().find(|group| group.slug == slug).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "list_groups");
        let mut groups: Vec<GroupRecord> = tables.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn delete_group(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "delete_group");
        if tables.groups.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }
        for post in tables.posts.values_mut() {
            if post.group_id == Some(id) {
                post.group_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for InMemoryRepositories {
    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "list_posts");
        let rows = tables.select_posts(filter);
        paginate(rows, page).try_map(|row| tables.post_record(row))
    }

    async fn count_posts(&self, filter: &PostQueryFilter) -> Result<u64, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "count_posts");
        Ok(tables.select_posts(filter).len() as u64)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "find_post");
        tables
            .posts
            .get(&id)
            .map(|row| tables.post_record(row))
            .transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "create_post");
        if !tables.users.contains_key(&params.author_id) {
            return Err(RepoError::InvalidInput {
                message: format!("author {} does not exist", params.author_id),
            });
        }
        if let Some(group_id) = params.group_id
            && !tables.groups.contains_key(&group_id)
        {
            return Err(RepoError::InvalidInput {
                message: format!("group {group_id} does not exist"),
            });
        }

        let id = tables.next_id();
        let created_at = tables.now();
        let row = PostRow {
            id,
            text: params.text,
            created_at,
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        let record = tables.post_record(&row)?;
        tables.posts.insert(id, row);
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "update_post");
        if let Some(group_id) = params.group_id
            && !tables.groups.contains_key(&group_id)
        {
            return Err(RepoError::InvalidInput {
                message: format!("group {group_id} does not exist"),
            });
        }

        let row = tables.posts.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        row.text = params.text;
        row.group_id = params.group_id;
        row.image = params.image;
        let row = row.clone();
        tables.post_record(&row)
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "delete_post");
        if !tables.posts.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        tables.remove_post(id);
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for InMemoryRepositories {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "create_comment");
        if !tables.posts.contains_key(&params.post_id) {
            return Err(RepoError::InvalidInput {
                message: format!("post {} does not exist", params.post_id),
            });
        }

        let id = tables.next_id();
        let created_at = tables.now();
        let row = CommentRow {
            id,
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text,
            created_at,
        };
        let record = tables.comment_record(&row)?;
        tables.comments.insert(id, row);
        Ok(record)
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "list_comments");
        let mut rows: Vec<&CommentRow> = tables
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows.into_iter()
            .map(|row| tables.comment_record(row))
            .collect()
    }
}

#[async_trait]
impl FollowsRepo for InMemoryRepositories {
    async fn insert_if_absent(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "insert_follow");
        if user_id == author_id || tables.find_follow(user_id, author_id).is_some() {
            return Ok(false);
        }
        if !tables.users.contains_key(&user_id) || !tables.users.contains_key(&author_id) {
            return Err(RepoError::InvalidInput {
                message: format!("follow {user_id} -> {author_id} references a missing user"),
            });
        }

        let id = tables.next_id();
        tables.follows.insert(
            id,
            FollowRecord {
                id,
                user_id,
                author_id,
            },
        );
        Ok(true)
    }

    async fn delete(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "delete_follow");
        Ok(match tables.find_follow(user_id, author_id) {
            Some(id) => tables.follows.remove(&id).is_some(),
            None => false,
        })
    }

    async fn exists(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "follow_exists");
        Ok(tables.find_follow(user_id, author_id).is_some())
    }

    async fn count_followers(&self, author_id: i64) -> Result<u64, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "count_followers");
        Ok(tables
            .follows
            .values()
            .filter(|edge| edge.author_id == author_id)
            .count() as u64)
    }

    async fn count_following(&self, user_id: i64) -> Result<u64, RepoError> {
        let tables = rw_read(&self.tables, SOURCE, "count_following");
        Ok(tables
            .follows
            .values()
            .filter(|edge| edge.user_id == user_id)
            .count() as u64)
    }
}

#[async_trait]
impl StoreHealth for InMemoryRepositories {
    async fn check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (InMemoryRepositories, UserRecord, UserRecord) {
        let store = InMemoryRepositories::new();
        let alice = store.create_user("alice").await.expect("alice");
        let bob = store.create_user("bob").await.expect("bob");
        (store, alice, bob)
    }

    async fn post(store: &InMemoryRepositories, author: &UserRecord, group: Option<i64>) -> PostRecord {
        store
            .create_post(CreatePostParams {
                author_id: author.id,
                text: "text".to_string(),
                group_id: group,
                image: None,
            })
            .await
            .expect("post")
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let (store, _, _) = seeded().await;
        assert!(matches!(
            store.create_user("alice").await,
            Err(RepoError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn followed_filter_only_returns_followed_authors() {
        let (store, alice, bob) = seeded().await;
        let carol = store.create_user("carol").await.expect("carol");
        let by_alice = post(&store, &alice, None).await;
        post(&store, &carol, None).await;

        assert!(store.insert_if_absent(bob.id, alice.id).await.expect("follow"));
        let page = store
            .list_posts(&PostQueryFilter::followed_by(bob.id), PageRequest::first(10))
            .await
            .expect("feed");
        assert_eq!(page.items.iter().map(|p| p.id).collect::<Vec<_>>(), vec![by_alice.id]);
    }

    #[tokio::test]
    async fn insert_if_absent_rejects_duplicates_and_self_loops() {
        let (store, alice, bob) = seeded().await;
        assert!(store.insert_if_absent(bob.id, alice.id).await.expect("first"));
        assert!(!store.insert_if_absent(bob.id, alice.id).await.expect("second"));
        assert!(!store.insert_if_absent(alice.id, alice.id).await.expect("self"));
        assert_eq!(store.count_followers(alice.id).await.expect("count"), 1);
        assert_eq!(store.count_following(alice.id).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn deleting_a_group_keeps_its_posts() {
        let (store, alice, _) = seeded().await;
        let group = store
            .create_group(CreateGroupParams {
                title: "Group".to_string(),
                slug: "grp".to_string(),
                description: String::new(),
            })
            .await
            .expect("group");
        let created = post(&store, &alice, Some(group.id)).await;

        store.delete_group(group.id).await.expect("delete");

        let found = PostsRepo::find_by_id(&store, created.id)
            .await
            .expect("lookup")
            .expect("post survives");
        assert!(found.group.is_none());
    }

    #[tokio::test]
    async fn deleting_a_user_cascades() {
        let (store, alice, bob) = seeded().await;
        let alices = post(&store, &alice, None).await;
        let bobs = post(&store, &bob, None).await;
        store
            .create_comment(CreateCommentParams {
                post_id: bobs.id,
                author_id: alice.id,
                text: "nice".to_string(),
            })
            .await
            .expect("comment");
        store.insert_if_absent(bob.id, alice.id).await.expect("follow");

        store.delete_user(alice.id).await.expect("delete");

        assert!(PostsRepo::find_by_id(&store, alices.id).await.expect("lookup").is_none());
        assert!(store.list_for_post(bobs.id).await.expect("comments").is_empty());
        assert_eq!(store.count_following(bob.id).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn deleting_a_post_removes_its_comments() {
        let (store, alice, _) = seeded().await;
        let created = post(&store, &alice, None).await;
        store
            .create_comment(CreateCommentParams {
                post_id: created.id,
                author_id: alice.id,
                text: "first".to_string(),
            })
            .await
            .expect("comment");

        store.delete_post(created.id).await.expect("delete");
        assert!(store.list_for_post(created.id).await.expect("comments").is_empty());
    }

    #[tokio::test]
    async fn comments_are_listed_newest_first() {
        let (store, alice, bob) = seeded().await;
        let created = post(&store, &alice, None).await;
        for (author, text) in [(&alice, "one"), (&bob, "two")] {
            store
                .create_comment(CreateCommentParams {
                    post_id: created.id,
                    author_id: author.id,
                    text: text.to_string(),
                })
                .await
                .expect("comment");
        }

        let texts: Vec<String> = store
            .list_for_post(created.id)
            .await
            .expect("comments")
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["two", "one"]);
    }
}
