//! Follow graph between users.
//!
//! The edge set never contains a self-loop or a duplicate pair. Creation goes
//! through a single conditional insert in the store so concurrent requests
//! cannot race a check against an insert.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

pub const FOLLOW_CREATED_TOTAL: &str = "yatube_follow_created_total";

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Result of a follow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    SelfFollow,
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

    /// False for anonymous viewers and for a viewer looking at themselves.
    pub async fn is_following(
        &self,
        viewer: Option<&UserRecord>,
        author: &UserRecord,
    ) -> Result<bool, FollowError> {
        let Some(viewer) = viewer else {
            return Ok(false);
        };
        if viewer.id == author.id {
            return Ok(false);
        }
        Ok(self.follows.exists(viewer.id, author.id).await?)
    }

    pub async fn follow(
        &self,
        user: &UserRecord,
        author: &UserRecord,
    ) -> Result<FollowOutcome, FollowError> {
        if user.id == author.id {
            debug!(user = %user, "ignoring self-follow");
            return Ok(FollowOutcome::SelfFollow);
        }

        if self.follows.insert_if_absent(user.id, author.id).await? {
            counter!(FOLLOW_CREATED_TOTAL).increment(1);
            info!(follower = %user, author = %author, "follow created");
            Ok(FollowOutcome::Created)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    /// Returns whether an edge was removed. Missing edges are not an error.
    pub async fn unfollow(
        &self,
        user: &UserRecord,
        author: &UserRecord,
    ) -> Result<bool, FollowError> {
        let removed = self.follows.delete(user.id, author.id).await?;
        if removed {
            info!(follower = %user, author = %author, "follow removed");
        }
        Ok(removed)
    }

    pub async fn follow_username(
        &self,
        user: &UserRecord,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.resolve_author(username).await?;
        self.follow(user, &author).await
    }

    pub async fn unfollow_username(
        &self,
        user: &UserRecord,
        username: &str,
    ) -> Result<bool, FollowError> {
        let author = self.resolve_author(username).await?;
        self.unfollow(user, &author).await
    }

    pub async fn follower_counts(&self, user: &UserRecord) -> Result<(u64, u64), FollowError> {
        let followers = self.follows.count_followers(user.id).await?;
        let following = self.follows.count_following(user.id).await?;
        Ok((followers, following))
    }

    async fn resolve_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}
