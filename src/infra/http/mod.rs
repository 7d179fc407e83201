mod auth;
mod middleware;
mod public;

pub use auth::{AuthState, CurrentUser, HeaderAuthenticator, authenticate, require_login};
pub use middleware::{RequestContext, log_responses, set_request_context};
pub use public::build_router;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::{ErrorReport, HttpError};
use crate::application::feed::FeedService;
use crate::application::follow::FollowService;
use crate::application::groups::GroupService;
use crate::application::posts::PostService;
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostsRepo, PostsWriteRepo, RepoError, StoreHealth,
    UsersRepo,
};
use crate::cache::FeedCache;

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::Duplicate { constraint } => {
            HttpError::new(source, StatusCode::CONFLICT, "Duplicate record", constraint)
        }
        RepoError::NotFound => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "resource not found",
        ),
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Integrity { message } => HttpError::new(
            source,
            StatusCode::CONFLICT,
            "Integrity constraint violated",
            message,
        ),
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}

/// Services shared by the request handlers.
#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub follow: Arc<FollowService>,
    pub posts: Arc<PostService>,
    pub groups: Arc<GroupService>,
    pub health: Arc<dyn StoreHealth>,
}

impl HttpState {
    /// Wire every service onto one store that implements all repositories.
    pub fn from_store<S>(store: Arc<S>, page_size: u32) -> Self
    where
        S: UsersRepo
            + GroupsRepo
            + PostsRepo
            + PostsWriteRepo
            + CommentsRepo
            + FollowsRepo
            + StoreHealth
            + 'static,
    {
        let feed = FeedService::new(store.clone(), store.clone(), store.clone(), store.clone())
            .with_page_size(page_size);
        let follow = FollowService::new(store.clone(), store.clone());
        let posts = PostService::new(store.clone(), store.clone(), store.clone(), store.clone());
        let groups = GroupService::new(store.clone());

        Self {
            feed: Arc::new(feed),
            follow: Arc::new(follow),
            posts: Arc::new(posts),
            groups: Arc::new(groups),
            health: store,
        }
    }
}

#[derive(Clone)]
pub struct RouterState {
    pub http: HttpState,
    pub auth: AuthState,
    pub cache: FeedCache,
}

impl FromRef<RouterState> for HttpState {
    fn from_ref(state: &RouterState) -> Self {
        state.http.clone()
    }
}

impl FromRef<RouterState> for AuthState {
    fn from_ref(state: &RouterState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<RouterState> for FeedCache {
    fn from_ref(state: &RouterState) -> Self {
        state.cache.clone()
    }
}
