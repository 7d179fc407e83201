//! Request identity and the login guard.
//!
//! `authenticate` runs on every request and records a [`Viewer`]. Routes that
//! need a signed-in caller sit behind `require_login`, which sends anonymous
//! callers to the login page with a `next` continuation.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, HeaderName, Request, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::application::auth::{AuthError, Authenticator, Viewer};
use crate::application::error::HttpError;
use crate::application::repos::{RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

use super::repo_error_to_http;

const MAX_USERNAME_LEN: usize = 150;

#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<dyn Authenticator>,
    pub login_url: Arc<str>,
}

impl AuthState {
    pub fn new(authenticator: Arc<dyn Authenticator>, login_url: impl Into<Arc<str>>) -> Self {
        Self {
            authenticator,
            login_url: login_url.into(),
        }
    }

    /// `{login_url}?next=<path and query>` with `/` left readable.
    pub fn login_redirect(&self, next: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(next.as_bytes())
            .collect::<String>()
            .replace("%2F", "/");
        let separator = if self.login_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}next={encoded}", self.login_url)
    }
}

/// Trusts a username forwarded by the fronting proxy and provisions a local
/// user row on first sight.
pub struct HeaderAuthenticator {
    header: HeaderName,
    users: Arc<dyn UsersRepo>,
}

impl HeaderAuthenticator {
    pub fn new(header: HeaderName, users: Arc<dyn UsersRepo>) -> Self {
        Self { header, users }
    }

    async fn find_or_create(&self, username: &str) -> Result<UserRecord, RepoError> {
        if let Some(user) = self.users.find_by_username(username).await? {
            return Ok(user);
        }
        match self.users.create_user(username).await {
            Ok(user) => {
                debug!(user = %user, "provisioned user from identity header");
                Ok(user)
            }
            // A concurrent request provisioned the same name first.
            Err(RepoError::Duplicate { .. }) => self
                .users
                .find_by_username(username)
                .await?
                .ok_or(RepoError::NotFound),
            Err(err) => Err(err),
        }
    }
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserRecord>, AuthError> {
        let Some(value) = headers.get(&self.header) else {
            return Ok(None);
        };
        let username = value
            .to_str()
            .map_err(|_| AuthError::MalformedHeader)?
            .trim();
        if username.is_empty() {
            return Ok(None);
        }
        if !is_valid_username(username) {
            return Err(AuthError::MalformedHeader);
        }

        Ok(Some(self.find_or_create(username).await?))
    }
}

pub async fn authenticate(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let viewer = match auth.authenticator.authenticate(request.headers()).await {
        Ok(user) => Viewer(user),
        Err(AuthError::MalformedHeader) => {
            warn!(path = %request.uri().path(), "ignoring malformed identity header");
            Viewer::anonymous()
        }
        Err(AuthError::Repo(err)) => {
            return repo_error_to_http("infra::http::auth::authenticate", err).into_response();
        }
    };

    request.extensions_mut().insert(viewer);
    next.run(request).await
}

pub async fn require_login(
    State(auth): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let signed_in = request
        .extensions()
        .get::<Viewer>()
        .is_some_and(Viewer::is_authenticated);
    if signed_in {
        return next.run(request).await;
    }

    let next_target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::to(&auth.login_redirect(next_target)).into_response()
}

/// The signed-in user; only used on routes behind `require_login`.
pub struct CurrentUser(pub UserRecord);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Viewer>()
            .and_then(|viewer| viewer.user().cloned())
            .map(CurrentUser)
            .ok_or_else(|| {
                HttpError::new(
                    "infra::http::auth::CurrentUser",
                    StatusCode::UNAUTHORIZED,
                    "Authentication required",
                    "route reached without a signed-in viewer",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::InMemoryRepositories;

    struct Nobody;

    #[async_trait]
    impl Authenticator for Nobody {
        async fn authenticate(&self, _: &HeaderMap) -> Result<Option<UserRecord>, AuthError> {
            Ok(None)
        }
    }

    #[test]
    fn login_redirect_keeps_slashes_and_escapes_query() {
        let auth = AuthState::new(Arc::new(Nobody), "/auth/login/");
        assert_eq!(auth.login_redirect("/create/"), "/auth/login/?next=/create/");
        assert_eq!(
            auth.login_redirect("/follow/?page=2"),
            "/auth/login/?next=/follow/%3Fpage%3D2"
        );
    }

    #[test]
    fn login_redirect_appends_to_existing_query() {
        let auth = AuthState::new(Arc::new(Nobody), "https://sso.example/login?app=yatube");
        assert_eq!(
            auth.login_redirect("/create/"),
            "https://sso.example/login?app=yatube&next=/create/"
        );
    }

    #[tokio::test]
    async fn header_authenticator_provisions_once() {
        let store = Arc::new(InMemoryRepositories::new());
        let auth = HeaderAuthenticator::new(HeaderName::from_static("x-remote-user"), store.clone());

        let mut headers = HeaderMap::new();
        headers.insert("x-remote-user", "alice".parse().expect("header"));

        let first = auth.authenticate(&headers).await.expect("auth").expect("user");
        let second = auth.authenticate(&headers).await.expect("auth").expect("user");
        assert_eq!(first.id, second.id);
        assert_eq!(first.username, "alice");
    }

    #[tokio::test]
    async fn missing_or_invalid_header_is_not_a_user() {
        let store = Arc::new(InMemoryRepositories::new());
        let auth = HeaderAuthenticator::new(HeaderName::from_static("x-remote-user"), store);

        assert!(auth.authenticate(&HeaderMap::new()).await.expect("auth").is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-remote-user", "bad name".parse().expect("header"));
        assert!(matches!(
            auth.authenticate(&headers).await,
            Err(AuthError::MalformedHeader)
        ));
    }
}
