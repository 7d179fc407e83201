//! Caller identity as seen by the request handlers.
//!
//! Sessions and passwords live outside this service. An [`Authenticator`]
//! turns request headers into an optional [`UserRecord`]; handlers read the
//! result from the [`Viewer`] request extension.

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity header is not valid UTF-8")]
    MalformedHeader,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` means an anonymous caller.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserRecord>, AuthError>;
}

/// The resolved caller, inserted into request extensions by the auth layer.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<UserRecord>);

impl Viewer {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.0.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }
}
