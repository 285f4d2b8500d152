use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the Keycloak admin client.
///
/// The type is `Clone` because an [`AuthorizedKeycloak`](crate::AuthorizedKeycloak) keeps the
/// token acquisition error and hands it back on every call made through the session.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The requested resource does not exist in Keycloak.
    #[error("client not found")]
    NotFound,

    #[error("{0}: {1}")]
    Request(String, #[source] Arc<reqwest::Error>),

    #[error("{0}: unexpected status {1}")]
    UnexpectedStatus(String, StatusCode),

    #[error("{0}: {1}")]
    Encoding(String, #[source] Arc<serde_json::Error>),

    #[error("created client has no location header")]
    MissingLocation,

    #[error("authorization failed: {0}")]
    Unauthorized(#[source] Box<Error>),

    #[error("failed to generate client secret: {0}")]
    Entropy(String),

    #[error("{0}")]
    Inconsistent(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    pub(crate) fn request(context: impl Into<String>, e: reqwest::Error) -> Self {
        Error::Request(context.into(), Arc::new(e))
    }

    pub(crate) fn encoding(context: impl Into<String>, e: serde_json::Error) -> Self {
        Error::Encoding(context.into(), Arc::new(e))
    }
}

/// Turns the [`Error::NotFound`] signal into `Ok(None)` so callers branch on presence with a
/// `match` instead of inspecting errors.
pub trait NotFoundExt<T> {
    fn found(self) -> Result<Option<T>>;
}

impl<T> NotFoundExt<T> for Result<T> {
    fn found(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
