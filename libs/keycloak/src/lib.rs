pub mod api;
pub mod config;
pub mod draft;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod resolve;
pub mod session;
pub mod types;

pub use self::api::{ClientApi, Clients};
pub use self::config::KeycloakConfig;
pub use self::error::{Error, NotFoundExt, Result};
pub use self::session::{AuthorizedKeycloak, Keycloak};
pub use self::types::{Client, ClientDetails, ClientDraft};
