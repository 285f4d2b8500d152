use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}: {1}")]
    KeycloakError(String, #[source] keyop_keycloak::Error),

    #[error("{0}: {1:?}")]
    KubeError(String, #[source] Box<kube::Error>),

    #[error("{0}: {1}")]
    FormattingError(String, #[source] std::fmt::Error),

    #[error("{0}")]
    MissingData(String),

    #[error("{0}: {1}")]
    SerializationError(String, #[source] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_keycloak_error_display() {
        let e = Error::KeycloakError(
            "failed to resolve client".to_string(),
            keyop_keycloak::Error::MissingLocation,
        );
        assert_eq!(
            e.to_string(),
            "failed to resolve client: created client has no location header"
        );
        assert!(std::error::Error::source(&e).is_some());
    }
}
