use clap::Args;

/// Connection settings for the Keycloak admin API.
#[derive(Args, Clone, Debug)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server. Example: "https://keycloak.example.com"
    #[arg(long = "keycloak-url", env = "KEYCLOAK_URL")]
    pub url: String,

    /// Administrator user used for the password grant.
    #[arg(long = "keycloak-user", env = "KEYCLOAK_USER")]
    pub user: String,

    /// Administrator password used for the password grant.
    #[arg(long = "keycloak-password", env = "KEYCLOAK_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Realm where the administrator user lives.
    #[arg(long = "keycloak-admin-realm", env = "KEYCLOAK_ADMIN_REALM", default_value = "master")]
    pub admin_realm: String,

    /// Client ID used for the password grant.
    #[arg(
        long = "keycloak-admin-client-id",
        env = "KEYCLOAK_ADMIN_CLIENT_ID",
        default_value = "admin-cli"
    )]
    pub admin_client_id: String,

    /// Timeout in seconds for every request to Keycloak.
    #[arg(long = "keycloak-timeout", env = "KEYCLOAK_TIMEOUT", default_value_t = 10)]
    pub timeout: u64,
}

impl KeycloakConfig {
    pub fn new(url: &str, user: &str, password: &str) -> Self {
        Self {
            url: url.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            admin_realm: "master".to_string(),
            admin_client_id: "admin-cli".to_string(),
            timeout: 10,
        }
    }

    #[inline]
    fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Public URL of a realm, also the OIDC issuer.
    pub fn realm_url(&self, realm: &str) -> String {
        format!(
            "{}/realms/{}",
            self.base_url(),
            url_escape::encode_component(realm)
        )
    }

    pub fn discovery_url(&self, realm: &str) -> String {
        format!("{}/.well-known/openid-configuration", self.realm_url(realm))
    }

    pub(crate) fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url(&self.admin_realm))
    }

    pub(crate) fn clients_url(&self, realm: &str) -> String {
        format!(
            "{}/admin/realms/{}/clients",
            self.base_url(),
            url_escape::encode_component(realm)
        )
    }

    pub(crate) fn client_url(&self, realm: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.clients_url(realm),
            url_escape::encode_component(id)
        )
    }
}
