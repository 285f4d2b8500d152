use crate::api::{ClientApi, Clients};
use crate::config::KeycloakConfig;
use crate::error::{Error, Result};
use crate::types::{Client, ClientDetails, ClientDraft};

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

#[derive(Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Keycloak server handle. Cheap to clone: the HTTP connection pool is shared.
#[derive(Clone)]
pub struct Keycloak {
    config: Arc<KeycloakConfig>,
    http: reqwest::Client,
}

impl Keycloak {
    pub fn new(config: KeycloakConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| Error::request("failed to build HTTP client", e))?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }

    /// Exchange the administrator credentials for a bearer token.
    ///
    /// Never fails: an acquisition error is kept in the session and returned by each call
    /// made through it.
    pub async fn authorize(&self) -> AuthorizedKeycloak {
        let token = self.request_token().await;
        if let Err(e) = &token {
            warn!(msg = "failed to authorize against Keycloak", %e);
        }
        AuthorizedKeycloak {
            keycloak: self.clone(),
            token,
        }
    }

    async fn request_token(&self) -> Result<String> {
        let context = "failed to request Keycloak token";
        trace!(msg = "requesting token", user = self.config.user);
        let form = [
            ("grant_type", "password"),
            ("client_id", self.config.admin_client_id.as_str()),
            ("username", self.config.user.as_str()),
            ("password", self.config.password.as_str()),
        ];
        let response = self
            .http
            .post(self.config.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::request(context, e))?;
        if response.status() != StatusCode::OK {
            return Err(Error::UnexpectedStatus(
                context.to_string(),
                response.status(),
            ));
        }
        let token: TokenResponse = decode(response, context).await?;
        Ok(format!("{} {}", token.token_type, token.access_token))
    }
}

/// Keycloak session scoped to a single reconciliation pass.
pub struct AuthorizedKeycloak {
    keycloak: Keycloak,
    token: Result<String>,
}

impl AuthorizedKeycloak {
    /// Token acquisition error, if any.
    pub fn error(&self) -> Option<&Error> {
        self.token.as_ref().err()
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .map_err(|e| Error::Unauthorized(Box::new(e.clone())))
    }

    async fn send(
        &self,
        request: RequestBuilder,
        expected: StatusCode,
        context: &str,
    ) -> Result<Response> {
        let token = self.token()?;
        let response = request
            .header(AUTHORIZATION, token)
            .send()
            .await
            .map_err(|e| Error::request(context, e))?;
        match response.status() {
            status if status == expected => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::NotFound),
            status => Err(Error::UnexpectedStatus(context.to_string(), status)),
        }
    }

    fn with_body(request: RequestBuilder, draft: &ClientDraft, context: &str) -> Result<RequestBuilder> {
        let body = serde_json::to_vec(draft).map_err(|e| Error::encoding(context, e))?;
        Ok(request.header(CONTENT_TYPE, "application/json").body(body))
    }
}

impl ClientApi for AuthorizedKeycloak {
    async fn get(&self, realm: &str, id: &str) -> Result<ClientDetails> {
        let context = format!("failed to get client {id} in realm {realm}");
        trace!(msg = "get client", realm, id);
        let request = self
            .keycloak
            .http
            .get(self.keycloak.config.client_url(realm, id));
        let response = self.send(request, StatusCode::OK, &context).await?;
        decode(response, &context).await
    }

    async fn clients(&self, realm: &str) -> Result<Clients> {
        let context = format!("failed to list clients in realm {realm}");
        trace!(msg = "list clients", realm);
        let request = self.keycloak.http.get(self.keycloak.config.clients_url(realm));
        let response = self.send(request, StatusCode::OK, &context).await?;
        let list: Vec<Client> = decode(response, &context).await?;
        Ok(Clients::new(list))
    }

    async fn create(&self, realm: &str, draft: &ClientDraft) -> Result<String> {
        let context = format!("failed to create client {} in realm {realm}", draft.client_id);
        debug!(msg = "create client", realm, client_id = draft.client_id);
        let request = Self::with_body(
            self.keycloak.http.post(self.keycloak.config.clients_url(realm)),
            draft,
            &context,
        )?;
        let response = self.send(request, StatusCode::CREATED, &context).await?;
        response
            .headers()
            .get(LOCATION)
            .and_then(|l| l.to_str().ok())
            .and_then(|l| l.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(Error::MissingLocation)
    }

    async fn update(&self, realm: &str, id: &str, draft: &ClientDraft) -> Result<()> {
        let context = format!("failed to update client {id} in realm {realm}");
        debug!(msg = "update client", realm, id);
        let request = Self::with_body(
            self.keycloak.http.put(self.keycloak.config.client_url(realm, id)),
            draft,
            &context,
        )?;
        self.send(request, StatusCode::NO_CONTENT, &context).await?;
        Ok(())
    }

    async fn delete(&self, realm: &str, id: &str) -> Result<()> {
        let context = format!("failed to delete client {id} in realm {realm}");
        debug!(msg = "delete client", realm, id);
        let request = self
            .keycloak
            .http
            .delete(self.keycloak.config.client_url(realm, id));
        self.send(request, StatusCode::NO_CONTENT, &context).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::request(context, e))?;
    serde_json::from_slice(&body).map_err(|e| Error::encoding(context, e))
}
