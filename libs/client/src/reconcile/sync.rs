use crate::crd::DesiredClient;

use keyop_k8s_util::error::{Error, Result};
use keyop_k8s_util::types::same_set;
use keyop_keycloak::resolve::find;
use keyop_keycloak::{Client, ClientApi, ClientDetails, ClientDraft, draft};

use tracing::{debug, info, trace};

pub const DESCRIPTION: &str = "managed by kubernetes operator";

/// Result of comparing a Keycloak client with the configuration derived from its domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    InSync,
    Updated,
}

/// Keycloak client after a sync pass, with the secret.
#[derive(Clone, Debug, PartialEq)]
pub struct Synced {
    pub details: ClientDetails,
    pub convergence: Convergence,
}

fn keycloak_error(context: String) -> impl FnOnce(keyop_keycloak::Error) -> Error {
    move |e| Error::KeycloakError(context, e)
}

/// Find the client of `desired`, or create it with a new secret and `desired.id` as ID.
pub async fn get_or_create<A: ClientApi>(api: &A, desired: &DesiredClient) -> Result<ClientDetails> {
    let realm = &desired.realm;
    if let Some(details) = find(api, realm, &desired.id, &desired.domain)
        .await
        .map_err(keycloak_error(format!(
            "failed to resolve client {} in realm {realm}",
            desired.domain
        )))?
    {
        trace!(msg = "client exists", keycloak_id = details.client.id);
        return Ok(details);
    }

    let draft = ClientDraft {
        id: Some(desired.id.clone()),
        description: DESCRIPTION.to_string(),
        ..draft::generate(&desired.domain).map_err(keycloak_error(format!(
            "failed to generate client {}",
            desired.domain
        )))?
    };
    let id = api
        .create(realm, &draft)
        .await
        .map_err(keycloak_error(format!(
            "failed to create client {} in realm {realm}",
            desired.domain
        )))?;
    info!(msg = "client created", realm, keycloak_id = id);
    api.get(realm, &id).await.map_err(keycloak_error(format!(
        "failed to get created client {id} in realm {realm}"
    )))
}

/// Fields owned by the operator match, ignoring URL list order.
pub fn mostly_the_same(draft: &ClientDraft, client: &Client) -> bool {
    draft.name == client.name
        && draft.root_url == client.root_url
        && draft.admin_url == client.admin_url
        && same_set(&draft.redirect_uris, &client.redirect_uris)
        && same_set(&draft.web_origins, &client.web_origins)
}

/// Restore the operator owned fields of `details` from the domain, keeping its secret, client
/// ID and description.
pub async fn converge<A: ClientApi>(
    api: &A,
    desired: &DesiredClient,
    details: &ClientDetails,
) -> Result<Convergence> {
    let draft = ClientDraft {
        client_secret: details.secret.clone(),
        client_id: details.client.client_id.clone(),
        description: details.client.description.clone(),
        id: None,
        ..draft::template(&desired.domain)
    };
    if mostly_the_same(&draft, &details.client) {
        trace!(msg = "client in sync", keycloak_id = details.client.id);
        return Ok(Convergence::InSync);
    }

    debug!(msg = "client drifted, updating", keycloak_id = details.client.id);
    api.update(&desired.realm, &details.client.id, &draft)
        .await
        .map_err(keycloak_error(format!(
            "failed to update client {} in realm {}",
            details.client.id, desired.realm
        )))?;
    Ok(Convergence::Updated)
}

/// Get or create the client, converge it and return the record the credentials come from.
pub async fn sync<A: ClientApi>(api: &A, desired: &DesiredClient) -> Result<Synced> {
    let details = get_or_create(api, desired).await?;
    let convergence = converge(api, desired, &details).await?;
    let details = match convergence {
        Convergence::InSync => details,
        Convergence::Updated => find(api, &desired.realm, &details.client.id, &desired.domain)
            .await
            .map_err(keycloak_error(format!(
                "failed to resolve updated client {}",
                details.client.id
            )))?
            .ok_or_else(|| {
                Error::MissingData(format!(
                    "client {} disappeared after update",
                    details.client.id
                ))
            })?,
    };
    Ok(Synced {
        details,
        convergence,
    })
}

/// Delete the client of `desired` if it exists. A client already gone is not an error.
pub async fn remove<A: ClientApi>(api: &A, desired: &DesiredClient) -> Result<Option<String>> {
    let realm = &desired.realm;
    let Some(details) = find(api, realm, &desired.id, &desired.domain)
        .await
        .map_err(keycloak_error(format!(
            "failed to resolve client {} in realm {realm}",
            desired.domain
        )))?
    else {
        debug!(msg = "client already removed", realm, domain = desired.domain);
        return Ok(None);
    };

    api.delete(realm, &details.client.id)
        .await
        .map_err(keycloak_error(format!(
            "failed to delete client {} in realm {realm}",
            details.client.id
        )))?;
    info!(msg = "client deleted", realm, keycloak_id = details.client.id);
    Ok(Some(details.client.id))
}
