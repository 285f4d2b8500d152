use crate::api::ClientApi;
use crate::error::{Error, NotFoundExt, Result};
use crate::types::ClientDetails;

use tracing::trace;

/// Locate the client of a resource: by Keycloak ID first, then by display name.
///
/// The result always comes from the single client view, so it carries the secret.
pub async fn find<A: ClientApi>(
    api: &A,
    realm: &str,
    id: &str,
    name: &str,
) -> Result<Option<ClientDetails>> {
    if let Some(details) = api.get(realm, id).await.found()? {
        trace!(msg = "client found by id", realm, id);
        return Ok(Some(details));
    }

    let clients = api.clients(realm).await?;
    let Some(listed) = clients.by_name(name) else {
        trace!(msg = "client not found", realm, id, name);
        return Ok(None);
    };

    trace!(msg = "client found by name", realm, name, keycloak_id = listed.id);
    match api.get(realm, &listed.id).await.found()? {
        Some(details) if details.client.name == name => Ok(Some(details)),
        Some(details) => Err(Error::Inconsistent(format!(
            "client {} listed as {name} in realm {realm} is now named {}",
            listed.id, details.client.name
        ))),
        None => Err(Error::Inconsistent(format!(
            "client {} listed as {name} in realm {realm} disappeared",
            listed.id
        ))),
    }
}
