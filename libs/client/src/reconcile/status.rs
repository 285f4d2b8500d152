use super::secret::Projection;
use super::sync::Convergence;

use crate::crd::{KeycloakClient, KeycloakClientStatus};

use keyop_k8s_util::error::{Error, Result};
use keyop_keycloak::ClientDetails;
use keyop_operator::controller::context::Context;
use keyop_operator::controller::namespace_of;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::jiff::Timestamp;
use kube::ResourceExt;
use kube::api::{Api, Patch, PatchParams};
use tracing::{debug, trace};

pub const STATUS_FIELD_MANAGER: &str = "keycloakclients.keyop.rs";

pub const TYPE_EXISTS: &str = "Exists";
pub const TYPE_UPDATED: &str = "Updated";
pub const TYPE_SECRET_INITIALIZED: &str = "SecretInitialized";
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

fn condition(
    kcc: &KeycloakClient,
    type_: &str,
    ok: bool,
    reason: &str,
    message: String,
    now: Timestamp,
) -> Condition {
    let status = if ok { CONDITION_TRUE } else { CONDITION_FALSE };
    // keep the transition time while the condition holds
    let last_transition_time = kcc
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|c| c.iter().find(|c| c.type_ == type_ && c.status == status))
        .map(|c| c.last_transition_time.clone())
        .unwrap_or(Time(now));
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message,
        last_transition_time,
        observed_generation: kcc.metadata.generation,
    }
}

/// Status after a converge pass over `details`.
pub fn generate_status(
    kcc: &KeycloakClient,
    details: &ClientDetails,
    convergence: Convergence,
    projection: Projection,
    now: Timestamp,
) -> KeycloakClientStatus {
    let secret_name = kcc.secret_name();
    let exists = condition(
        kcc,
        TYPE_EXISTS,
        true,
        "Exists",
        format!("Keycloak client {} exists.", details.client.id),
        now,
    );
    let updated = match convergence {
        Convergence::InSync => condition(
            kcc,
            TYPE_UPDATED,
            true,
            "AttributesMatch",
            "Keycloak client exists with desired attributes.".to_string(),
            now,
        ),
        Convergence::Updated => condition(
            kcc,
            TYPE_UPDATED,
            true,
            "AttributesRestored",
            "Keycloak client attributes restored from the domain.".to_string(),
            now,
        ),
    };
    let secret_initialized = condition(
        kcc,
        TYPE_SECRET_INITIALIZED,
        !details.secret.is_empty(),
        match projection {
            Projection::Created => "SecretCreated",
            Projection::Unchanged => "SecretExists",
            Projection::Refreshed => "SecretRefreshed",
            Projection::Recreated => "SecretRecreated",
        },
        if details.secret.is_empty() {
            format!("Secret {secret_name} has no client secret.")
        } else {
            format!("Secret {secret_name} holds the client credentials.")
        },
        now,
    );
    let conditions = vec![exists, updated, secret_initialized];
    let ready = conditions.iter().all(|c| c.status == CONDITION_TRUE);
    KeycloakClientStatus {
        conditions: Some(conditions),
        keycloak_id: Some(details.client.id.clone()),
        client_id: Some(details.client.client_id.clone()),
        secret_name: Some(secret_name),
        ready,
    }
}

/// Apply `status` to the status subresource.
pub async fn update_status(
    kcc: &KeycloakClient,
    ctx: &Context<KeycloakClient>,
    status: KeycloakClientStatus,
) -> Result<()> {
    let namespace = namespace_of(kcc)?;
    let name = kcc.name_any();
    let status_patch = Patch::Apply(KeycloakClient {
        status: Some(status),
        ..KeycloakClient::default()
    });
    debug!(msg = "updating status");
    trace!(msg = format!("status patch {status_patch:?}"));
    let patch = PatchParams::apply(STATUS_FIELD_MANAGER).force();
    let api = Api::<KeycloakClient>::namespaced(ctx.client.clone(), &namespace);
    api.patch_status(&name, &patch, &status_patch)
        .await
        .map_err(|e| {
            ctx.metrics.status_update_errors_inc();
            Error::KubeError(
                format!("failed to patch KeycloakClient/status {namespace}/{name}"),
                Box::new(e),
            )
        })?;
    Ok(())
}
