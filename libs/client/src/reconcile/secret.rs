use crate::controller::CONTROLLER_ID;
use crate::crd::{DesiredClient, KeycloakClient};

use keyop_k8s_util::error::{Error, Result};
use keyop_keycloak::{ClientDetails, KeycloakConfig};
use keyop_operator::controller::{INSTANCE_LABEL, MANAGED_BY_LABEL, NAME_LABEL, namespace_of};
use keyop_operator::metrics::ControllerMetrics;

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

pub const CR_LABEL: &str = "keycloak-cr";
pub const ID_LABEL: &str = "keycloak-id";

const SECRET_TYPE: &str = "Opaque";
const LABEL_VALUE_MAX: usize = 63;

/// Credentials an application needs to use its Keycloak client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialArtifact {
    pub client_id: String,
    pub client_secret: String,
    pub realm: String,
    pub realm_url: String,
    pub discovery_url: String,
}

impl CredentialArtifact {
    pub fn new(details: &ClientDetails, desired: &DesiredClient, config: &KeycloakConfig) -> Self {
        Self {
            client_id: details.client.client_id.clone(),
            client_secret: details.secret.clone(),
            realm: desired.realm.clone(),
            realm_url: config.realm_url(&desired.realm),
            discovery_url: config.discovery_url(&desired.realm),
        }
    }

    pub fn data(&self) -> BTreeMap<String, ByteString> {
        [
            ("clientID", &self.client_id),
            ("clientSecret", &self.client_secret),
            ("realm", &self.realm),
            ("realmURL", &self.realm_url),
            ("discoveryURL", &self.discovery_url),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
        .collect()
    }
}

// Object names run up to 253 characters, label values stop at 63 and end alphanumeric.
fn label_value(value: &str) -> String {
    let truncated: String = value.chars().take(LABEL_VALUE_MAX).collect();
    truncated
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Immutable Secret holding `artifact`, owned by `kcc`.
pub fn build(kcc: &KeycloakClient, keycloak_id: &str, artifact: &CredentialArtifact) -> Result<Secret> {
    let name = label_value(&kcc.name_any());
    let labels = BTreeMap::from([
        (NAME_LABEL.to_string(), "keycloak-client".to_string()),
        (INSTANCE_LABEL.to_string(), name.clone()),
        (MANAGED_BY_LABEL.to_string(), format!("keyop-{CONTROLLER_ID}")),
        (CR_LABEL.to_string(), name),
        (ID_LABEL.to_string(), keycloak_id.to_string()),
    ]);
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(kcc.secret_name()),
            namespace: Some(namespace_of(kcc)?),
            owner_references: kcc.controller_owner_ref(&()).map(|oref| vec![oref]),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        type_: Some(SECRET_TYPE.to_string()),
        immutable: Some(true),
        data: Some(artifact.data()),
        ..Secret::default()
    })
}

/// What persisting a credentials Secret took.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    Created,
    /// Same data and metadata already stored, annotations included.
    Unchanged,
    /// Same data, metadata replaced.
    Refreshed,
    /// Data changed: deleted and created again.
    Recreated,
}

fn kube_error(context: String) -> impl FnOnce(kube::Error) -> Error {
    move |e| Error::KubeError(context, Box::new(e))
}

fn same_metadata(current: &Secret, desired: &Secret) -> bool {
    current.metadata.labels == desired.metadata.labels
        && current.metadata.annotations == desired.metadata.annotations
        && current.metadata.owner_references == desired.metadata.owner_references
        && current.immutable == desired.immutable
        && current.type_ == desired.type_
}

/// Persist `secret`. Immutable Secrets only accept data changes by deletion and creation.
pub async fn project(
    api: &Api<Secret>,
    secret: Secret,
    metrics: &ControllerMetrics,
) -> Result<Projection> {
    let name = secret.name_any();
    let namespace = secret.namespace().unwrap_or_default();
    let current = api
        .get_opt(&name)
        .await
        .map_err(kube_error(format!("failed to get Secret {namespace}/{name}")))?;

    let Some(current) = current else {
        api.create(&PostParams::default(), &secret)
            .await
            .map_err(kube_error(format!("failed to create Secret {namespace}/{name}")))?;
        info!(msg = "credentials secret created", secret = name);
        return Ok(Projection::Created);
    };

    if current.data == secret.data {
        if same_metadata(&current, &secret) {
            debug!(msg = "credentials secret up to date", secret = name);
            return Ok(Projection::Unchanged);
        }
        let replacement = Secret {
            metadata: ObjectMeta {
                resource_version: current.resource_version(),
                ..secret.metadata
            },
            ..secret
        };
        api.replace(&name, &PostParams::default(), &replacement)
            .await
            .map_err(kube_error(format!("failed to replace Secret {namespace}/{name}")))?;
        debug!(msg = "credentials secret metadata refreshed", secret = name);
        return Ok(Projection::Refreshed);
    }

    api.delete(&name, &DeleteParams::default())
        .await
        .map_err(kube_error(format!("failed to delete Secret {namespace}/{name}")))?;
    api.create(&PostParams::default(), &secret)
        .await
        .map_err(kube_error(format!("failed to recreate Secret {namespace}/{name}")))?;
    metrics.secret_recreate_inc(&namespace);
    info!(msg = "credentials secret recreated", secret = name);
    Ok(Projection::Recreated)
}
