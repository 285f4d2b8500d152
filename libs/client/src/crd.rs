use keyop_k8s_util::error::{Error, Result};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::{CustomResource, ResourceExt};
#[cfg(feature = "schemars")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The KeycloakClient custom resource definition (CRD) declares an OAuth2 client registered in a
/// Keycloak realm. The operator creates the client, keeps its URLs in sync with the domain and
/// publishes its credentials in a Secret of the same namespace.
/// More info:
/// https://github.com/kubernetes/community/blob/master/contributors/devel/sig-architecture/api-conventions.md#spec-and-status
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[kube(
    category = "keyop",
    group = "keyop.rs",
    version = "v1alpha1",
    kind = "KeycloakClient",
    plural = "keycloakclients",
    singular = "keycloakclient",
    shortname = "kcc",
    namespaced,
    status = "KeycloakClientStatus",
    doc = r#"The Keycloak client custom resource definition (CRD) defines an OAuth2 client
    registered in a Keycloak realm."#,
    printcolumn = r#"{"name":"Realm","type":"string","jsonPath":".spec.realm"}"#,
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.domain"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".status.secretName"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientSpec {
    /// Keycloak realm where the client lives.
    /// This field is immutable and cannot be changed after creation.
    #[cfg_attr(
        feature = "schemars",
        schemars(extend("x-kubernetes-validations" = [{"message": "realm cannot be changed.", "rule": "self == oldSelf"}]))
    )]
    pub realm: String,

    /// Domain of the application. The client ID and name are the domain, and the root, admin,
    /// redirect and web origin URLs are derived from `https://<domain>`.
    #[cfg_attr(feature = "schemars", schemars(length(min = 1)))]
    pub domain: String,

    /// Name of the Secret holding the client credentials. Defaults to the resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// Most recent observed status of the Keycloak client. Read-only.
/// More info:
/// https://github.com/kubernetes/community/blob/master/contributors/devel/sig-architecture/api-conventions.md#spec-and-status
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,

    /// Keycloak internal ID of the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keycloak_id: Option<String>,

    /// OAuth2 client ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    pub ready: bool,
}

/// Keycloak client wanted by a [`KeycloakClient`].
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredClient {
    /// Kubernetes UID of the resource, used as Keycloak ID on creation.
    pub id: String,
    pub realm: String,
    pub domain: String,
}

impl KeycloakClient {
    pub fn desired(&self) -> Result<DesiredClient> {
        let id = self.uid().ok_or_else(|| {
            Error::MissingData(format!("KeycloakClient {} has no UID", self.name_any()))
        })?;
        Ok(DesiredClient {
            id,
            realm: self.spec.realm.clone(),
            domain: self.spec.domain.clone(),
        })
    }

    #[inline]
    pub fn secret_name(&self) -> String {
        self.spec
            .secret_name
            .clone()
            .unwrap_or_else(|| self.name_any())
    }
}
