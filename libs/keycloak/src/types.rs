use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Keycloak client representation as returned by the clients collection endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Client {
    pub id: String,
    pub client_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub admin_url: String,
    pub root_url: String,
    pub base_url: String,
    pub surrogate_auth_required: bool,
    pub enabled: bool,
    pub always_display_in_console: bool,
    pub client_authenticator_type: String,
    pub redirect_uris: Vec<String>,
    pub web_origins: Vec<String>,
    pub not_before: i64,
    pub bearer_only: bool,
    pub consent_required: bool,
    pub standard_flow_enabled: bool,
    pub implicit_flow_enabled: bool,
    pub direct_access_grants_enabled: bool,
    pub service_accounts_enabled: bool,
    pub public_client: bool,
    #[serde(rename = "frontchannelLogout")]
    pub front_channel_logout: bool,
    pub protocol: String,
    pub attributes: BTreeMap<String, String>,
    pub full_scope_allowed: bool,
    pub node_re_registration_timeout: i64,
    pub default_client_scopes: Vec<String>,
    pub optional_client_scopes: Vec<String>,
    pub access: ClientAccess,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ClientAccess {
    pub view: bool,
    pub configure: bool,
    pub manage: bool,
}

/// Single client view. Only this view carries the client secret.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ClientDetails {
    #[serde(flatten)]
    pub client: Client,
    #[serde(default)]
    pub secret: String,
}

/// Fields of a client owned by the operator.
///
/// Empty values are omitted when serialized, so Keycloak keeps whatever it has for them on
/// update.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientDraft {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub client_id: String,
    #[serde(rename = "secret", skip_serializing_if = "String::is_empty", default)]
    pub client_secret: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub root_url: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub admin_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub web_origins: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,
}
