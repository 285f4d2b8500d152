use keyop_k8s_util::error::{Error, Result};

use std::fmt::Debug;

use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

pub const FINALIZER: &str = "keyop.rs/keycloak-client";

/// Whether the object carries our finalizer, and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizerState {
    Absent,
    Present { index: usize },
}

impl FinalizerState {
    pub fn of<K: Resource>(obj: &K) -> Self {
        obj.finalizers()
            .iter()
            .position(|f| f == FINALIZER)
            .map_or(FinalizerState::Absent, |index| FinalizerState::Present { index })
    }
}

/// Step a reconciliation takes, from deletion intent and finalizer state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Deleting an object we track: remove the remote client, then release the object.
    Cleanup { index: usize },
    /// Deleting an object we never tracked.
    Ignore,
    /// First sight of the object: add the finalizer, then converge.
    Admit,
    Converge,
}

impl Transition {
    pub fn of<K: Resource>(obj: &K) -> Self {
        match (
            obj.meta().deletion_timestamp.is_some(),
            FinalizerState::of(obj),
        ) {
            (true, FinalizerState::Present { index }) => Transition::Cleanup { index },
            (true, FinalizerState::Absent) => Transition::Ignore,
            (false, FinalizerState::Absent) => Transition::Admit,
            (false, FinalizerState::Present { .. }) => Transition::Converge,
        }
    }
}

fn json_patch(value: serde_json::Value) -> Result<json_patch::Patch> {
    serde_json::from_value(value)
        .map_err(|e| Error::SerializationError("failed to build finalizer patch".to_string(), e))
}

/// Patch appending the finalizer, guarded by a test on the current list.
pub fn add_patch<K: Resource>(obj: &K) -> Result<json_patch::Patch> {
    let value = match &obj.meta().finalizers {
        None => json!([
            {"op": "test", "path": "/metadata/finalizers", "value": null},
            {"op": "add", "path": "/metadata/finalizers", "value": [FINALIZER]},
        ]),
        Some(finalizers) => json!([
            {"op": "test", "path": "/metadata/finalizers", "value": finalizers},
            {"op": "add", "path": "/metadata/finalizers/-", "value": FINALIZER},
        ]),
    };
    json_patch(value)
}

/// Patch removing the finalizer at `index`, guarded by a test on its value.
pub fn remove_patch(index: usize) -> Result<json_patch::Patch> {
    let path = format!("/metadata/finalizers/{index}");
    json_patch(json!([
        {"op": "test", "path": path, "value": FINALIZER},
        {"op": "remove", "path": path},
    ]))
}

async fn patch<K>(api: &Api<K>, obj: &K, patch: json_patch::Patch, context: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let name = obj.name_any();
    api.patch(&name, &PatchParams::default(), &Patch::Json::<()>(patch))
        .await
        .map_err(|e| {
            Error::KubeError(
                format!(
                    "failed to {context} finalizer of {}/{name}",
                    obj.namespace().unwrap_or_default()
                ),
                Box::new(e),
            )
        })?;
    Ok(())
}

pub async fn add<K>(api: &Api<K>, obj: &K) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    debug!(msg = "adding finalizer");
    patch(api, obj, add_patch(obj)?, "add").await
}

pub async fn remove<K>(api: &Api<K>, obj: &K, index: usize) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    debug!(msg = "removing finalizer");
    patch(api, obj, remove_patch(index)?, "remove").await
}
