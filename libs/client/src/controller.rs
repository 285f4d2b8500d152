use crate::crd::KeycloakClient;
use crate::reconcile::reconcile_keycloak_client;

use keyop_operator::backoff_reconciler;
use keyop_operator::controller::{
    ControllerId, MANAGED_BY_LABEL, State, check_api_queryable, error_policy,
};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::client::Client;
use kube::runtime::controller::{self, Controller};
use kube::runtime::watcher;
use tokio::time::Duration;
use tracing::{error, info};

pub const CONTROLLER_ID: ControllerId = "keycloak-client";

/// Initialize the KeycloakClient controller and run it until shutdown
pub async fn run(state: State, client: Client) {
    let kcc = check_api_queryable::<KeycloakClient>(client.clone()).await;
    let secrets = Api::<Secret>::all(client.clone());

    let ctx = match state.to_context::<KeycloakClient>(client, CONTROLLER_ID) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!(msg = format!("failed to start {CONTROLLER_ID} controller"), %e);
            return;
        }
    };

    info!(msg = format!("starting {CONTROLLER_ID} controller"));
    let managed_by = format!("{MANAGED_BY_LABEL}=keyop-{CONTROLLER_ID}");
    let kcc_controller = Controller::new(kcc, watcher::Config::default().any_semantic())
        .owns(secrets, watcher::Config::default().labels(&managed_by))
        // debounce to filter out reconcile calls that happen quick succession (only taking the latest)
        .with_config(controller::Config::default().debounce(Duration::from_millis(500)))
        .shutdown_on_signal()
        .run(
            backoff_reconciler!(reconcile_keycloak_client),
            error_policy,
            ctx.clone(),
        )
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()));

    ctx.metrics.ready_set(1);
    kcc_controller.await;
    ctx.metrics.ready_set(0);
}
