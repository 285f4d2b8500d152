use super::{ControllerId, DEFAULT_RECONCILE_INTERVAL};

use crate::metrics::ControllerMetrics;

use keyop_k8s_util::error::{Error, Result};
use keyop_keycloak::Keycloak;

use std::collections::HashMap;
use std::sync::Arc;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use kube::client::Client;
use kube::runtime::events::{Event, EventType, Recorder};
use kube::runtime::reflector::{Lookup, ObjectRef};
use kube::{Resource, ResourceExt};
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::{trace, warn};

const MIN_BACKOFF: Duration = Duration::from_secs(1);

// Context for our reconciler
#[derive(Clone)]
pub struct Context<K: Resource> {
    /// Controller ID
    pub controller_id: ControllerId,
    /// Kubernetes client
    pub client: Client,
    /// Controller metrics
    pub metrics: Arc<ControllerMetrics>,
    /// Event recorder
    pub recorder: Recorder,
    /// Keycloak admin API handle, authorized once per reconciliation
    pub keycloak: Keycloak,
    /// State of the error backoff policy per object
    error_backoff_cache: Arc<RwLock<HashMap<ObjectRef<K>, RwLock<ExponentialBackoff>>>>,
}

impl<K> Context<K>
where
    K: Resource + Lookup + Clone + 'static,
    <K as Lookup>::DynamicType: Eq + std::hash::Hash + Clone,
{
    pub fn new(
        controller_id: ControllerId,
        client: Client,
        metrics: Arc<ControllerMetrics>,
        recorder: Recorder,
        keycloak: Keycloak,
    ) -> Self {
        Self {
            controller_id,
            client,
            metrics,
            recorder,
            keycloak,
            error_backoff_cache: Arc::default(),
        }
    }
}

impl<K> Context<K>
where
    K: Resource<DynamicType = ()> + ResourceExt + Lookup + Clone + 'static,
    <K as Lookup>::DynamicType: Eq + std::hash::Hash + Clone,
{
    /// Publish a `Warning` event on `obj`.
    pub async fn publish_warning(
        &self,
        obj: &K,
        reason: &str,
        action: &str,
        note: String,
    ) -> Result<()> {
        self.recorder
            .publish(
                &Event {
                    type_: EventType::Warning,
                    reason: reason.to_string(),
                    note: Some(note),
                    action: action.to_string(),
                    secondary: None,
                },
                &obj.object_ref(&()),
            )
            .await
            .map_err(|e| {
                warn!(msg = format!("failed to publish {reason} event"), %e);
                Error::KubeError("failed to publish event".to_string(), Box::new(e))
            })
    }
}

#[allow(async_fn_in_trait)]
pub trait BackoffContext<K: Resource> {
    fn metrics(&self) -> &Arc<ControllerMetrics>;
    async fn get_backoff(&self, obj_ref: ObjectRef<K>) -> Duration;
    async fn reset_backoff(&self, obj_ref: ObjectRef<K>);
}

impl<K> BackoffContext<K> for Context<K>
where
    K: Resource<DynamicType = ()> + ResourceExt + Lookup + Clone + 'static,
    <K as Lookup>::DynamicType: Eq + std::hash::Hash + Clone,
{
    fn metrics(&self) -> &Arc<ControllerMetrics> {
        &self.metrics
    }

    /// Return next duration of the backoff policy for the given object
    async fn get_backoff(&self, obj_ref: ObjectRef<K>) -> Duration {
        {
            let read_guard = self.error_backoff_cache.read().await;
            if let Some(backoff) = read_guard.get(&obj_ref) {
                if let Some(duration) = backoff.write().await.next() {
                    return duration;
                }
            }
        }

        // Backoff policy: 1s, 2s, 4s, 8s, 16s, 32s, 60s, 60s...
        let mut backoff = ExponentialBuilder::default()
            .with_min_delay(MIN_BACKOFF)
            .with_max_delay(DEFAULT_RECONCILE_INTERVAL)
            .without_max_times()
            .build();
        let duration = backoff.next().unwrap_or(MIN_BACKOFF);
        self.error_backoff_cache
            .write()
            .await
            .insert(obj_ref.clone(), RwLock::new(backoff));
        trace!(
            msg = "recreate backoff policy",
            namespace = obj_ref.namespace.as_deref().unwrap_or_default(),
            name = obj_ref.name,
        );
        duration
    }

    /// Reset the backoff policy for the given object
    async fn reset_backoff(&self, obj_ref: ObjectRef<K>) {
        let read_guard = self.error_backoff_cache.read().await;
        if read_guard.get(&obj_ref).is_some() {
            drop(read_guard);
            trace!(
                msg = "reset backoff policy",
                namespace = obj_ref.namespace.as_deref().unwrap_or_default(),
                name = obj_ref.name
            );
            self.error_backoff_cache.write().await.remove(&obj_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackoffContext, Context};

    use crate::metrics::ControllerMetrics;

    use keyop_keycloak::{Keycloak, KeycloakConfig};

    use std::sync::Arc;

    use http::{Request, Response};
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::client::{Body, Client};
    use kube::runtime::events::Recorder;
    use kube::runtime::reflector::ObjectRef;
    use tokio::time::Duration;

    fn context() -> Context<ConfigMap> {
        let (mock_service, _handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let meter = opentelemetry::global::meter("test");
        let keycloak =
            Keycloak::new(KeycloakConfig::new("http://keycloak.test", "admin", "admin")).unwrap();
        Context::new(
            "test",
            client.clone(),
            Arc::new(ControllerMetrics::new("test", &meter)),
            Recorder::new(client, "test".into()),
            keycloak,
        )
    }

    #[tokio::test]
    async fn test_backoff_grows_and_resets() {
        let ctx = context();
        let obj_ref = ObjectRef::<ConfigMap>::new("demo").within("default");

        let durations = [
            ctx.get_backoff(obj_ref.clone()).await,
            ctx.get_backoff(obj_ref.clone()).await,
            ctx.get_backoff(obj_ref.clone()).await,
        ];
        assert_eq!(
            durations,
            [
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );

        let other = ObjectRef::<ConfigMap>::new("other").within("default");
        assert_eq!(ctx.get_backoff(other).await, Duration::from_secs(1));

        ctx.reset_backoff(obj_ref.clone()).await;
        assert_eq!(ctx.get_backoff(obj_ref).await, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let ctx = context();
        let obj_ref = ObjectRef::<ConfigMap>::new("demo").within("default");
        let mut last = Duration::ZERO;
        for _ in 0..12 {
            last = ctx.get_backoff(obj_ref.clone()).await;
        }
        assert_eq!(last, Duration::from_secs(60));
    }
}
