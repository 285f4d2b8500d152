pub mod finalizer;
pub mod secret;
pub mod status;
pub mod sync;

use self::finalizer::Transition;
use self::secret::CredentialArtifact;

use crate::crd::KeycloakClient;

use keyop_k8s_util::error::{Error, Result};
use keyop_operator::controller::context::Context;
use keyop_operator::controller::{DEFAULT_RECONCILE_INTERVAL, namespace_of};
use keyop_operator::telemetry;

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::jiff::Timestamp;
use kube::api::Api;
use kube::runtime::controller::Action;
use tracing::{Span, debug, field, info, instrument, trace, warn};

#[instrument(skip(ctx, kcc), fields(trace_id))]
pub async fn reconcile_keycloak_client(
    kcc: Arc<KeycloakClient>,
    ctx: Arc<Context<KeycloakClient>>,
) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile_count_and_measure(&trace_id);

    let namespace = namespace_of(kcc.as_ref())?;
    let api = Api::<KeycloakClient>::namespaced(ctx.client.clone(), &namespace);
    match Transition::of(kcc.as_ref()) {
        Transition::Ignore => {
            trace!(msg = "deleted before being tracked, nothing to clean up");
            Ok(Action::await_change())
        }
        Transition::Cleanup { index } => {
            info!(msg = "cleaning up keycloak client");
            cleanup(&kcc, &ctx).await?;
            finalizer::remove(&api, kcc.as_ref(), index).await?;
            Ok(Action::await_change())
        }
        Transition::Admit => {
            finalizer::add(&api, kcc.as_ref()).await?;
            apply(&kcc, &ctx).await
        }
        Transition::Converge => apply(&kcc, &ctx).await,
    }
}

async fn cleanup(kcc: &KeycloakClient, ctx: &Context<KeycloakClient>) -> Result<()> {
    let desired = kcc.desired()?;
    let keycloak = ctx.keycloak.authorize().await;
    sync::remove(&keycloak, &desired).await?;
    Ok(())
}

async fn apply(kcc: &KeycloakClient, ctx: &Context<KeycloakClient>) -> Result<Action> {
    match converge(kcc, ctx).await {
        Err(e @ Error::KeycloakError(..)) => {
            if let Err(event_error) = ctx
                .publish_warning(kcc, "KeycloakError", "KeycloakRequest", format!("{e:?}"))
                .await
            {
                warn!(msg = "failed to publish warning event", %event_error);
            }
            Err(e)
        }
        result => result,
    }
}

async fn converge(kcc: &KeycloakClient, ctx: &Context<KeycloakClient>) -> Result<Action> {
    debug!(msg = "reconciling keycloak client");
    let desired = kcc.desired()?;
    let keycloak = ctx.keycloak.authorize().await;
    let synced = sync::sync(&keycloak, &desired).await?;

    let artifact = CredentialArtifact::new(&synced.details, &desired, ctx.keycloak.config());
    let secret = secret::build(kcc, &synced.details.client.id, &artifact)?;
    let secrets = Api::<Secret>::namespaced(ctx.client.clone(), &namespace_of(kcc)?);
    let projection = secret::project(&secrets, secret, &ctx.metrics).await?;

    let status = status::generate_status(
        kcc,
        &synced.details,
        synced.convergence,
        projection,
        Timestamp::now(),
    );
    status::update_status(kcc, ctx, status).await?;
    Ok(Action::requeue(DEFAULT_RECONCILE_INTERVAL))
}

#[cfg(test)]
mod test {
    use super::reconcile_keycloak_client;
    use super::finalizer::FINALIZER;
    use super::secret::{self, CredentialArtifact};

    use crate::crd::{KeycloakClient, KeycloakClientSpec, KeycloakClientStatus};

    use keyop_k8s_util::error::Error;
    use keyop_keycloak::{Client as KeycloakRecord, ClientDetails, Keycloak, KeycloakConfig};
    use keyop_operator::controller::DEFAULT_RECONCILE_INTERVAL;
    use keyop_operator::controller::context::Context;
    use keyop_operator::metrics::ControllerMetrics;

    use std::sync::Arc;

    use http::{Request, Response};
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use k8s_openapi::jiff::Timestamp;
    use kube::api::ObjectMeta;
    use kube::client::{Body, Client};
    use kube::runtime::controller::Action;
    use kube::runtime::events::Recorder;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UID: &str = "3f1c9a1e";
    const TOKEN_PATH: &str = "/realms/master/protocol/openid-connect/token";
    const CLIENTS_PATH: &str = "/admin/realms/test/clients";

    impl KeycloakClient {
        /// A normal test client with our finalizer
        pub fn test() -> Self {
            KeycloakClient {
                metadata: ObjectMeta {
                    name: Some("demo".to_string()),
                    namespace: Some("default".to_string()),
                    uid: Some(UID.to_string()),
                    finalizers: Some(vec![FINALIZER.to_string()]),
                    ..ObjectMeta::default()
                },
                spec: KeycloakClientSpec {
                    realm: "test".to_string(),
                    domain: "demo.example.com".to_string(),
                    secret_name: None,
                },
                status: None,
            }
        }

        /// Modify the client to drop the finalizer
        pub fn untracked(mut self) -> Self {
            self.metadata.finalizers = None;
            self
        }

        /// Modify the client to set a deletion timestamp
        pub fn needs_delete(mut self) -> Self {
            self.metadata.deletion_timestamp = Some(Time(Timestamp::UNIX_EPOCH));
            self
        }
    }

    fn record() -> ClientDetails {
        let url = "https://demo.example.com".to_string();
        ClientDetails {
            client: KeycloakRecord {
                id: UID.to_string(),
                client_id: "demo.example.com".to_string(),
                name: "demo.example.com".to_string(),
                description: "managed by kubernetes operator".to_string(),
                root_url: url.clone(),
                admin_url: url.clone(),
                redirect_uris: vec![format!("{url}/*")],
                web_origins: vec![url],
                enabled: true,
                ..KeycloakRecord::default()
            },
            secret: "s3cr3t".to_string(),
        }
    }

    // We wrap tower_test::mock::Handle
    type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
    pub struct ApiServerVerifier(ApiServerHandle);

    /// Scenarios we test for in ApiServerVerifier
    pub enum Scenario {
        /// Finalizer added, then the secret created and the status patched
        Admit(KeycloakClient),
        /// Secret already up to date, only the status patched
        Converge(KeycloakClient, Secret),
        /// Only the finalizer removed
        Cleanup(KeycloakClient),
        /// Warning event published
        KeycloakError,
        /// Warning event rejected by the API server
        EventRejected,
    }

    pub async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("timeout on mock apiserver")
            .expect("scenario succeeded")
    }

    impl ApiServerVerifier {
        /// Tests only get to run specific scenarios that has matching handlers
        ///
        /// NB: If the reconciler is making more calls than we are handling in the scenario,
        /// you then typically see a `KubeError(Service(Closed(())))` from the reconciler.
        pub fn run(self, scenario: Scenario) -> tokio::task::JoinHandle<()> {
            tokio::spawn(async move {
                match scenario {
                    Scenario::Admit(kcc) => {
                        self.handle_finalizer_add()
                            .await
                            .handle_secret_get(None)
                            .await
                            .handle_secret_create()
                            .await
                            .handle_status_patch(kcc)
                            .await
                    }
                    Scenario::Converge(kcc, secret) => {
                        self.handle_secret_get(Some(secret))
                            .await
                            .handle_status_patch(kcc)
                            .await
                    }
                    Scenario::Cleanup(kcc) => self.handle_finalizer_remove(kcc).await,
                    Scenario::KeycloakError => self.handle_event_create().await,
                    Scenario::EventRejected => self.handle_event_create_rejected().await,
                };
            })
        }

        async fn handle_finalizer_add(mut self) -> Self {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::PATCH);
            assert_eq!(
                request.uri().path(),
                "/apis/keyop.rs/v1alpha1/namespaces/default/keycloakclients/demo"
            );
            let req_body = request.into_body().collect_bytes().await.unwrap();
            let json: serde_json::Value =
                serde_json::from_slice(&req_body).expect("patch object is json");
            assert_eq!(
                json,
                json!([
                    {"op": "test", "path": "/metadata/finalizers", "value": null},
                    {"op": "add", "path": "/metadata/finalizers", "value": [FINALIZER]},
                ])
            );
            let response = serde_json::to_vec(&KeycloakClient::test()).unwrap();
            send.send_response(Response::builder().body(Body::from(response)).unwrap());
            self
        }

        async fn handle_finalizer_remove(mut self, kcc: KeycloakClient) -> Self {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::PATCH);
            let req_body = request.into_body().collect_bytes().await.unwrap();
            let json: serde_json::Value =
                serde_json::from_slice(&req_body).expect("patch object is json");
            assert_eq!(
                json,
                json!([
                    {"op": "test", "path": "/metadata/finalizers/0", "value": FINALIZER},
                    {"op": "remove", "path": "/metadata/finalizers/0"},
                ])
            );
            let response = serde_json::to_vec(&kcc.untracked()).unwrap();
            send.send_response(Response::builder().body(Body::from(response)).unwrap());
            self
        }

        async fn handle_secret_get(mut self, secret: Option<Secret>) -> Self {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::GET);
            assert_eq!(request.uri().path(), "/api/v1/namespaces/default/secrets/demo");
            let response = match secret {
                Some(secret) => Response::builder()
                    .body(Body::from(serde_json::to_vec(&secret).unwrap()))
                    .unwrap(),
                None => Response::builder()
                    .status(404)
                    .body(Body::from(
                        serde_json::to_vec(&json!({
                            "kind": "Status",
                            "apiVersion": "v1",
                            "metadata": {},
                            "status": "Failure",
                            "message": "secrets \"demo\" not found",
                            "reason": "NotFound",
                            "code": 404
                        }))
                        .unwrap(),
                    ))
                    .unwrap(),
            };
            send.send_response(response);
            self
        }

        async fn handle_secret_create(mut self) -> Self {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::POST);
            assert_eq!(request.uri().path(), "/api/v1/namespaces/default/secrets");
            let req_body = request.into_body().collect_bytes().await.unwrap();
            let secret: Secret = serde_json::from_slice(&req_body).expect("valid secret");
            assert_eq!(secret.immutable, Some(true));
            let data = secret.data.clone().unwrap();
            assert_eq!(data["clientID"].0, b"demo.example.com");
            assert_eq!(data["clientSecret"].0, b"s3cr3t");
            assert_eq!(data["realm"].0, b"test");
            send.send_response(Response::builder().body(Body::from(req_body.to_vec())).unwrap());
            self
        }

        async fn handle_status_patch(mut self, kcc: KeycloakClient) -> Self {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::PATCH);
            assert_eq!(
                request.uri().to_string(),
                "/apis/keyop.rs/v1alpha1/namespaces/default/keycloakclients/demo/status?&force=true&fieldManager=keycloakclients.keyop.rs"
            );
            let req_body = request.into_body().collect_bytes().await.unwrap();
            let json: serde_json::Value =
                serde_json::from_slice(&req_body).expect("patch object is json");
            let status: KeycloakClientStatus =
                serde_json::from_value(json.get("status").unwrap().clone())
                    .expect("valid keycloak client status");
            assert!(status.ready);
            assert_eq!(status.keycloak_id.as_deref(), Some(UID));
            assert_eq!(status.secret_name.as_deref(), Some("demo"));
            let response = serde_json::to_vec(&KeycloakClient {
                status: Some(status),
                ..kcc
            })
            .unwrap();
            send.send_response(Response::builder().body(Body::from(response)).unwrap());
            self
        }

        async fn handle_event_create(mut self) -> Self {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::POST);
            assert_eq!(
                request.uri().path(),
                "/apis/events.k8s.io/v1/namespaces/default/events"
            );
            let req_body = request.into_body().collect_bytes().await.unwrap();
            let json: serde_json::Value =
                serde_json::from_slice(&req_body).expect("event is json");
            assert_eq!(json["type"], "Warning");
            assert_eq!(json["reason"], "KeycloakError");
            send.send_response(Response::builder().body(Body::from(req_body.to_vec())).unwrap());
            self
        }

        async fn handle_event_create_rejected(mut self) -> Self {
            let (request, send) = self.0.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::POST);
            let response = serde_json::to_vec(&json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": "events is forbidden",
                "reason": "Forbidden",
                "code": 403
            }))
            .unwrap();
            send.send_response(
                Response::builder()
                    .status(403)
                    .body(Body::from(response))
                    .unwrap(),
            );
            self
        }
    }

    fn get_test_context(server: &MockServer) -> (Arc<Context<KeycloakClient>>, ApiServerVerifier) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let mock_client = Client::new(mock_service, "default");
        let keycloak = Keycloak::new(KeycloakConfig::new(&server.uri(), "admin", "password")).unwrap();
        let meter = opentelemetry::global::meter("test");
        let ctx = Context::new(
            "test",
            mock_client.clone(),
            Arc::new(ControllerMetrics::new("test", &meter)),
            Recorder::new(mock_client, "test".into()),
            keycloak,
        );
        (Arc::new(ctx), ApiServerVerifier(handle))
    }

    async fn mount_token(server: &MockServer, status: u16) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "token_type": "Bearer",
                "access_token": "t0k3n"
            })))
            .mount(server)
            .await;
    }

    async fn mount_record(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(format!("{CLIENTS_PATH}/{UID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(record()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn keycloak_client_admit() {
        let server = MockServer::start().await;
        mount_token(&server, 200).await;
        mount_record(&server).await;
        let (testctx, fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test().untracked();
        let mocksrv = fakeserver.run(Scenario::Admit(kcc.clone()));
        let action = reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::requeue(DEFAULT_RECONCILE_INTERVAL));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn keycloak_client_converge_with_secret_up_to_date() {
        let server = MockServer::start().await;
        mount_token(&server, 200).await;
        mount_record(&server).await;
        let (testctx, fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test();
        let artifact = CredentialArtifact::new(
            &record(),
            &kcc.desired().unwrap(),
            testctx.keycloak.config(),
        );
        let secret = secret::build(&kcc, UID, &artifact).unwrap();
        let mocksrv = fakeserver.run(Scenario::Converge(kcc.clone(), secret));
        reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .expect("reconciler");
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn keycloak_client_create_when_missing() {
        let server = MockServer::start().await;
        mount_token(&server, 200).await;
        Mock::given(method("GET"))
            .and(path(format!("{CLIENTS_PATH}/{UID}")))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLIENTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(CLIENTS_PATH))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}{CLIENTS_PATH}/{UID}", server.uri())),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_record(&server).await;

        let (testctx, fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test().untracked();
        let mocksrv = fakeserver.run(Scenario::Admit(kcc.clone()));
        reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .expect("reconciler");
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn keycloak_client_cleanup_when_already_gone() {
        let server = MockServer::start().await;
        mount_token(&server, 200).await;
        Mock::given(method("GET"))
            .and(path(format!("{CLIENTS_PATH}/{UID}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLIENTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let (testctx, fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test().needs_delete();
        let mocksrv = fakeserver.run(Scenario::Cleanup(kcc.clone()));
        let action = reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::await_change());
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn keycloak_client_cleanup_deletes_client() {
        let server = MockServer::start().await;
        mount_token(&server, 200).await;
        mount_record(&server).await;
        Mock::given(method("DELETE"))
            .and(path(format!("{CLIENTS_PATH}/{UID}")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (testctx, fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test().needs_delete();
        let mocksrv = fakeserver.run(Scenario::Cleanup(kcc.clone()));
        reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .expect("reconciler");
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn keycloak_client_cleanup_keeps_finalizer_on_failure() {
        let server = MockServer::start().await;
        mount_token(&server, 200).await;
        mount_record(&server).await;
        Mock::given(method("DELETE"))
            .and(path(format!("{CLIENTS_PATH}/{UID}")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (testctx, _fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test().needs_delete();
        let err = reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeycloakError(..)));
    }

    #[tokio::test]
    async fn keycloak_client_ignore_untracked_deletion() {
        let server = MockServer::start().await;
        let (testctx, _fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test().untracked().needs_delete();
        let action = reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::await_change());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keycloak_client_unauthorized_publishes_warning() {
        let server = MockServer::start().await;
        mount_token(&server, 401).await;
        let (testctx, fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test();
        let mocksrv = fakeserver.run(Scenario::KeycloakError);
        let err = reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeycloakError(..)));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn keycloak_client_error_survives_rejected_event() {
        let server = MockServer::start().await;
        mount_token(&server, 401).await;
        let (testctx, fakeserver) = get_test_context(&server);
        let kcc = KeycloakClient::test();
        let mocksrv = fakeserver.run(Scenario::EventRejected);
        let err = reconcile_keycloak_client(Arc::new(kcc), testctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeycloakError(..)));
        timeout_after_1s(mocksrv).await;
    }
}
