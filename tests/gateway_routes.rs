#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
};
use common::{Behavior, FakeRegistry, ScriptedDownstream, TestDb, lenient_breaker, replica, setup_db};
use gateway::{
    config::GatewayConfig,
    dispatcher::DispatcherConfig,
    router::build_router,
    saga::SqliteSagaStore,
    state::AppState,
};
use http_body_util::BodyExt;
use reqwest::Method;
use serde_json::{Value, json};
use tower::ServiceExt;

const USER_REPLICA: &str = "10.0.0.1:8080";
const POST_REPLICA: &str = "10.0.1.1:9090";
const ADMIN_TOKEN: &str = "admin-secret";

struct Gateway {
    _db: TestDb,
    registry: Arc<FakeRegistry>,
    downstream: Arc<ScriptedDownstream>,
    state: AppState,
}

impl Gateway {
    async fn new() -> Self {
        Self::with_registry(FakeRegistry::with(vec![
            replica("user-service", "10.0.0.1", 8080),
            replica("recommendation-service", "10.0.1.1", 9090),
        ]))
        .await
    }

    async fn with_registry(registry: FakeRegistry) -> Self {
        let config = GatewayConfig {
            admin_api_token: Some(ADMIN_TOKEN.to_string()),
            breaker: lenient_breaker(),
            dispatcher: DispatcherConfig {
                max_retries: 3,
                backoff_base: Duration::ZERO,
                backoff_max: Duration::ZERO,
                request_deadline: Duration::from_secs(60),
            },
            ..GatewayConfig::default()
        };
        Self::with_config(registry, &config).await
    }

    /// Wires the app the same way the binary does.
    async fn with_config(registry: FakeRegistry, config: &GatewayConfig) -> Self {
        let db = setup_db().await;
        let registry = Arc::new(registry);
        let downstream = Arc::new(ScriptedDownstream::new());
        let state = AppState::from_config(
            config,
            registry.clone(),
            downstream.clone(),
            Arc::new(SqliteSagaStore::new(db.pool.clone())),
        );

        Self {
            _db: db,
            registry,
            downstream,
            state,
        }
    }

    fn app(&self) -> Router {
        build_router(self.state.clone())
    }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Proxied routes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn proxy_relays_replica_response() {
    let gateway = Gateway::new().await;
    gateway
        .downstream
        .on(USER_REPLICA, Behavior::Succeed(json!({"id": 42, "username": "ada"})));

    let response = gateway
        .app()
        .oneshot(get("/api/users/42?verbose=true"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"id": 42, "username": "ada"}));

    let calls = gateway.downstream.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].endpoint, USER_REPLICA);
    assert_eq!(calls[0].request.method, Method::GET);
    assert_eq!(calls[0].request.path, "/api/users/42?verbose=true");
    assert_eq!(calls[0].request.body, None);
}

#[tokio::test]
async fn proxy_forwards_json_body_to_post_service() {
    let gateway = Gateway::new().await;
    gateway
        .downstream
        .on(POST_REPLICA, Behavior::Succeed(json!({"id": 7})));

    let response = gateway
        .app()
        .oneshot(json_request("POST", "/api/posts/", &json!({"title": "hi"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let calls = gateway.downstream.calls();
    assert_eq!(calls[0].endpoint, POST_REPLICA);
    assert_eq!(calls[0].request.body, Some(json!({"title": "hi"})));
}

#[tokio::test]
async fn proxy_without_replicas_is_unavailable() {
    let gateway = Gateway::with_registry(FakeRegistry::default()).await;

    let response = gateway.app().oneshot(get("/api/users")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "unavailable");
    assert_eq!(body["error"], "service unavailable");
}

#[tokio::test]
async fn proxy_with_every_replica_failing_is_a_server_error() {
    let gateway = Gateway::new().await;
    gateway.downstream.on(USER_REPLICA, Behavior::Fail);

    let response = gateway.app().oneshot(get("/api/users/1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["code"], "unavailable");
    assert_eq!(gateway.downstream.calls_to(USER_REPLICA), 3);
    assert_eq!(gateway.registry.deregistered().len(), 1);
}

#[tokio::test]
async fn proxy_rejects_non_json_body() {
    let gateway = Gateway::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/users/register")
        .body(Body::from("name=ada"))
        .unwrap();
    let response = gateway.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation");
    assert!(gateway.downstream.calls().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Saga routes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn saga_create_returns_ids_and_is_recorded() {
    let gateway = Gateway::new().await;
    gateway
        .downstream
        .on(USER_REPLICA, Behavior::Succeed(json!({"id": "u1"})))
        .on(POST_REPLICA, Behavior::Succeed(json!({"id": "p1"})));

    let response = gateway
        .app()
        .oneshot(json_request(
            "POST",
            "/api/saga/create",
            &json!({"userData": {"username": "ada"}, "postData": {"title": "hello"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["userId"], "u1");
    assert_eq!(body["postId"], "p1");
    let saga_id = body["sagaId"].as_str().unwrap().to_string();

    let response = gateway
        .app()
        .oneshot(get(&format!("/api/saga/{saga_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["saga"]["saga_id"], saga_id);
    assert_eq!(body["saga"]["status"], "completed");
}

#[tokio::test]
async fn saga_failure_rolls_back_the_user() {
    let gateway = Gateway::new().await;
    gateway
        .downstream
        .on_method(USER_REPLICA, Method::POST, Behavior::Succeed(json!({"id": "u1"})))
        .on_method(USER_REPLICA, Method::DELETE, Behavior::Succeed(json!({})))
        .on(POST_REPLICA, Behavior::Fail);

    let response = gateway
        .app()
        .oneshot(json_request(
            "POST",
            "/api/saga/create",
            &json!({"userData": {"username": "ada"}, "postData": {"title": "hello"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["code"], "internal");

    let deletes: Vec<String> = gateway
        .downstream
        .calls()
        .into_iter()
        .filter(|call| call.request.method == Method::DELETE)
        .map(|call| call.request.path)
        .collect();
    assert_eq!(deletes, vec!["/api/users/u1"]);
}

#[tokio::test]
async fn saga_create_validates_payload() {
    let gateway = Gateway::new().await;

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/saga/create")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{\"userData\":"))
        .unwrap();
    let response = gateway.app().oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation");

    let response = gateway
        .app()
        .oneshot(json_request(
            "POST",
            "/api/saga/create",
            &json!({"userData": "ada", "postData": {"title": "hello"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "userData must be a JSON object");

    assert!(gateway.downstream.calls().is_empty());
}

#[tokio::test]
async fn saga_lookup_rejects_bad_and_unknown_ids() {
    let gateway = Gateway::new().await;

    let response = gateway
        .app()
        .oneshot(get("/api/saga/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = gateway
        .app()
        .oneshot(get(&format!("/api/saga/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "not_found");
}

#[tokio::test]
async fn default_config_proxy_fails_over_a_dead_replica() {
    let gateway = Gateway::with_config(
        FakeRegistry::with(vec![
            replica("user-service", "10.0.0.1", 8080),
            replica("user-service", "10.0.0.2", 8080),
        ]),
        &GatewayConfig::default(),
    )
    .await;
    gateway
        .downstream
        .on(USER_REPLICA, Behavior::Fail)
        .on("10.0.0.2:8080", Behavior::Succeed(json!({"id": 8})));

    let response = gateway.app().oneshot(get("/api/users/8")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"id": 8}));
    assert_eq!(gateway.downstream.calls_to(USER_REPLICA), 3);
    assert_eq!(gateway.downstream.calls().len(), 4);
    let deregistered: Vec<String> = gateway
        .registry
        .deregistered()
        .iter()
        .map(|instance| instance.endpoint())
        .collect();
    assert_eq!(deregistered, vec![USER_REPLICA.to_string()]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Status, breakers, rate monitor
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_lists_registered_services() {
    let gateway = Gateway::new().await;

    let response = gateway.app().oneshot(get("/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({
            "status": "Gateway is running",
            "services": ["recommendation-service", "user-service"]
        })
    );
}

#[tokio::test]
async fn status_reports_unreachable_registry() {
    let gateway = Gateway::new().await;
    gateway.registry.set_unreachable(true);

    let response = gateway.app().oneshot(get("/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "unavailable");
}

#[tokio::test]
async fn breakers_require_admin_token() {
    let gateway = Gateway::new().await;

    let response = gateway.app().oneshot(get("/internal/breakers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/internal/breakers")
        .header(AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let response = gateway.app().oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .uri("/internal/breakers")
        .header(AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = gateway.app().oneshot(authorized).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let breakers: Vec<(&str, &str)> = body["breakers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|breaker| {
            (
                breaker["name"].as_str().unwrap(),
                breaker["state"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        breakers,
        vec![
            ("recommendation-service", "closed"),
            ("user-service", "closed")
        ]
    );
}

#[tokio::test]
async fn rate_monitor_counts_api_requests_only() {
    let gateway = Gateway::new().await;
    gateway
        .downstream
        .on(USER_REPLICA, Behavior::Succeed(json!([])));

    for _ in 0..3 {
        gateway.app().oneshot(get("/api/users")).await.unwrap();
    }
    gateway.app().oneshot(get("/status")).await.unwrap();

    assert_eq!(gateway.state.rate_monitor.current(), 3);
}
