use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use nexus_gateway::config::GatewayConfig;
use nexus_gateway::logs::LogRingBuffer;
use nexus_gateway::plugins::catalog::HandlerCatalog;
use nexus_gateway::state::AppState;

const ALICE: &str = "alice-key";
const BOB: &str = "bob-key";

fn shipped_plugins() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("plugins")
}

fn config(dir: &Path, plugin_dir: PathBuf) -> GatewayConfig {
    GatewayConfig {
        api_keys: vec![ALICE.into(), BOB.into()],
        plugin_dir,
        readme_path: Path::new(env!("CARGO_MANIFEST_DIR")).join("README.md"),
        state_file: dir.join("state.json"),
        temp_dir: dir.join("tmp"),
        max_workers: 2,
        reload_interval: Duration::ZERO,
        ..Default::default()
    }
}

/// Helper: state over the shipped plugin directory with workers running.
fn test_state(dir: &Path) -> AppState {
    let state = AppState::new(
        config(dir, shipped_plugins()),
        HandlerCatalog::builtin(),
        Arc::new(LogRingBuffer::new(100)),
    );
    state.start();
    state
}

/// Helper: build a router from a test state.
fn app(state: &AppState) -> axum::Router {
    nexus_gateway::create_router(state.clone())
}

/// Helper: collect a response body into a serde_json::Value.
async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn call(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(state).oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn poll_until_done(state: &AppState, route: &str, key: &str, queue_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = call(state, post(route, Some(key), json!({ "queue_id": queue_id }))).await;
        assert_eq!(status, StatusCode::OK);
        if body.get("queue_id").is_none() {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never finished", queue_id);
}

// ═══════════════════════════════════════════════════════════════════════════
//  Health and documentation (public)
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn health_is_public_and_counts_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, body) = call(&state, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["endpoints"], 6);
    assert_eq!(body["queue"]["workers"], 2);
    state.shutdown().await;
}

#[tokio::test]
async fn openapi_documents_need_no_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, doc) = call(&state, get("/openapi/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["openapi"].as_str().unwrap().starts_with("3."));
    assert!(doc["paths"]["/api/demo/echo"]["post"].is_object());
    assert!(doc["paths"]["/api/demo/slowJob/queue"]["post"].is_object());
    assert!(doc["paths"].get("/api/demo/echo/queue").is_none());

    let (status, doc) = call(&state, get("/openapi/demo.json")).await;
    assert_eq!(status, StatusCode::OK);
    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/api/demo/echo"));
    assert!(!paths.keys().any(|p| p.starts_with("/api/text/")));

    let (status, body) = call(&state, get("/openapi/nothing.json")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    state.shutdown().await;
}

#[tokio::test]
async fn generated_required_fields_match_manifests() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (_, doc) = call(&state, get("/openapi/openapi.json")).await;
    let schemas = &doc["components"]["schemas"];
    assert_eq!(schemas["TextTextAnalyzerRequest"]["required"], json!(["text"]));
    assert_eq!(schemas["DemoEchoRequest"]["required"], json!(["text"]));
    assert!(schemas["DemoSlowJobRequest"].get("required").is_none());
    assert_eq!(schemas["TextTextSummarizerRequest"]["properties"]["max_sentences"]["maximum"], json!(20));
    state.shutdown().await;
}

#[tokio::test]
async fn route_table_lists_status_routes_for_queued_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, body) = call(&state, get("/openapi/routes.json")).await;
    assert_eq!(status, StatusCode::OK);
    let routes = body["routes"].as_array().unwrap();
    // four direct endpoints, two queued ones with a status route each
    assert_eq!(routes.len(), 8);
    assert!(routes.iter().any(|r| r["path"] == "/api/text/textSummarizer/queue" && r["kind"] == "status"));
    state.shutdown().await;
}

// ═══════════════════════════════════════════════════════════════════════════
//  Authorization
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn endpoints_reject_missing_or_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, body) = call(&state, post("/api/demo/echo", None, json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(body["error"]["status"], 401);

    let (status, _) = call(&state, post("/api/demo/echo", Some("mallory"), json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = app(&state)
        .oneshot(Request::builder().uri("/api/logs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    state.shutdown().await;
}

#[tokio::test]
async fn logs_are_readable_with_a_key() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let request = Request::builder()
        .uri("/api/logs?limit=5")
        .header("authorization", format!("Bearer {}", ALICE))
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["logs"].is_array());

    let request = Request::builder()
        .uri("/api/logs?level=loud")
        .header("authorization", format!("Bearer {}", ALICE))
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&state, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["description"], "Unknown log level: loud");
    state.shutdown().await;
}

// ═══════════════════════════════════════════════════════════════════════════
//  Direct endpoints
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn echo_returns_the_text() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, body) = call(&state, post("/api/demo/echo", Some(ALICE), json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "echoed": "hi" }));
    state.shutdown().await;
}

#[tokio::test]
async fn invalid_requests_map_to_taxonomy_codes() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, body) = call(&state, post("/api/demo/echo", Some(ALICE), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
    assert_eq!(body["error"]["details"]["field"], "text");

    let request = Request::builder()
        .method("POST")
        .uri("/api/demo/echo")
        .header("authorization", format!("Bearer {}", ALICE))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = call(&state, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&state, post("/api/demo/missing", Some(ALICE), json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["description"], "API endpoint demo/missing not found");

    let (status, _) = call(&state, post("/api/demo/echo/queue", Some(ALICE), json!({ "queue_id": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    state.shutdown().await;
}

#[tokio::test]
async fn binary_payloads_are_decoded_and_reencoded() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    let encoded = B64.encode(png);
    let (status, body) = call(
        &state,
        post("/api/media/imageInspector", Some(ALICE), json!({ "image": encoded })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image"], encoded);
    assert_eq!(body["format"], "png");
    assert_eq!(body["size_bytes"], png.len());

    let (status, body) = call(
        &state,
        post("/api/media/fileChecksum", Some(ALICE), json!({ "file": B64.encode("hello") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sha256"], "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
    assert_eq!(body["size_bytes"], 5);

    let (status, body) = call(
        &state,
        post("/api/media/imageInspector", Some(ALICE), json!({ "image": "not base64!" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "API_ERROR");
    state.shutdown().await;
}

// ═══════════════════════════════════════════════════════════════════════════
//  Queued endpoints
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn slow_job_returns_a_handle_then_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, body) = call(&state, post("/api/demo/slowJob", Some(ALICE), json!({ "delay_ms": 100 }))).await;
    assert_eq!(status, StatusCode::OK);
    let queue_id = body["queue_id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &state,
        post("/api/demo/slowJob/queue", Some(ALICE), json!({ "queue_id": queue_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "queue_id": queue_id }));

    let result = poll_until_done(&state, "/api/demo/slowJob/queue", ALICE, &queue_id).await;
    assert_eq!(result, json!({ "n": 42 }));

    // polling after completion keeps returning the same result
    let again = poll_until_done(&state, "/api/demo/slowJob/queue", ALICE, &queue_id).await;
    assert_eq!(again, result);
    state.shutdown().await;
}

#[tokio::test]
async fn only_the_submitter_can_read_a_job() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (_, body) = call(
        &state,
        post("/api/text/textSummarizer", Some(ALICE), json!({ "text": "One. Two. Three." })),
    )
    .await;
    let queue_id = body["queue_id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &state,
        post("/api/text/textSummarizer/queue", Some(BOB), json!({ "queue_id": queue_id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let result = poll_until_done(&state, "/api/text/textSummarizer/queue", ALICE, &queue_id).await;
    assert_eq!(result["sentence_count"], 3);

    let (status, _) = call(
        &state,
        post("/api/text/textSummarizer/queue", Some(ALICE), json!({ "queue_id": "no-such-job" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&state, post("/api/text/textSummarizer/queue", Some(ALICE), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "queue_id");
    state.shutdown().await;
}

#[tokio::test]
async fn full_queue_is_rejected_with_503() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = GatewayConfig {
        max_queue_depth: 1,
        ..config(dir.path(), shipped_plugins())
    };
    // workers never start, so the first job stays queued
    let state = AppState::new(cfg, HandlerCatalog::builtin(), Arc::new(LogRingBuffer::new(10)));

    let (status, _) = call(&state, post("/api/demo/slowJob", Some(ALICE), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&state, post("/api/demo/slowJob", Some(ALICE), json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "API_ERROR");
    assert_eq!(body["error"]["details"]["reason"], "queue_full");
}

#[tokio::test]
async fn queued_jobs_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = AppState::new(
        config(dir.path(), shipped_plugins()),
        HandlerCatalog::builtin(),
        Arc::new(LogRingBuffer::new(10)),
    );
    let (_, body) = call(&first, post("/api/demo/slowJob", Some(ALICE), json!({ "delay_ms": 10 }))).await;
    let queue_id = body["queue_id"].as_str().unwrap().to_string();
    drop(first);

    let second = test_state(dir.path());
    let result = poll_until_done(&second, "/api/demo/slowJob/queue", ALICE, &queue_id).await;
    assert_eq!(result, json!({ "n": 42 }));
    second.shutdown().await;
}

// ═══════════════════════════════════════════════════════════════════════════
//  Hot reload
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reload_exposes_new_manifests_without_rebuilding_the_router() {
    let dir = tempfile::tempdir().unwrap();
    let plugins = dir.path().join("plugins");
    std::fs::create_dir_all(&plugins).unwrap();
    std::fs::copy(shipped_plugins().join("demo.toml"), plugins.join("demo.toml")).unwrap();

    let state = AppState::new(
        config(dir.path(), plugins.clone()),
        HandlerCatalog::builtin(),
        Arc::new(LogRingBuffer::new(10)),
    );
    let router = app(&state);

    let (status, _) = call(&state, post("/api/text/textAnalyzer", Some(ALICE), json!({ "text": "a" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    std::fs::copy(shipped_plugins().join("text.toml"), plugins.join("text.toml")).unwrap();
    assert!(state.registry.check_for_changes());
    let report = state.registry.reload().await;
    assert_eq!(report.revision, 2);

    let response = router
        .oneshot(post("/api/text/textAnalyzer", Some(ALICE), json!({ "text": "Good day. Fine." })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["analysis_results"].is_object());
}
