// ---------------------------------------------------------------------------
// handlers - REST surface
// ---------------------------------------------------------------------------
//
// Plugin endpoints are served by two parametric routes that resolve the
// `{module}/{endpoint}` path against the live endpoint table per request.

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::{Value, json};

use crate::auth::Credential;
use crate::error::GatewayError;
use crate::queue::QueueStats;
use crate::state::AppState;
use crate::surface::openapi;
use crate::surface::routes::RouteTable;

fn parse_body(body: &Bytes) -> Result<Value, GatewayError> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::invalid_input(format!("Invalid JSON body: {}", e)))
}

// ── Health ──────────────────────────────────────────────────────────────────

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub endpoints: usize,
    pub revision: u64,
    pub queue: QueueStats,
}

#[utoipa::path(get, path = "/api/health", tag = "system",
    responses((status = 200, description = "Gateway status", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let table = state.registry.table().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        endpoints: table.len(),
        revision: table.revision,
        queue: state.queue.stats().await,
    })
}

// ── POST /api/{module}/{endpoint} ───────────────────────────────────────────

/// Direct endpoints answer with their result; queued endpoints answer with
/// `{"queue_id": ...}`.
pub async fn call_endpoint(
    State(state): State<AppState>,
    Extension(credential): Extension<Credential>,
    Path((module, endpoint)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let path = format!("{}/{}", module, endpoint);
    let descriptor = state
        .registry
        .get(&path)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("API endpoint {} not found", path)))?;
    let payload = parse_body(&body)?;

    if descriptor.queue_mode {
        let queue_id = state.queue.submit(&credential, &path, payload).await?;
        Ok(Json(json!({ "queue_id": queue_id })))
    } else {
        let result = state.engine.execute_descriptor(&descriptor, payload).await?;
        Ok(Json(result))
    }
}

// ── POST /api/{module}/{endpoint}/queue ─────────────────────────────────────

/// `{"queue_id"}` while pending, the result when completed, the error body
/// when failed. Only the submitting key may read it.
pub async fn queue_status(
    State(state): State<AppState>,
    Extension(credential): Extension<Credential>,
    Path((module, endpoint)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let path = format!("{}/{}", module, endpoint);
    match state.registry.get(&path).await {
        Some(d) if d.queue_mode => {}
        _ => return Err(GatewayError::NotFound(format!("Queue route for {} not found", path))),
    }

    let payload = parse_body(&body)?;
    let queue_id = payload
        .get("queue_id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::missing_field("queue_id"))?;

    let job = state.queue.job(queue_id, &credential).await?;
    if job.endpoint != path {
        return Err(GatewayError::NotFound(format!("Queue item {} not found", queue_id)));
    }
    Ok(Json(crate::queue::JobOutcome::from_job(&job).into_body()))
}

// ── Documentation ───────────────────────────────────────────────────────────

/// `openapi.json` is the full document; `{module}.json` is filtered to one module.
#[utoipa::path(get, path = "/openapi/{file}", tag = "docs",
    params(("file" = String, Path, description = "`openapi.json` or `{module}.json`")),
    responses(
        (status = 200, description = "OpenAPI document", body = Value),
        (status = 404, description = "Unknown module")
    )
)]
pub async fn openapi_document(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let name = file.strip_suffix(".json").unwrap_or(&file);
    let table = state.registry.table().await;
    if name == "openapi" {
        return Ok(Json(openapi::build_document(&table, &state.config, None)));
    }
    if !table.modules.contains_key(name) {
        return Err(GatewayError::NotFound(format!("Module {} not found", name)));
    }
    Ok(Json(openapi::build_document(&table, &state.config, Some(name))))
}

#[utoipa::path(get, path = "/openapi/routes.json", tag = "docs",
    responses((status = 200, description = "REST routes of the current table revision", body = RouteTable))
)]
pub async fn route_table(State(state): State<AppState>) -> Json<RouteTable> {
    Json(RouteTable::from_table(&*state.registry.table().await))
}
