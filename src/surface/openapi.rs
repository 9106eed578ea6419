// ---------------------------------------------------------------------------
// surface/openapi.rs - aggregated OpenAPI document
// ---------------------------------------------------------------------------
//
// Static routes (health, logs, docs) are described by the utoipa derive
// below. Plugin endpoints are only known at runtime, so their paths and
// component schemas are merged into the generated document as JSON.

use serde_json::{Value, json};
use utoipa::OpenApi;

use crate::config::GatewayConfig;
use crate::plugins::EndpointDescriptor;
use crate::plugins::registry::EndpointTable;

use super::schema;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Nexus Gateway API",
        description = "Plugin endpoints exposed over REST. Queued endpoints return a queue_id; poll the companion /queue route for the result."
    ),
    paths(
        crate::handlers::health,
        crate::handlers::openapi_document,
        crate::handlers::route_table,
        crate::logs::server_logs,
    ),
    components(schemas(
        crate::handlers::HealthResponse,
        crate::queue::QueueStats,
        crate::logs::LogEntry,
        crate::surface::routes::RouteTable,
        crate::surface::routes::RouteEntry,
        crate::surface::routes::RouteKind,
    )),
    tags(
        (name = "system", description = "Health and diagnostics"),
        (name = "docs", description = "Generated API documentation"),
    )
)]
pub struct ApiDoc;

const ERROR_REF: &str = "#/components/schemas/ErrorResponse";

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{}", name) })
}

fn json_content(schema: Value) -> Value {
    json!({ "application/json": { "schema": schema } })
}

fn error_responses() -> Value {
    let err = json!({ "$ref": ERROR_REF });
    json!({
        "400": { "description": "Invalid input", "content": json_content(err.clone()) },
        "401": { "description": "Missing or invalid API key", "content": json_content(err.clone()) },
        "404": { "description": "Endpoint or queue item not found", "content": json_content(err.clone()) },
        "500": { "description": "Handler or marshaling failure", "content": json_content(err.clone()) },
        "504": { "description": "Processing timed out", "content": json_content(err) },
    })
}

fn shared_schemas() -> Value {
    json!({
        "QueueRequest": {
            "type": "object",
            "properties": { "queue_id": { "type": "string" } },
            "required": ["queue_id"],
        },
        "QueueResponse": {
            "type": "object",
            "properties": { "queue_id": { "type": "string" } },
            "required": ["queue_id"],
        },
        "ErrorResponse": {
            "type": "object",
            "properties": {
                "error": {
                    "type": "object",
                    "properties": {
                        "code": {
                            "type": "string",
                            "enum": ["INVALID_INPUT", "UNAUTHORIZED", "NOT_FOUND", "API_ERROR", "TIMEOUT_ERROR"],
                        },
                        "status": { "type": "integer" },
                        "description": { "type": "string" },
                        "details": { "type": "object" },
                    },
                    "required": ["code", "status", "description"],
                }
            },
            "required": ["error"],
        },
    })
}

fn operation(d: &EndpointDescriptor, request: Value, ok: Value, suffix: &str, summary: String) -> Value {
    let mut responses = error_responses();
    responses["200"] = json!({ "description": "Successful response", "content": json_content(ok) });
    json!({
        "post": {
            "tags": [d.category],
            "summary": summary,
            "description": d.description,
            "operationId": format!("{}{}", schema::schema_name(&d.path), suffix),
            "security": [{ "bearerAuth": [] }],
            "requestBody": { "required": true, "content": json_content(request) },
            "responses": responses,
        }
    })
}

/// Full document, or only `module`'s endpoints when a filter is given.
pub fn build_document(table: &EndpointTable, cfg: &GatewayConfig, module: Option<&str>) -> Value {
    let mut doc = serde_json::to_value(ApiDoc::openapi()).unwrap_or_else(|e| {
        tracing::error!("openapi: failed to serialize static document: {}", e);
        json!({ "openapi": "3.1.0", "paths": {} })
    });

    doc["info"]["version"] = json!(env!("CARGO_PKG_VERSION"));
    doc["servers"] = json!([{ "url": cfg.public_url(), "description": "Nexus Gateway" }]);
    doc["components"]["securitySchemes"]["bearerAuth"] = json!({
        "type": "http",
        "scheme": "bearer",
        "description": "API key sent as `Authorization: Bearer <key>`",
    });
    if let Value::Object(shared) = shared_schemas() {
        for (name, schema) in shared {
            doc["components"]["schemas"][name] = schema;
        }
    }

    let endpoints = table
        .iter()
        .filter(|d| module.is_none_or(|m| d.module == m));

    for d in endpoints {
        let name = schema::schema_name(&d.path);
        let req_name = format!("{}Request", name);
        let resp_name = format!("{}Response", name);
        doc["components"]["schemas"][&req_name] = schema::request_schema(d);
        doc["components"]["schemas"][&resp_name] = schema::response_schema(d);

        let route = format!("/api/{}", d.path);
        if d.queue_mode {
            doc["paths"][&route] = operation(
                d,
                schema_ref(&req_name),
                schema_ref("QueueResponse"),
                "Queue",
                format!("{} (queued)", d.display_name),
            );
            doc["paths"][format!("{}/queue", route)] = operation(
                d,
                schema_ref("QueueRequest"),
                json!({ "oneOf": [schema_ref(&resp_name), schema_ref("QueueResponse"), json!({ "$ref": ERROR_REF })] }),
                "Status",
                format!("{} status", d.display_name),
            );
        } else {
            doc["paths"][&route] = operation(
                d,
                schema_ref(&req_name),
                schema_ref(&resp_name),
                "",
                d.display_name.clone(),
            );
        }
    }

    let mut tags = doc["tags"].as_array().cloned().unwrap_or_default();
    for (module_name, description) in &table.modules {
        if module.is_none_or(|m| m == module_name.as_str()) {
            tags.push(json!({ "name": module_name, "description": description }));
        }
    }
    doc["tags"] = Value::Array(tags);
    doc
}
