// MCP resources: documentation, queue state and the server log tail.
//
// Which groups are listed and readable follows the `mcp_expose_*` switches.

use serde_json::json;

use crate::auth::Credential;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::state::AppState;
use crate::surface::{openapi, schema};

use super::protocol::{ResourceContents, ResourceEntry, ResourceTemplate};

const LOG_TAIL_LINES: usize = 100;
const JSON: &str = "application/json";

fn entry(uri: &str, name: &str, description: &str, mime_type: &str) -> ResourceEntry {
    ResourceEntry {
        uri: uri.into(),
        name: name.into(),
        description: description.into(),
        mime_type: mime_type.into(),
    }
}

fn template(uri_template: &str, name: &str, description: &str) -> ResourceTemplate {
    ResourceTemplate {
        uri_template: uri_template.into(),
        name: name.into(),
        description: description.into(),
        mime_type: JSON.into(),
    }
}

pub fn list_resources(cfg: &GatewayConfig) -> Vec<ResourceEntry> {
    let mut out = Vec::new();
    if cfg.mcp_expose_docs {
        out.push(entry(
            "docs://openapi.json",
            "OpenAPI Schema",
            "Full OpenAPI document for the gateway",
            JSON,
        ));
        out.push(entry("docs://readme", "Server Documentation", "Gateway README", "text/markdown"));
    }
    if cfg.mcp_expose_queue {
        out.push(entry("docs://queue", "Queue Statistics", "Job counts per status and worker pool size", JSON));
    }
    if cfg.mcp_expose_logs {
        out.push(entry("logs://server", "Server Logs", "Recent server log lines", "text/plain"));
    }
    out
}

pub fn list_templates(cfg: &GatewayConfig) -> Vec<ResourceTemplate> {
    let mut out = Vec::new();
    if cfg.mcp_expose_queue {
        out.push(template("job://{id}", "Job Status", "Status and result of a queued request"));
    }
    if cfg.mcp_expose_docs {
        out.push(template(
            "docs://api/{endpoint}",
            "API Endpoint Documentation",
            "Description and schemas of one endpoint",
        ));
    }
    out
}

fn contents(uri: &str, mime_type: &str, text: String) -> ResourceContents {
    ResourceContents {
        uri: uri.into(),
        mime_type: mime_type.into(),
        text,
    }
}

fn not_found(uri: &str) -> GatewayError {
    GatewayError::NotFound(format!("Resource {} not found", uri))
}

fn to_text(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Read one resource on behalf of `caller`.
pub async fn read_resource(
    state: &AppState,
    caller: &Credential,
    uri: &str,
) -> Result<ResourceContents, GatewayError> {
    let cfg = &state.config;

    if let Some(id) = uri.strip_prefix("job://") {
        if !cfg.mcp_expose_queue || id.is_empty() {
            return Err(not_found(uri));
        }
        let job = state.queue.job(id, caller).await?;
        return Ok(contents(uri, JSON, to_text(&job.summary())));
    }

    if let Some(rest) = uri.strip_prefix("docs://") {
        return match rest {
            "queue" if cfg.mcp_expose_queue => {
                let stats = state.queue.stats().await;
                Ok(contents(uri, JSON, to_text(&json!(stats))))
            }
            _ if !cfg.mcp_expose_docs => Err(not_found(uri)),
            "openapi.json" => {
                let table = state.registry.table().await;
                Ok(contents(uri, JSON, to_text(&openapi::build_document(&table, cfg, None))))
            }
            "readme" => match tokio::fs::read_to_string(&cfg.readme_path).await {
                Ok(text) => Ok(contents(uri, "text/markdown", text)),
                Err(e) => {
                    tracing::warn!("mcp: cannot read {}: {}", cfg.readme_path.display(), e);
                    Err(GatewayError::NotFound("Documentation not available".into()))
                }
            },
            _ => match rest.strip_prefix("api/") {
                Some(path) => {
                    let d = state
                        .registry
                        .get(path)
                        .await
                        .ok_or_else(|| GatewayError::NotFound(format!("API endpoint {} not found", path)))?;
                    let doc = json!({
                        "name": d.display_name,
                        "path": d.path,
                        "description": d.description,
                        "category": d.category,
                        "queue_mode": d.queue_mode,
                        "request_schema": schema::request_schema(&d),
                        "response_schema": schema::response_schema(&d),
                    });
                    Ok(contents(uri, JSON, to_text(&doc)))
                }
                None => Err(not_found(uri)),
            },
        };
    }

    if uri == "logs://server" && cfg.mcp_expose_logs {
        return Ok(contents(uri, "text/plain", state.log_buffer.tail_text(LOG_TAIL_LINES)));
    }

    Err(not_found(uri))
}
