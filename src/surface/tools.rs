// Endpoint → MCP tool projection.

use serde::Serialize;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::plugins::EndpointDescriptor;
use crate::plugins::registry::EndpointTable;

use super::schema;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip)]
    pub endpoint: String,
    #[serde(skip)]
    pub queue_mode: bool,
}

/// `media.image/resize` → `media_image_resize`
pub fn tool_name(path: &str) -> String {
    path.replace(['/', '.'], "_")
}

fn is_exposed(d: &EndpointDescriptor, cfg: &GatewayConfig) -> bool {
    cfg.mcp_auto_map_apis && !cfg.mcp_excluded_apis.iter().any(|p| p == &d.path)
}

fn describe(d: &EndpointDescriptor) -> ToolDescriptor {
    let mut description = if d.description.is_empty() {
        format!("API endpoint for {}", d.path)
    } else {
        d.description.clone()
    };
    if d.queue_mode {
        description.push_str(" (queued: returns a queue_id, read job://{queue_id} for the result)");
    }
    ToolDescriptor {
        name: tool_name(&d.path),
        description,
        input_schema: schema::request_schema(d),
        endpoint: d.path.clone(),
        queue_mode: d.queue_mode,
    }
}

pub fn tool_catalog(table: &EndpointTable, cfg: &GatewayConfig) -> Vec<ToolDescriptor> {
    table.iter().filter(|d| is_exposed(d, cfg)).map(|d| describe(d)).collect()
}

pub fn find_tool(table: &EndpointTable, cfg: &GatewayConfig, name: &str) -> Option<ToolDescriptor> {
    table
        .iter()
        .filter(|d| is_exposed(d, cfg))
        .find(|d| tool_name(&d.path) == name)
        .map(|d| describe(d))
}
