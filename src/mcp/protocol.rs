//! MCP wire types.
//!
//! Every frame is a JSON object tagged by its `type` field. Requests may carry
//! an opaque `request_id`, which is echoed on the matching response or error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Client → server
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CapabilitiesRequest {
        #[serde(default)]
        request_id: Option<Value>,
    },
    ListToolsRequest {
        #[serde(default)]
        request_id: Option<Value>,
    },
    CallToolRequest {
        #[serde(default)]
        request_id: Option<Value>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<Value>,
    },
    ListResourcesRequest {
        #[serde(default)]
        request_id: Option<Value>,
    },
    ListResourceTemplatesRequest {
        #[serde(default)]
        request_id: Option<Value>,
    },
    ReadResourceRequest {
        #[serde(default)]
        request_id: Option<Value>,
        #[serde(default)]
        uri: Option<String>,
    },
}

/// `type` values accepted from clients.
pub const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "capabilities_request",
    "list_tools_request",
    "call_tool_request",
    "list_resources_request",
    "list_resource_templates_request",
    "read_resource_request",
];

// ============================================================================
// Server → client
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub tools: bool,
    pub resources: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Json { json: Value },
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidJson,
    UnknownMessageType,
    InvalidRequest,
    NotFound,
    Unauthorized,
    InternalError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ServerInfo {
        name: String,
        version: String,
        description: String,
    },
    CapabilitiesResponse {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        request_id: Option<Value>,
        capabilities: Capabilities,
    },
    ListToolsResponse {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        request_id: Option<Value>,
        tools: Vec<ToolEntry>,
    },
    CallToolResponse {
        request_id: Option<Value>,
        content: Vec<Content>,
        is_error: bool,
    },
    ListResourcesResponse {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        request_id: Option<Value>,
        resources: Vec<ResourceEntry>,
    },
    ListResourceTemplatesResponse {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        request_id: Option<Value>,
        resource_templates: Vec<ResourceTemplate>,
    },
    ReadResourceResponse {
        request_id: Option<Value>,
        contents: Vec<ResourceContents>,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        request_id: Option<Value>,
    },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>, request_id: Option<Value>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
            request_id,
        }
    }

    pub fn tool_result(request_id: Option<Value>, json: Value) -> Self {
        ServerMessage::CallToolResponse {
            request_id,
            content: vec![Content::Json { json }],
            is_error: false,
        }
    }

    pub fn tool_error(request_id: Option<Value>, text: impl Into<String>) -> Self {
        ServerMessage::CallToolResponse {
            request_id,
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "call_tool_request",
            "request_id": "r1",
            "name": "demo_echo",
            "arguments": { "text": "hi" }
        }))
        .unwrap();
        match msg {
            ClientMessage::CallToolRequest { request_id, name, arguments } => {
                assert_eq!(request_id, Some(json!("r1")));
                assert_eq!(name.as_deref(), Some("demo_echo"));
                assert_eq!(arguments, Some(json!({ "text": "hi" })));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn known_type_list_matches_enum() {
        for ty in CLIENT_MESSAGE_TYPES {
            let parsed: Result<ClientMessage, _> = serde_json::from_value(json!({ "type": ty }));
            assert!(parsed.is_ok(), "{}", ty);
        }
    }

    #[test]
    fn server_messages_serialize_flat() {
        let v = serde_json::to_value(ServerMessage::tool_result(Some(json!(7)), json!({ "n": 42 }))).unwrap();
        assert_eq!(
            v,
            json!({
                "type": "call_tool_response",
                "request_id": 7,
                "content": [{ "type": "json", "json": { "n": 42 } }],
                "is_error": false
            })
        );

        let v = serde_json::to_value(ServerMessage::error(ErrorCode::InvalidJson, "Invalid JSON", None)).unwrap();
        assert_eq!(v, json!({ "type": "error", "code": "invalid_json", "message": "Invalid JSON" }));
    }
}
