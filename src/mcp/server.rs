// ---------------------------------------------------------------------------
// mcp/server - MCP over WebSocket at `GET /mcp`
// ---------------------------------------------------------------------------
//
// The upgrade is authenticated once and the credential is bound to the
// session. After `server_info` every text frame is one typed request answered
// by one typed response. Bad frames produce an `error` message and the
// connection stays open.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};

use crate::auth::{self, Credential};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::state::AppState;
use crate::surface::tools;

use super::protocol::{
    CLIENT_MESSAGE_TYPES, Capabilities, ClientMessage, ErrorCode, ServerMessage, ToolEntry,
};
use super::resources;

/// One connected client.
#[derive(Clone)]
pub struct McpSession {
    pub state: AppState,
    pub credential: Credential,
}

impl McpSession {
    pub fn new(state: AppState, credential: Credential) -> Self {
        Self { state, credential }
    }
}

pub fn server_info(cfg: &GatewayConfig) -> ServerMessage {
    ServerMessage::ServerInfo {
        name: cfg.mcp_server_name.clone(),
        version: cfg.mcp_server_version.clone(),
        description: cfg.mcp_server_description.clone(),
    }
}

fn error_code(err: &GatewayError) -> ErrorCode {
    match err {
        GatewayError::NotFound(_) => ErrorCode::NotFound,
        GatewayError::Unauthorized(_) => ErrorCode::Unauthorized,
        GatewayError::InvalidInput { .. } => ErrorCode::InvalidRequest,
        _ => ErrorCode::InternalError,
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────────

/// Answer one inbound text frame.
pub async fn dispatch(session: &McpSession, raw: &str) -> ServerMessage {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("mcp: unparseable frame: {}", e);
            return ServerMessage::error(ErrorCode::InvalidJson, "Invalid JSON", None);
        }
    };
    let request_id = value.get("request_id").cloned().filter(|v| !v.is_null());

    let ty = value.get("type").and_then(Value::as_str);
    if !ty.is_some_and(|t| CLIENT_MESSAGE_TYPES.contains(&t)) {
        let shown = value.get("type").map(|t| match t {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        return ServerMessage::error(
            ErrorCode::UnknownMessageType,
            format!("Unknown message type: {}", shown.as_deref().unwrap_or("None")),
            request_id,
        );
    }

    let message: ClientMessage = match serde_json::from_value(value) {
        Ok(m) => m,
        Err(e) => {
            return ServerMessage::error(
                ErrorCode::InvalidRequest,
                format!("Malformed request: {}", e),
                request_id,
            );
        }
    };
    tracing::debug!("mcp: {:?}", message);
    handle(session, message).await
}

async fn handle(session: &McpSession, message: ClientMessage) -> ServerMessage {
    let state = &session.state;
    let cfg = &state.config;
    match message {
        ClientMessage::CapabilitiesRequest { request_id } => ServerMessage::CapabilitiesResponse {
            request_id,
            capabilities: Capabilities {
                tools: cfg.mcp_auto_map_apis,
                resources: cfg.mcp_expose_queue || cfg.mcp_expose_docs,
            },
        },
        ClientMessage::ListToolsRequest { request_id } => {
            let table = state.registry.table().await;
            let tools = tools::tool_catalog(&table, cfg)
                .into_iter()
                .map(|t| ToolEntry {
                    name: t.name,
                    description: t.description,
                    input_schema: t.input_schema,
                })
                .collect();
            ServerMessage::ListToolsResponse { request_id, tools }
        }
        ClientMessage::CallToolRequest {
            request_id,
            name,
            arguments,
        } => {
            let Some(name) = name.filter(|n| !n.is_empty()) else {
                return ServerMessage::error(ErrorCode::InvalidRequest, "Tool name is required", request_id);
            };
            call_tool(session, request_id, &name, arguments.unwrap_or_else(|| json!({}))).await
        }
        ClientMessage::ListResourcesRequest { request_id } => ServerMessage::ListResourcesResponse {
            request_id,
            resources: resources::list_resources(cfg),
        },
        ClientMessage::ListResourceTemplatesRequest { request_id } => {
            ServerMessage::ListResourceTemplatesResponse {
                request_id,
                resource_templates: resources::list_templates(cfg),
            }
        }
        ClientMessage::ReadResourceRequest { request_id, uri } => {
            let Some(uri) = uri.filter(|u| !u.is_empty()) else {
                return ServerMessage::error(ErrorCode::InvalidRequest, "Resource URI is required", request_id);
            };
            match resources::read_resource(state, &session.credential, &uri).await {
                Ok(contents) => ServerMessage::ReadResourceResponse {
                    request_id,
                    contents: vec![contents],
                },
                Err(e) => {
                    tracing::debug!("mcp: read {} failed: {}", uri, e);
                    ServerMessage::error(error_code(&e), e.to_string(), request_id)
                }
            }
        }
    }
}

async fn call_tool(session: &McpSession, request_id: Option<Value>, name: &str, arguments: Value) -> ServerMessage {
    let state = &session.state;
    let table = state.registry.table().await;
    let Some(tool) = tools::find_tool(&table, &state.config, name) else {
        return ServerMessage::tool_error(request_id, format!("Tool {} not found", name));
    };

    let outcome = if tool.queue_mode {
        state
            .queue
            .submit(&session.credential, &tool.endpoint, arguments)
            .await
            .map(|queue_id| json!({ "queue_id": queue_id }))
    } else {
        state.engine.execute(&tool.endpoint, arguments).await
    };

    match outcome {
        Ok(result) => ServerMessage::tool_result(request_id, result),
        Err(e) => {
            tracing::info!("mcp: tool {} failed: {}", name, e);
            ServerMessage::tool_error(request_id, e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket Helper
// ---------------------------------------------------------------------------

async fn ws_send(sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("mcp: failed to encode message: {}", e);
            false
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket Handler
// ---------------------------------------------------------------------------

pub async fn mcp_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let Some(credential) = auth::ws_credential(&headers, query.as_deref(), &state.keys) else {
        tracing::warn!("mcp: rejected upgrade without a valid API key");
        return GatewayError::Unauthorized("Invalid API key".into()).into_response();
    };
    let session = McpSession::new(state, credential);
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

async fn handle_socket(socket: WebSocket, session: McpSession) {
    let (mut sender, mut receiver) = socket.split();
    let shutdown = session.state.shutdown.clone();
    tracing::info!("mcp: client connected");

    if !ws_send(&mut sender, &server_info(&session.state.config)).await {
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sender.send(WsMessage::Close(None)).await;
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = dispatch(&session, text.as_str()).await;
                        if !ws_send(&mut sender, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        let reply = match std::str::from_utf8(&data) {
                            Ok(text) => dispatch(&session, text).await,
                            Err(_) => ServerMessage::error(ErrorCode::InvalidJson, "Invalid JSON", None),
                        };
                        if !ws_send(&mut sender, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("mcp: socket error: {}", e);
                        break;
                    }
                }
            }
        }
    }
    tracing::info!("mcp: client disconnected");
}
