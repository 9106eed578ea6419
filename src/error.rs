// ---------------------------------------------------------------------------
// error.rs - gateway error taxonomy and its HTTP rendering
// ---------------------------------------------------------------------------

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Every failure that crosses the REST, MCP or job boundary.
///
/// Response format:
/// ```json
/// {
///   "error": {
///     "code": "INVALID_INPUT",
///     "status": 400,
///     "description": "Missing required field: text",
///     "details": { "field": "text" }
///   }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{message}")]
    InvalidInput {
        message: String,
        details: Option<Value>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Api(String),

    #[error("Queue is full")]
    QueueFull { max_depth: usize },

    #[error("Processing timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Marshal(String),
}

/// Serialized error payload. Stored verbatim on failed jobs so a status poll
/// returns exactly what a direct call would have returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub status: u16,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    /// Wrap in the `{ "error": ... }` envelope used on the wire.
    pub fn to_envelope(&self) -> Value {
        json!({ "error": self })
    }
}

impl GatewayError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        GatewayError::InvalidInput {
            message: message.into(),
            details: None,
        }
    }

    pub fn missing_field(field: &str) -> Self {
        GatewayError::InvalidInput {
            message: format!("Missing required field: {}", field),
            details: Some(json!({ "field": field })),
        }
    }

    /// Taxonomy code. Queue-full and marshaling failures share API_ERROR.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidInput { .. } => "INVALID_INPUT",
            GatewayError::Unauthorized(_) => "UNAUTHORIZED",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::Api(_) => "API_ERROR",
            GatewayError::QueueFull { .. } => "API_ERROR",
            GatewayError::Timeout(_) => "TIMEOUT_ERROR",
            GatewayError::Marshal(_) => "API_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Api(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Marshal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            GatewayError::InvalidInput { details, .. } => details.clone(),
            GatewayError::QueueFull { max_depth } => {
                Some(json!({ "reason": "queue_full", "max_depth": max_depth }))
            }
            GatewayError::Timeout(limit) => Some(json!({ "timeout_ms": limit.as_millis() as u64 })),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            status: self.status_code().as_u16(),
            description: self.to_string(),
            details: self.details(),
        }
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, GatewayError::QueueFull { .. })
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "gateway error ({}): {}", status.as_u16(), self);
        } else {
            tracing::warn!(code = self.code(), "gateway error ({}): {}", status.as_u16(), self);
        }
        (status, Json(self.body().to_envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_is_api_error_with_distinct_reason() {
        let err = GatewayError::QueueFull { max_depth: 3 };
        let body = err.body();
        assert_eq!(body.code, "API_ERROR");
        assert_eq!(body.status, 503);
        assert_eq!(body.details.unwrap()["reason"], "queue_full");
        assert!(err.is_queue_full());
    }

    #[test]
    fn missing_field_names_the_field() {
        let body = GatewayError::missing_field("text").body();
        assert_eq!(body.code, "INVALID_INPUT");
        assert_eq!(body.status, 400);
        assert_eq!(body.description, "Missing required field: text");
        assert_eq!(body.details, Some(json!({ "field": "text" })));
    }

    #[test]
    fn envelope_wraps_body_under_error_key() {
        let env = GatewayError::NotFound("nope".into()).body().to_envelope();
        assert_eq!(env["error"]["code"], "NOT_FOUND");
        assert!(env["error"].get("details").is_none());
    }

    #[test]
    fn timeout_maps_to_504() {
        let err = GatewayError::Timeout(std::time::Duration::from_secs(5));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code(), "TIMEOUT_ERROR");
    }

    #[test]
    fn sub_second_timeouts_keep_their_precision() {
        let err = GatewayError::Timeout(std::time::Duration::from_millis(250));
        assert_eq!(err.to_string(), "Processing timed out after 250ms");
        assert_eq!(err.details(), Some(json!({ "timeout_ms": 250 })));
    }
}
