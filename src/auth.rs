// Bearer authorization gate
//
// REST routes use `Authorization: Bearer <key>`. The MCP WebSocket upgrade
// additionally accepts `?token=<key>` because browsers cannot set headers on
// the upgrade request. Keys compare in constant time. Jobs store only a
// SHA-256 fingerprint of the submitting key.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::GatewayError;
use crate::state::AppState;

/// An authenticated bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Hex SHA-256 of the key. This is what gets persisted as a job owner.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }

    pub fn owns(&self, owner_fingerprint: &str) -> bool {
        self.fingerprint()
            .as_bytes()
            .ct_eq(owner_fingerprint.as_bytes())
            .into()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(**redacted**)")
    }
}

/// The configured set of valid keys.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: Vec<String>,
}

impl KeySet {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        let keys: Vec<String> = keys.into_iter().filter(|k| !k.is_empty()).collect();
        if keys.is_empty() {
            tracing::warn!("auth: no API keys configured, every authenticated route will return 401");
        }
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares against every key so timing does not reveal which one matched.
    pub fn verify(&self, token: &str) -> Option<Credential> {
        let mut matched = subtle::Choice::from(0u8);
        for key in &self.keys {
            matched |= key.as_bytes().ct_eq(token.as_bytes());
        }
        bool::from(matched).then(|| Credential::new(token))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn query_token(query: &str) -> Option<&str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value)
}

/// Credential for a WebSocket upgrade: header first, then `?token=`.
pub fn ws_credential(headers: &HeaderMap, query: Option<&str>, keys: &KeySet) -> Option<Credential> {
    bearer_token(headers)
        .or_else(|| query.and_then(query_token))
        .and_then(|token| keys.verify(token))
}

/// Middleware for every non-documentation route. On success the credential
/// is attached as a request extension for handlers to extract.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let credential = match bearer_token(request.headers()) {
        Some(token) => state.keys.verify(token),
        None => {
            tracing::warn!("auth: missing or malformed Authorization header");
            return Err(GatewayError::Unauthorized("Missing API key".into()));
        }
    };
    let Some(credential) = credential else {
        tracing::warn!("auth: invalid API key");
        return Err(GatewayError::Unauthorized("Invalid API key".into()));
    };
    request.extensions_mut().insert(credential);
    Ok(next.run(request).await)
}
