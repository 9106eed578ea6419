pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod logs;
pub mod marshal;
pub mod mcp;
pub mod plugins;
pub mod queue;
pub mod state;
pub mod surface;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use state::AppState;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    // Documentation and health are public.
    let public = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/openapi/routes.json", get(handlers::route_table))
        .route("/openapi/{file}", get(handlers::openapi_document));

    let protected = Router::new()
        .route("/api/logs", get(logs::server_logs))
        .route("/api/{module}/{endpoint}", post(handlers::call_endpoint))
        .route("/api/{module}/{endpoint}/queue", post(handlers::queue_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    let mut app = public.merge(protected);
    if state.config.mcp_enabled {
        // Authenticated during the upgrade, see `mcp::server::mcp_ws`.
        app = app.route("/mcp", get(mcp::server::mcp_ws));
    }
    app.with_state(state)
}
