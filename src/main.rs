use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use nexus_gateway::config::GatewayConfig;
use nexus_gateway::logs::{DEFAULT_CAPACITY, LogBufferLayer, LogRingBuffer};
use nexus_gateway::plugins::catalog::HandlerCatalog;
use nexus_gateway::state::AppState;

/// Base64 payloads make requests large; 64 MiB leaves room for short videos.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

fn init_tracing(log_buffer: Arc<LogRingBuffer>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json");
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .with(LogBufferLayer::new(log_buffer))
        .init();
}

fn build_app(state: AppState) -> anyhow::Result<axum::Router> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(86_400));

    // Security headers
    let nosniff: SetResponseHeaderLayer<HeaderValue> = SetResponseHeaderLayer::overriding(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    let frame_deny: SetResponseHeaderLayer<HeaderValue> = SetResponseHeaderLayer::overriding(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    );
    let referrer: SetResponseHeaderLayer<HeaderValue> = SetResponseHeaderLayer::overriding(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    // Rate limiting: 60 req burst, replenish 10 per second, per IP
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(10)
        .burst_size(60)
        .finish()
        .context("invalid rate limiter configuration")?;

    Ok(nexus_gateway::create_router(state)
        .layer(GovernorLayer::new(governor_conf))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(nosniff)
        .layer(frame_deny)
        .layer(referrer)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CompressionLayer::new()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_buffer = Arc::new(LogRingBuffer::new(DEFAULT_CAPACITY));
    init_tracing(log_buffer.clone());

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("cannot create {}", config.temp_dir.display()))?;
    if let Some(parent) = config.state_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let state = AppState::new(config, HandlerCatalog::builtin(), log_buffer);
    let watcher = state.start();
    let app = build_app(state.clone())?;

    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    tracing::info!(
        "Nexus Gateway v{} listening on http://{} (docs at {}/openapi/openapi.json)",
        env!("CARGO_PKG_VERSION"),
        addr,
        state.config.public_url()
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
    .await?;

    state.shutdown().await;
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    tracing::info!("Nexus Gateway stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels `token` so open MCP sessions
/// close and the server can drain.
async fn shutdown_signal(token: tokio_util::sync::CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown");
    token.cancel();
}
