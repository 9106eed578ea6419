// Application state shared by every route and the MCP sessions.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::KeySet;
use crate::config::GatewayConfig;
use crate::engine::ExecutionEngine;
use crate::logs::LogRingBuffer;
use crate::marshal::Marshaler;
use crate::plugins::catalog::HandlerCatalog;
use crate::plugins::registry::{self, Registry};
use crate::queue::{JobQueue, QueueSettings};

/// Clone-friendly: every field is an `Arc` or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<Registry>,
    pub engine: ExecutionEngine,
    pub queue: Arc<JobQueue>,
    pub keys: Arc<KeySet>,
    pub log_buffer: Arc<LogRingBuffer>,
    pub start_time: Instant,
    /// Cancels background tasks (reload watcher) on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Discover plugins, open the job queue and wire everything together.
    /// Workers and the reload watcher are started separately by [`AppState::start`].
    pub fn new(config: GatewayConfig, catalog: HandlerCatalog, log_buffer: Arc<LogRingBuffer>) -> Self {
        let (registry, report) = Registry::load(&config.plugin_dir, catalog);
        tracing::info!(
            "AppState: {} endpoints from {} ({} rejected, {} modules skipped)",
            report.accepted.len(),
            config.plugin_dir.display(),
            report.rejected.len(),
            report.skipped_modules.len()
        );
        let registry = Arc::new(registry);

        let engine = ExecutionEngine::new(
            registry.clone(),
            Marshaler::new(&config.temp_dir),
            config.process_timeout,
            config.clear_temp_after_processing,
        );
        let queue = JobQueue::open(QueueSettings::from_config(&config), engine.clone());
        let keys = KeySet::new(config.api_keys.iter().cloned());

        Self {
            config: Arc::new(config),
            registry,
            engine,
            queue,
            keys: Arc::new(keys),
            log_buffer,
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start the worker pool and, if enabled, the reload watcher.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        self.queue.start_workers();
        if self.config.reload_interval.is_zero() {
            tracing::info!("plugins: hot reload disabled");
            return None;
        }
        Some(registry::spawn_reload_watcher(
            self.registry.clone(),
            self.config.reload_interval,
            self.shutdown.clone(),
        ))
    }

    /// Stop background tasks and drain the workers.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.queue.shutdown().await;
    }
}
