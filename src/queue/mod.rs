// ---------------------------------------------------------------------------
// queue - durable job queue with a bounded worker pool
// ---------------------------------------------------------------------------
//
// Lock order: `JobQueue::inner` guards the job map. Every transition encodes a
// numbered snapshot while holding it; the file write happens after it is
// released, under `JobQueue::written`, and a snapshot older than the last one
// written is dropped. `inner` is never held while a handler runs or while
// the file is written, and the registry lock is never taken while it is held.

pub mod job;
pub mod store;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::Credential;
use crate::engine::ExecutionEngine;
use crate::error::GatewayError;
use crate::marshal;

pub use job::{Job, JobOutcome, JobStatus};
pub use store::StateStore;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_depth: usize,
    pub workers: usize,
    pub state_file: PathBuf,
    pub temp_dir: PathBuf,
    pub resume_on_startup: bool,
    pub clear_temp_on_startup: bool,
}

impl QueueSettings {
    pub fn from_config(cfg: &crate::config::GatewayConfig) -> Self {
        Self {
            max_depth: cfg.max_queue_depth,
            workers: cfg.max_workers,
            state_file: cfg.state_file.clone(),
            temp_dir: cfg.temp_dir.clone(),
            resume_on_startup: cfg.resume_on_startup,
            clear_temp_on_startup: cfg.clear_temp_on_startup,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq, utoipa::ToSchema)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub max_depth: usize,
    pub workers: usize,
}

struct QueueInner {
    jobs: HashMap<String, Job>,
    revision: u64,
}

/// Encoded job map, numbered in transition order.
struct Snapshot {
    revision: u64,
    bytes: Vec<u8>,
}

impl QueueInner {
    fn snapshot(&mut self) -> Option<Snapshot> {
        self.revision += 1;
        match StateStore::encode(self.jobs.values()) {
            Ok(bytes) => Some(Snapshot {
                revision: self.revision,
                bytes,
            }),
            Err(e) => {
                tracing::warn!("queue: failed to encode state: {:#}", e);
                None
            }
        }
    }

    fn queued_count(&self) -> usize {
        self.jobs.values().filter(|j| j.status == JobStatus::Queued).count()
    }
}

pub struct JobQueue {
    inner: Mutex<QueueInner>,
    store: StateStore,
    /// Revision of the last snapshot on disk.
    written: Mutex<u64>,
    engine: ExecutionEngine,
    settings: QueueSettings,
    tx: mpsc::Sender<String>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    shutdown: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Load (or reset) persisted state and prepare the dispatch channel.
    /// Workers are not running until [`JobQueue::start_workers`].
    pub fn open(settings: QueueSettings, engine: ExecutionEngine) -> Arc<Self> {
        let store = StateStore::new(&settings.state_file);
        let mut jobs = HashMap::new();
        let mut pending: Vec<(chrono::DateTime<chrono::Utc>, String)> = Vec::new();

        if settings.resume_on_startup {
            match store.load() {
                Ok(loaded) => {
                    for mut job in loaded {
                        if job.reset_for_resume() {
                            pending.push((job.created_at, job.queue_id.clone()));
                        }
                        jobs.insert(job.queue_id.clone(), job);
                    }
                    tracing::info!(
                        "queue: restored {} jobs ({} pending) from {}",
                        jobs.len(),
                        pending.len(),
                        store.path().display()
                    );
                }
                Err(e) => {
                    tracing::error!("queue: failed to load state, starting empty: {:#}", e);
                    marshal::clear_temp_dir(&settings.temp_dir);
                }
            }
        } else if settings.clear_temp_on_startup {
            marshal::clear_temp_dir(&settings.temp_dir);
        }

        pending.sort();
        let capacity = settings.max_depth.max(pending.len()).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        for (_, id) in &pending {
            if let Err(e) = tx.try_send(id.clone()) {
                tracing::error!("queue: could not re-enqueue {}: {}", id, e);
            }
        }

        if !pending.is_empty() {
            if let Err(e) = store.save(jobs.values()) {
                tracing::warn!("queue: failed to persist state to {}: {:#}", store.path().display(), e);
            }
        }

        Arc::new(Self {
            inner: Mutex::new(QueueInner { jobs, revision: 0 }),
            store,
            written: Mutex::new(0),
            engine,
            settings,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            shutdown: CancellationToken::new(),
            workers: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn start_workers(self: &Arc<Self>) {
        let mut handles = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        if !handles.is_empty() {
            return;
        }
        for n in 0..self.settings.workers.max(1) {
            let queue = Arc::clone(self);
            handles.push(tokio::spawn(async move { queue.worker_loop(n).await }));
        }
        tracing::info!("queue: {} workers started", handles.len());
    }

    /// Create a queued job owned by `owner` and hand it to the workers.
    pub async fn submit(&self, owner: &Credential, endpoint: &str, data: Value) -> Result<String, GatewayError> {
        if self.shutdown.is_cancelled() {
            return Err(GatewayError::Api("Queue is shutting down".into()));
        }
        if self.engine.registry().get(endpoint).await.is_none() {
            return Err(GatewayError::NotFound(format!("API endpoint {} not found", endpoint)));
        }

        let (queue_id, snapshot) = {
            let mut inner = self.inner.lock().await;
            if inner.queued_count() >= self.settings.max_depth {
                tracing::warn!("queue: rejecting job for {}, queue is full", endpoint);
                return Err(GatewayError::QueueFull {
                    max_depth: self.settings.max_depth,
                });
            }
            let job = Job::new(owner.fingerprint(), endpoint, data);
            let id = job.queue_id.clone();
            inner.jobs.insert(id.clone(), job);
            (id, inner.snapshot())
        };
        self.persist(snapshot).await;

        if self.tx.send(queue_id.clone()).await.is_err() {
            return Err(GatewayError::Api("Queue is shutting down".into()));
        }
        tracing::info!("queue: job {} queued for {}", queue_id, endpoint);
        Ok(queue_id)
    }

    /// Job snapshot, visible only to its owner.
    pub async fn job(&self, queue_id: &str, caller: &Credential) -> Result<Job, GatewayError> {
        let inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get(queue_id)
            .ok_or_else(|| GatewayError::NotFound(format!("Queue item {} not found", queue_id)))?;
        if !caller.owns(&job.owner) {
            tracing::warn!("queue: ownership check failed for {}", queue_id);
            return Err(GatewayError::Unauthorized("Unauthorized access to queue item".into()));
        }
        Ok(job.clone())
    }

    pub async fn status(&self, queue_id: &str, caller: &Credential) -> Result<JobOutcome, GatewayError> {
        self.job(queue_id, caller).await.map(|job| JobOutcome::from_job(&job))
    }

    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        let mut stats = QueueStats {
            max_depth: self.settings.max_depth,
            workers: self.settings.workers,
            ..Default::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Stop taking new work and wait for running jobs to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(|p| p.into_inner()));
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("queue: worker ended abnormally: {}", e);
            }
        }
        tracing::info!("queue: workers stopped");
    }

    async fn persist(&self, snapshot: Option<Snapshot>) {
        let Some(snapshot) = snapshot else { return };
        let mut written = self.written.lock().await;
        if snapshot.revision <= *written {
            return;
        }
        match self.store.write(snapshot.bytes).await {
            Ok(()) => *written = snapshot.revision,
            Err(e) => {
                tracing::warn!("queue: failed to persist state to {}: {:#}", self.store.path().display(), e);
            }
        }
    }

    async fn worker_loop(self: Arc<Self>, n: usize) {
        tracing::debug!("queue: worker {} started", n);
        loop {
            let next = {
                let mut rx = self.rx.lock().await;
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => None,
                    id = rx.recv() => id,
                }
            };
            let Some(queue_id) = next else { break };
            self.process(&queue_id).await;
        }
        tracing::debug!("queue: worker {} stopped", n);
    }

    async fn process(&self, queue_id: &str) {
        let (endpoint, data, snapshot) = {
            let mut inner = self.inner.lock().await;
            let Some(job) = inner.jobs.get_mut(queue_id) else {
                tracing::warn!("queue: dispatched job {} no longer exists", queue_id);
                return;
            };
            if let Err(e) = job.start() {
                tracing::warn!("queue: skipping job {}: {}", queue_id, e);
                return;
            }
            let (endpoint, data) = (job.endpoint.clone(), job.data.clone());
            (endpoint, data, inner.snapshot())
        };
        self.persist(snapshot).await;

        tracing::info!("queue: processing job {} ({})", queue_id, endpoint);
        let outcome = self.engine.execute(&endpoint, data).await;

        let snapshot = {
            let mut inner = self.inner.lock().await;
            let Some(job) = inner.jobs.get_mut(queue_id) else { return };
            let transition = match outcome {
                Ok(result) => {
                    tracing::info!("queue: job {} completed", queue_id);
                    job.complete(result)
                }
                Err(e) => {
                    tracing::warn!("queue: job {} failed: {}", queue_id, e);
                    job.fail(e.body())
                }
            };
            if let Err(e) = transition {
                tracing::error!("queue: job {}: {}", queue_id, e);
            }
            inner.snapshot()
        };
        self.persist(snapshot).await;
    }
}
