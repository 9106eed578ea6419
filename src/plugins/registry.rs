// ---------------------------------------------------------------------------
// plugins/registry.rs - discovery, live endpoint table, hot reload
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::catalog::HandlerCatalog;
use super::compat::{self, Verdict};
use super::manifest::{self, ModuleManifest, Snapshot};
use super::{EndpointDescriptor, endpoint_name};

/// One immutable revision of the endpoint table.
#[derive(Debug, Default)]
pub struct EndpointTable {
    pub revision: u64,
    pub endpoints: BTreeMap<String, Arc<EndpointDescriptor>>,
    /// Module name → description, for documentation grouping.
    pub modules: BTreeMap<String, String>,
}

impl EndpointTable {
    pub fn get(&self, path: &str) -> Option<&Arc<EndpointDescriptor>> {
        self.endpoints.get(path)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EndpointDescriptor>> {
        self.endpoints.values()
    }
}

/// What a discovery pass accepted and rejected.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DiscoveryReport {
    pub revision: u64,
    pub accepted: Vec<String>,
    /// `(candidate, reason)` for handlers with a non-compatible verdict, or
    /// replaced by a later declaration of the same path.
    pub rejected: Vec<(String, String)>,
    /// `(module, reason)` for modules that could not be loaded at all.
    pub skipped_modules: Vec<(String, String)>,
}

pub struct Registry {
    root: PathBuf,
    catalog: HandlerCatalog,
    table: RwLock<Arc<EndpointTable>>,
    snapshot: std::sync::Mutex<Snapshot>,
    next_revision: AtomicU64,
}

impl Registry {
    /// Run the initial discovery pass and publish revision 1.
    pub fn load(root: impl Into<PathBuf>, catalog: HandlerCatalog) -> (Self, DiscoveryReport) {
        let root = root.into();
        let (table, report, snapshot) = discover(&root, &catalog, 1);
        let registry = Self {
            root,
            catalog,
            table: RwLock::new(Arc::new(table)),
            snapshot: std::sync::Mutex::new(snapshot),
            next_revision: AtomicU64::new(2),
        };
        (registry, report)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current table. The read lock is released before returning, so callers
    /// keep a consistent revision for as long as they hold the `Arc`.
    pub async fn table(&self) -> Arc<EndpointTable> {
        self.table.read().await.clone()
    }

    pub async fn get(&self, path: &str) -> Option<Arc<EndpointDescriptor>> {
        self.table.read().await.get(path).cloned()
    }

    /// True when a manifest was added, removed or modified since the last pass.
    pub fn check_for_changes(&self) -> bool {
        let current = match manifest::find_manifests(&self.root) {
            Ok(files) => manifest::snapshot(&files),
            Err(_) => Snapshot::new(),
        };
        let last = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        *last != current
    }

    /// Full re-discovery followed by an atomic swap of the table.
    pub async fn reload(&self) -> DiscoveryReport {
        let revision = self.next_revision.fetch_add(1, Ordering::SeqCst);
        let (table, report, snapshot) = discover(&self.root, &self.catalog, revision);
        *self.snapshot.lock().unwrap_or_else(|p| p.into_inner()) = snapshot;
        let count = table.len();
        *self.table.write().await = Arc::new(table);
        tracing::info!(revision, endpoints = count, "plugins: endpoint table reloaded");
        report
    }
}

fn discover(root: &Path, catalog: &HandlerCatalog, revision: u64) -> (EndpointTable, DiscoveryReport, Snapshot) {
    let mut table = EndpointTable {
        revision,
        ..Default::default()
    };
    let mut report = DiscoveryReport {
        revision,
        ..Default::default()
    };

    let files = match manifest::find_manifests(root) {
        Ok(files) => files,
        Err(e) => {
            tracing::error!("plugins: {}", e);
            return (table, report, Snapshot::new());
        }
    };
    let snapshot = manifest::snapshot(&files);

    for file in &files {
        let module = match ModuleManifest::load(&file.path) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("plugins: skipping module {}: {:#}", file.module, e);
                report.skipped_modules.push((file.module.clone(), format!("{:#}", e)));
                continue;
            }
        };

        let missing: Vec<&str> = module
            .requires
            .iter()
            .map(String::as_str)
            .filter(|entry| !catalog.contains(entry))
            .collect();
        if !missing.is_empty() {
            let reason = format!("unresolved dependencies: {}", missing.join(", "));
            tracing::error!("plugins: skipping module {}: {}", file.module, reason);
            report.skipped_modules.push((file.module.clone(), reason));
            continue;
        }

        table
            .modules
            .insert(file.module.clone(), module.description.clone().unwrap_or_default());

        for (handler_name, decl) in &module.handlers {
            let endpoint = endpoint_name(handler_name);
            let path = format!("{}/{}", file.module, endpoint);
            if endpoint.is_empty() {
                let reason = "Handler name has no alphanumeric characters".to_string();
                tracing::warn!("plugins: {} incompatible: {}", path, reason);
                report.rejected.push((path, reason));
                continue;
            }

            let ok = match compat::check(decl, catalog) {
                Verdict::FullyCompatible(ok) => ok,
                other => {
                    let reason = other.reason().unwrap_or("incompatible").to_string();
                    tracing::warn!("plugins: {} incompatible: {}", path, reason);
                    report.rejected.push((path, reason));
                    continue;
                }
            };

            let descriptor = EndpointDescriptor {
                path: path.clone(),
                module: file.module.clone(),
                endpoint,
                handler_name: handler_name.clone(),
                display_name: module
                    .display_names
                    .get(handler_name)
                    .cloned()
                    .unwrap_or_else(|| handler_name.clone()),
                description: decl.description.clone().unwrap_or_default(),
                category: decl.category.clone().unwrap_or_else(|| file.module.clone()),
                inputs: ok.inputs,
                outputs: ok.outputs,
                queue_mode: module.queue_mode.get(handler_name).copied().unwrap_or(false),
                handler: ok.handler,
            };

            match table.endpoints.insert(path.clone(), Arc::new(descriptor)) {
                Some(replaced) => {
                    let reason = format!(
                        "Handler {} in module {} replaced by {} in module {}",
                        replaced.handler_name, replaced.module, handler_name, file.module
                    );
                    tracing::warn!("plugins: duplicate endpoint {}: {}", path, reason);
                    report.rejected.push((path.clone(), reason));
                }
                None => report.accepted.push(path.clone()),
            }
            tracing::debug!("plugins: registered {}", path);
        }
    }

    tracing::info!(
        revision,
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        skipped_modules = report.skipped_modules.len(),
        "plugins: discovery complete"
    );
    (table, report, snapshot)
}

/// Poll for manifest changes and reload when any are found.
pub fn spawn_reload_watcher(
    registry: Arc<Registry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("plugins: reload watcher started (interval={}s)", interval.as_secs());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if registry.check_for_changes() {
                tracing::info!("plugins: change detected in {}", registry.root().display());
                registry.reload().await;
            }
        }
        tracing::debug!("plugins: reload watcher stopped");
    })
}
