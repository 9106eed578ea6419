use std::collections::BTreeMap;
use std::sync::Arc;

use super::Handler;

/// Compiled handlers keyed by entry name. Manifests reference handlers only
/// through this map, so a manifest can never reach code that was not linked in.
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    entries: BTreeMap<String, Arc<dyn Handler>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in handler registered.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        super::builtin::register_all(&mut catalog);
        catalog
    }

    pub fn register<H: Handler>(&mut self, entry: impl Into<String>, handler: H) -> &mut Self {
        let entry = entry.into();
        if self.entries.insert(entry.clone(), Arc::new(handler)).is_some() {
            tracing::warn!("catalog: handler '{}' registered twice, keeping the last", entry);
        }
        self
    }

    pub fn with<H: Handler>(mut self, entry: impl Into<String>, handler: H) -> Self {
        self.register(entry, handler);
        self
    }

    pub fn get(&self, entry: &str) -> Option<Arc<dyn Handler>> {
        self.entries.get(entry).cloned()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains_key(entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
