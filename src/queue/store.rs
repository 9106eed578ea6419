// Persisted queue snapshot: `{"queue": [Job, ...]}`, rewritten atomically on
// every transition. Snapshots are encoded under the queue lock and written
// afterwards with tokio::fs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::job::Job;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    queue: Vec<Job>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means an empty queue. A present but unreadable file is an error.
    pub fn load(&self) -> anyhow::Result<Vec<Job>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let state: StateFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(state.queue)
    }

    /// Serialize a snapshot, oldest job first.
    pub fn encode<'a, I>(jobs: I) -> anyhow::Result<Vec<u8>>
    where
        I: IntoIterator<Item = &'a Job>,
    {
        let mut queue: Vec<&Job> = jobs.into_iter().collect();
        queue.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.queue_id.cmp(&b.queue_id)));
        Ok(serde_json::to_vec_pretty(&serde_json::json!({ "queue": queue }))?)
    }

    /// Blocking write, for startup before any worker runs.
    pub fn save<'a, I>(&self, jobs: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = &'a Job>,
    {
        let bytes = Self::encode(jobs)?;
        if let Some(parent) = self.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.tmp_path();
        std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }

    /// Write an encoded snapshot to `<file>.tmp` then rename over the target.
    pub async fn write(&self, bytes: Vec<u8>) -> anyhow::Result<()> {
        if let Some(parent) = self.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }

    fn parent(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_jobs_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));
        let mut done = Job::new("o".into(), "m/e", json!({}));
        done.start().unwrap();
        done.complete(json!({ "n": 42 })).unwrap();
        let queued = Job::new("o".into(), "m/e", json!({ "x": 1 }));

        store.save([&done, &queued]).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains(&done));
        assert!(loaded.contains(&queued));
        assert!(!dir.path().join("nested/state.json.tmp").exists());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(raw["queue"].is_array());
    }

    #[tokio::test]
    async fn async_write_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("deep/state.json"));
        let first = Job::new("o".into(), "m/e", json!({}));
        store.save([&first]).unwrap();

        let second = Job::new("o".into(), "m/e", json!({ "y": 2 }));
        store.write(StateStore::encode([&first, &second]).unwrap()).await.unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
        assert!(!dir.path().join("deep/state.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(StateStore::new(path).load().is_err());
    }
}
