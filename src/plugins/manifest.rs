// Plugin module manifests
//
// Layout under the plugin root:
//   foo.toml        -> module "foo"
//   pkg/mod.toml    -> module "pkg"
//   pkg/bar.toml    -> module "pkg.bar"
// Any path component starting with `_` is private and skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
    #[serde(default)]
    pub description: Option<String>,
    /// Catalog entries that must be present before the module is loaded.
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerDecl>,
    #[serde(default)]
    pub display_names: BTreeMap<String, String>,
    #[serde(default)]
    pub queue_mode: BTreeMap<String, bool>,
}

/// Raw handler declaration. Everything is optional so that the compatibility
/// check, not the parser, reports what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlerDecl {
    pub entry: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub inputs: Option<Vec<InputDecl>>,
    pub outputs: Option<Vec<OutputDecl>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub default: Option<Value>,
    #[serde(rename = "enum")]
    pub choices: Option<Vec<String>>,
    #[serde(default)]
    pub multiline: bool,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ModuleManifest {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// A manifest file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub module: String,
    pub path: PathBuf,
}

/// Find every public manifest under `root`, sorted by module name.
pub fn find_manifests(root: &Path) -> anyhow::Result<Vec<ManifestFile>> {
    if !root.is_dir() {
        anyhow::bail!("plugin directory {} does not exist", root.display());
    }
    let pattern = root.join("**").join("*.toml");
    let pattern = pattern
        .to_str()
        .with_context(|| format!("plugin directory {} is not valid UTF-8", root.display()))?;

    let mut found = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("plugins: unreadable path during discovery: {}", e);
                continue;
            }
        };
        let Ok(rel) = path.strip_prefix(root) else { continue };
        if let Some(module) = module_name(rel) {
            found.push(ManifestFile { module, path });
        }
    }
    found.sort_by(|a, b| a.module.cmp(&b.module));
    Ok(found)
}

/// Module name for a manifest path relative to the plugin root, or `None`
/// when any component is private.
pub fn module_name(rel: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let components: Vec<&str> = rel.iter().filter_map(|c| c.to_str()).collect();
    let (file, dirs) = components.split_last()?;
    for dir in dirs {
        if dir.starts_with('_') {
            return None;
        }
        parts.push((*dir).to_string());
    }
    let stem = file.strip_suffix(".toml")?;
    if stem.starts_with('_') {
        return None;
    }
    if stem != "mod" {
        parts.push(stem.to_string());
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

/// Modification times of every manifest, used for change detection.
pub type Snapshot = BTreeMap<PathBuf, SystemTime>;

pub fn snapshot(files: &[ManifestFile]) -> Snapshot {
    files
        .iter()
        .map(|f| {
            let mtime = std::fs::metadata(&f.path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (f.path.clone(), mtime)
        })
        .collect()
}
