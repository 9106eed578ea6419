// Gateway configuration
//
// Every setting comes from a NEXUS_* environment variable (a `.env` file is
// honoured via dotenvy in main). Missing keys fall back to defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub api_keys: Vec<String>,
    pub plugin_dir: PathBuf,
    pub readme_path: PathBuf,

    // ── processing ──
    pub max_workers: usize,
    pub max_queue_depth: usize,
    pub process_timeout: Duration,
    pub state_file: PathBuf,
    pub temp_dir: PathBuf,
    pub resume_on_startup: bool,
    pub clear_temp_on_startup: bool,
    pub clear_temp_after_processing: bool,
    /// Zero disables hot reload.
    pub reload_interval: Duration,

    // ── MCP ──
    pub mcp_enabled: bool,
    pub mcp_server_name: String,
    pub mcp_server_version: String,
    pub mcp_server_description: String,
    pub mcp_auto_map_apis: bool,
    pub mcp_excluded_apis: Vec<String>,
    pub mcp_expose_queue: bool,
    pub mcp_expose_docs: bool,
    pub mcp_expose_logs: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 43080,
            api_keys: Vec::new(),
            plugin_dir: PathBuf::from("plugins"),
            readme_path: PathBuf::from("README.md"),
            max_workers: 10,
            max_queue_depth: 100,
            process_timeout: Duration::from_secs(300),
            state_file: PathBuf::from("processing/state.json"),
            temp_dir: PathBuf::from("processing/tmp"),
            resume_on_startup: true,
            clear_temp_on_startup: true,
            clear_temp_after_processing: true,
            reload_interval: Duration::from_secs(120),
            mcp_enabled: true,
            mcp_server_name: "nexus-gateway".to_string(),
            mcp_server_version: env!("CARGO_PKG_VERSION").to_string(),
            mcp_server_description: "Pluggable API gateway exposing plugin endpoints as tools"
                .to_string(),
            mcp_auto_map_apis: true,
            mcp_excluded_apis: Vec::new(),
            mcp_expose_queue: true,
            mcp_expose_docs: true,
            mcp_expose_logs: false,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Tests pass a closure over a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("NEXUS_HOST") {
            cfg.host = v;
        }
        if let Some(v) = get("NEXUS_PORT").or_else(|| get("PORT")) {
            cfg.port = parse_num("NEXUS_PORT", &v)?;
        }
        if let Some(v) = get("NEXUS_API_KEYS") {
            cfg.api_keys = split_list(&v);
        }
        if let Some(v) = get("NEXUS_PLUGIN_DIR") {
            cfg.plugin_dir = PathBuf::from(v);
        }
        if let Some(v) = get("NEXUS_README_PATH") {
            cfg.readme_path = PathBuf::from(v);
        }
        if let Some(v) = get("NEXUS_MAX_WORKERS") {
            cfg.max_workers = parse_num("NEXUS_MAX_WORKERS", &v)?;
            if cfg.max_workers == 0 {
                bail!("NEXUS_MAX_WORKERS must be at least 1");
            }
        }
        if let Some(v) = get("NEXUS_MAX_QUEUE_DEPTH") {
            cfg.max_queue_depth = parse_num("NEXUS_MAX_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = get("NEXUS_PROCESS_TIMEOUT_SECS") {
            cfg.process_timeout = Duration::from_secs(parse_num("NEXUS_PROCESS_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("NEXUS_STATE_FILE") {
            cfg.state_file = PathBuf::from(v);
        }
        if let Some(v) = get("NEXUS_TEMP_DIR") {
            cfg.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = get("NEXUS_RESUME_ON_STARTUP") {
            cfg.resume_on_startup = parse_bool("NEXUS_RESUME_ON_STARTUP", &v)?;
        }
        if let Some(v) = get("NEXUS_CLEAR_TEMP_ON_STARTUP") {
            cfg.clear_temp_on_startup = parse_bool("NEXUS_CLEAR_TEMP_ON_STARTUP", &v)?;
        }
        if let Some(v) = get("NEXUS_CLEAR_TEMP_AFTER_PROCESSING") {
            cfg.clear_temp_after_processing = parse_bool("NEXUS_CLEAR_TEMP_AFTER_PROCESSING", &v)?;
        }
        if let Some(v) = get("NEXUS_RELOAD_INTERVAL_SECS") {
            cfg.reload_interval = Duration::from_secs(parse_num("NEXUS_RELOAD_INTERVAL_SECS", &v)?);
        }

        if let Some(v) = get("NEXUS_MCP_ENABLED") {
            cfg.mcp_enabled = parse_bool("NEXUS_MCP_ENABLED", &v)?;
        }
        if let Some(v) = get("NEXUS_MCP_SERVER_NAME") {
            cfg.mcp_server_name = v;
        }
        if let Some(v) = get("NEXUS_MCP_SERVER_VERSION") {
            cfg.mcp_server_version = v;
        }
        if let Some(v) = get("NEXUS_MCP_SERVER_DESCRIPTION") {
            cfg.mcp_server_description = v;
        }
        if let Some(v) = get("NEXUS_MCP_AUTO_MAP_APIS") {
            cfg.mcp_auto_map_apis = parse_bool("NEXUS_MCP_AUTO_MAP_APIS", &v)?;
        }
        if let Some(v) = get("NEXUS_MCP_EXCLUDED_APIS") {
            cfg.mcp_excluded_apis = split_list(&v);
        }
        if let Some(v) = get("NEXUS_MCP_EXPOSE_QUEUE") {
            cfg.mcp_expose_queue = parse_bool("NEXUS_MCP_EXPOSE_QUEUE", &v)?;
        }
        if let Some(v) = get("NEXUS_MCP_EXPOSE_DOCS") {
            cfg.mcp_expose_docs = parse_bool("NEXUS_MCP_EXPOSE_DOCS", &v)?;
        }
        if let Some(v) = get("NEXUS_MCP_EXPOSE_LOGS") {
            cfg.mcp_expose_logs = parse_bool("NEXUS_MCP_EXPOSE_LOGS", &v)?;
        }

        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL advertised in the OpenAPI `servers` list.
    pub fn public_url(&self) -> String {
        let host = if self.host == "0.0.0.0" { "localhost" } else { self.host.as_str() };
        format!("http://{}:{}", host, self.port)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_num<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{} has invalid value '{}'", key, raw))
}

fn parse_bool(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{} has invalid boolean '{}'", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<GatewayConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.port, 43080);
        assert_eq!(cfg.max_workers, 10);
        assert_eq!(cfg.max_queue_depth, 100);
        assert_eq!(cfg.process_timeout, Duration::from_secs(300));
        assert_eq!(cfg.reload_interval, Duration::from_secs(120));
        assert!(cfg.resume_on_startup);
        assert!(!cfg.mcp_expose_logs);
    }

    #[test]
    fn lists_and_flags_are_parsed() {
        let cfg = from_pairs(&[
            ("NEXUS_API_KEYS", " a , b,,c "),
            ("NEXUS_MCP_EXCLUDED_APIS", "demo/slowJob"),
            ("NEXUS_RESUME_ON_STARTUP", "off"),
            ("PORT", "9000"),
        ])
        .unwrap();
        assert_eq!(cfg.api_keys, vec!["a", "b", "c"]);
        assert_eq!(cfg.mcp_excluded_apis, vec!["demo/slowJob"]);
        assert!(!cfg.resume_on_startup);
        assert_eq!(cfg.port, 9000);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = from_pairs(&[("NEXUS_MAX_WORKERS", "many")]).unwrap_err();
        assert!(err.to_string().contains("NEXUS_MAX_WORKERS"));
        assert!(from_pairs(&[("NEXUS_MAX_WORKERS", "0")]).is_err());
        assert!(from_pairs(&[("NEXUS_MCP_ENABLED", "maybe")]).is_err());
    }
}
