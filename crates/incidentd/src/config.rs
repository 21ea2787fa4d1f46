//! Configuration management for incidentd.
//!
//! Loads settings from a TOML file or uses defaults. Every field carries a
//! serde default, so partial files only override what they mention.

use anyhow::{Context, Result};
use incident_common::{EmbeddingConfig, LlmConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "INCIDENTD_CONFIG";

/// Config file in the working directory
pub const LOCAL_CONFIG_PATH: &str = "incidentd.toml";

/// System-wide config file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/incidentd/config.toml";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Prefix all routes are mounted under
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,

    /// Budget for one whole conversational turn
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Fallback log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind() -> String {
    "0.0.0.0:8010".to_string()
}

fn default_route_prefix() -> String {
    "/rag-api".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            route_prefix: default_route_prefix(),
            request_timeout_secs: default_request_timeout(),
            log_level: default_log_level(),
        }
    }
}

/// Persisted vector store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Documents embedded per batch during ingestion
    #[serde(default = "default_ingest_batch_size")]
    pub ingest_batch_size: usize,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("vector_db")
}

fn default_ingest_batch_size() -> usize {
    50
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            ingest_batch_size: default_ingest_batch_size(),
        }
    }
}

/// Result counts for each kind of lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Exact incident-number lookups (wide: surface every related entry)
    #[serde(default = "default_incident_k")]
    pub incident_k: usize,

    /// Free-text phrase lookups against the ticket corpus
    #[serde(default = "default_query_k")]
    pub query_k: usize,

    /// Free-text phrase lookups against the feedback corpus
    #[serde(default = "default_feedback_k")]
    pub feedback_k: usize,

    /// Search phrases kept from one classification
    #[serde(default = "default_max_search_queries")]
    pub max_search_queries: usize,
}

fn default_incident_k() -> usize {
    8
}

fn default_query_k() -> usize {
    2
}

fn default_feedback_k() -> usize {
    2
}

fn default_max_search_queries() -> usize {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            incident_k: default_incident_k(),
            query_k: default_query_k(),
            feedback_k: default_feedback_k(),
            max_search_queries: default_max_search_queries(),
        }
    }
}

/// Workflow controller limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Revision passes allowed after the first answer of a turn
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
}

fn default_max_revisions() -> u32 {
    3
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl Config {
    /// Load config: explicit path, then $INCIDENTD_CONFIG, then the local
    /// and system files, then defaults. An explicit path that fails to load
    /// is an error; the implicit locations fall back silently.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&path));
        }

        for candidate in [LOCAL_CONFIG_PATH, SYSTEM_CONFIG_PATH] {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        warn!("Config not found, using defaults");
        Ok(Config::default())
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.route_prefix, "/rag-api");
        assert_eq!(config.retrieval.incident_k, 8);
        assert_eq!(config.retrieval.query_k, 2);
        assert_eq!(config.retrieval.feedback_k, 2);
        assert_eq!(config.workflow.max_revisions, 3);
        assert_eq!(config.llm.model, "gemma3:latest");
        assert_eq!(config.embeddings.model, "embeddinggemma:latest");
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
[llm]
model = "llama3.2:3b"

[retrieval]
incident_k = 12

[workflow]
max_revisions = 1
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.model, "llama3.2:3b");
        assert_eq!(config.llm.endpoint, "http://localhost:11434");
        assert_eq!(config.retrieval.incident_k, 12);
        assert_eq!(config.retrieval.query_k, 2);
        assert_eq!(config.workflow.max_revisions, 1);
        assert_eq!(config.store.ingest_batch_size, 50);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incidentd.toml");
        fs::write(&path, "[server]\nbind = \"127.0.0.1:9000\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.request_timeout_secs, 300);
    }

    #[test]
    fn test_load_explicit_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[workflow]\nmax_revisions = \"many\"\n").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }
}
