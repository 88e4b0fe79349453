//! Configuration for the indexer.
//!
//! Loaded from `$XDG_CONFIG_HOME/repo-index/config.toml` (or the platform
//! config dir), with defaults for every field when the file is absent.
//!
//! # Example
//!
//! ```toml
//! remediation_log = "/var/log/repo-index/remediation.jsonl"
//!
//! [index]
//! base_url = "http://search.internal:8983/solr/collection1"
//! request_timeout_secs = 60
//!
//! [indexing]
//! max_hierarchy_depth = 32
//!
//! [worker]
//! threads = 4
//! retry_attempts = 2
//!
//! [logging]
//! filter = "repo_index=debug,info"
//! directory = "/var/log/repo-index"
//! ```
//!
//! `REPO_INDEX_URL`, `REPO_INDEX_WORKERS` and `REPO_INDEX_MAX_DEPTH` override
//! the file (a `.env` file is honored).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::daemon::worker::{RetryPolicy, WorkerConfig};
use crate::indexer::IndexerOptions;
use crate::indexer::paths::DEFAULT_MAX_DEPTH;
use crate::search::client::SolrSettings;

pub const DEFAULT_INDEX_URL: &str = "http://localhost:8983/solr/";

const APP_DIR: &str = "repo-index";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn help_message(&self) -> &'static str {
        match self {
            ConfigError::Read(_) => "Check that the config file exists and is readable.",
            ConfigError::Parse(_) => "Fix the TOML syntax in the config file.",
            ConfigError::Serialize(_) => "The configuration could not be written back.",
            ConfigError::NoConfigDir => "Set XDG_CONFIG_HOME or pass --config explicitly.",
            ConfigError::Validation(_) => "Correct the reported setting and retry.",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INDEX_URL.to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSection {
    pub max_hierarchy_depth: usize,
    /// Include the root container in full reindex passes.
    pub index_root_container: bool,
}

impl Default for IndexingSection {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: DEFAULT_MAX_DEPTH,
            index_root_container: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub threads: usize,
    /// Extra attempts for targeted jobs that fail on connectivity.
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            threads: 2,
            retry_attempts: 0,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    /// Daily-rolling log files are written here when set.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub index: IndexSection,
    pub indexing: IndexingSection,
    pub worker: WorkerSection,
    pub logging: LoggingSection,
    pub remediation_log: Option<PathBuf>,
}

impl IndexerConfig {
    /// Load from the default location, apply env overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `$XDG_CONFIG_HOME/repo-index/config.toml`, else the platform config dir.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join(APP_DIR).join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join(APP_DIR).join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = dotenvy::var("REPO_INDEX_URL")
            && !val.trim().is_empty()
        {
            self.index.base_url = val.trim().to_string();
        }
        if let Ok(val) = dotenvy::var("REPO_INDEX_WORKERS")
            && let Ok(parsed) = val.parse::<usize>()
        {
            self.worker.threads = parsed;
        }
        if let Ok(val) = dotenvy::var("REPO_INDEX_MAX_DEPTH")
            && let Ok(parsed) = val.parse::<usize>()
        {
            self.indexing.max_hierarchy_depth = parsed;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.index.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Validation("index.base_url cannot be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "index.base_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.worker.threads == 0 {
            return Err(ConfigError::Validation(
                "worker.threads must be at least 1".into(),
            ));
        }
        if self.indexing.max_hierarchy_depth == 0 {
            return Err(ConfigError::Validation(
                "indexing.max_hierarchy_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn solr_settings(&self) -> SolrSettings {
        SolrSettings {
            base_url: self.index.base_url.clone(),
            connect_timeout: Duration::from_secs(self.index.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.index.request_timeout_secs),
        }
    }

    pub fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            max_hierarchy_depth: self.indexing.max_hierarchy_depth,
            index_root_container: self.indexing.index_root_container,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            threads: self.worker.threads,
            retry: RetryPolicy {
                retries: self.worker.retry_attempts,
                backoff: Duration::from_millis(self.worker.retry_backoff_ms),
            },
        }
    }

    /// Configured remediation log, else `<data dir>/repo-index/remediation.jsonl`.
    pub fn remediation_log_path(&self) -> PathBuf {
        if let Some(path) = &self.remediation_log {
            return path.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
            .join("remediation.jsonl")
    }
}
