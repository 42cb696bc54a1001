use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub oauth: OauthConfig,
    #[serde(default)]
    pub records: Option<RecordsConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

fn default_endpoint() -> String {
    "https://quantsearch.ai/api".to_string()
}

/// Pipeline policy knobs. Passed into the indexer and builder explicitly
/// so the pipeline stays testable without ambient global state.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Master switch; when off, `should_index` is false for every record.
    #[serde(default)]
    pub enabled: bool,
    /// Index saved records immediately instead of enqueueing them.
    #[serde(default)]
    pub realtime: bool,
    /// Allow-listed content subtypes. Empty means nothing is indexed.
    #[serde(default)]
    pub content_types: Vec<String>,
    /// Skip records that are not in a published state.
    #[serde(default = "default_true")]
    pub exclude_unpublished: bool,
    /// Maximum documents per submission call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Named view the renderer uses to produce document content.
    #[serde(default = "default_view_mode")]
    pub view_mode: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            realtime: false,
            content_types: Vec::new(),
            exclude_unpublished: true,
            batch_size: default_batch_size(),
            view_mode: default_view_mode(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_batch_size() -> usize {
    50
}
fn default_view_mode() -> String {
    "full".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OauthConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Bind address for the short-lived callback listener used by
    /// `relay connect`.
    #[serde(default = "default_callback_bind")]
    pub callback_bind: String,
}

impl Default for OauthConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            callback_bind: default_callback_bind(),
        }
    }
}

fn default_client_id() -> String {
    "relay-index".to_string()
}
fn default_callback_bind() -> String {
    "127.0.0.1:7399".to_string()
}

/// Filesystem-backed record store settings (the built-in store used by the
/// CLI; library embedders may supply their own store instead).
#[derive(Debug, Deserialize, Clone)]
pub struct RecordsConfig {
    pub root: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }

    if config.api.endpoint.trim().is_empty() {
        anyhow::bail!("api.endpoint must not be empty");
    }

    if config.indexing.view_mode.trim().is_empty() {
        anyhow::bail!("indexing.view_mode must not be empty");
    }

    Ok(config)
}
