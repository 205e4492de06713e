use std::sync::Arc;

use common::{
    observability::Metrics,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{config::AppConfig, embedding::Embedder, llm::LlmProxy},
};

/// Shared state behind every chat session: the same repositories and
/// clients `api-router` uses, constructed once at startup and cloned (each
/// field is an `Arc` or already cheap to clone) into every WebSocket task.
#[derive(Clone)]
pub struct ChatGatewayState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub embedding_client: Arc<dyn Embedder>,
    pub llm_proxy: Arc<dyn LlmProxy>,
    pub metrics: Arc<Metrics>,
}
