use std::sync::Arc;

use common::{
    observability::Metrics,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{config::AppConfig, embedding::EmbeddingClient},
};

/// Shared application context for every HTTP handler in this crate: the
/// repositories and clients a handler constructor needs, initialized once
/// at startup and passed by reference (spec §9: no `get_*_service()`
/// singletons).
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub embedding_client: Arc<EmbeddingClient>,
    pub metrics: Arc<Metrics>,
}
