//! HTTP+WS server binary: the retrieval engine's external interfaces
//! (spec §6) with no Backfill Worker loop running in-process.

use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use async_openai::{config::OpenAIConfig, Client};
use axum::{extract::FromRef, Router};
use chat_gateway::{chat_routes, ChatGatewayState};
use common::{
    observability::Metrics,
    storage::{db::SurrealDbClient, store::StorageManager, types::system_settings::SystemSettings},
    utils::{
        config::get_config,
        embedding::{Embedder, EmbeddingClient},
        llm::LlmProxyClient,
    },
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let mut config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    db.ensure_initialized(&config.embedding_model, config.embedding_dimension)
        .await?;
    let settings = SystemSettings::get_current(&db).await?;
    config.merge_persisted(&settings.embedding_model, settings.embedding_dimensions as usize);

    let storage = StorageManager::new(&config).await?;

    let remote_client = Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.remote_llm_base_url),
    );
    let local_client =
        Client::with_config(OpenAIConfig::new().with_api_base(&config.ollama_base_url));

    let embedding_client = Arc::new(EmbeddingClient::new(
        remote_client.clone(),
        config.embedding_model.clone(),
        config.embedding_dimension,
        config.embedding_char_cap,
    ));
    let llm_proxy = Arc::new(LlmProxyClient::new(remote_client, local_client));
    let metrics = Arc::new(Metrics::new());

    let api_state = ApiState {
        db: db.clone(),
        config: config.clone(),
        storage: storage.clone(),
        embedding_client: embedding_client.clone(),
        metrics: metrics.clone(),
    };
    let chat_state = ChatGatewayState {
        db,
        config: config.clone(),
        storage,
        embedding_client: embedding_client as Arc<dyn Embedder>,
        llm_proxy,
        metrics,
    };

    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .merge(chat_routes())
        .with_state(AppState {
            api_state,
            chat_state,
        });

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!("Starting server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
    chat_state: ChatGatewayState,
}
