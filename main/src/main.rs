//! Combined binary: HTTP+WS server and Backfill Worker loop in one process,
//! the server on its own OS thread (its own single-threaded runtime) so the
//! worker loop can simply run to completion on the main runtime, matching
//! the teacher's dual-runtime wiring without the `LocalSet` the teacher
//! needed for a `!Send` reranker — the Backfill Worker has no such
//! constraint.

use std::{sync::Arc, time::Duration};

use api_router::{api_routes_v1, api_state::ApiState};
use async_openai::{config::OpenAIConfig, Client};
use axum::{extract::FromRef, Router};
use chat_gateway::{chat_routes, ChatGatewayState};
use chunker_pipeline::{run_worker_loop, ArchiveReader, BackfillWorker, ChunkingConfig};
use common::{
    observability::Metrics,
    storage::{db::SurrealDbClient, store::StorageManager, types::system_settings::SystemSettings},
    utils::{
        config::get_config,
        embedding::{EmbeddingClient, Embedder},
        llm::LlmProxyClient,
    },
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
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
        db: db.clone(),
        config: config.clone(),
        storage: storage.clone(),
        embedding_client: embedding_client.clone() as Arc<dyn Embedder>,
        llm_proxy,
        metrics: metrics.clone(),
    };

    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .merge(chat_routes())
        .with_state(AppState {
            api_state,
            chat_state,
        });

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&serve_address).await?;
    info!("Starting server listening on {serve_address}");

    let server_handle = std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to start server runtime");
        rt.block_on(async {
            if let Err(err) = axum::serve(listener, app).await {
                error!(error = %err, "server error");
            }
        });
    });

    let archive_reader = ArchiveReader::new(storage);
    let worker = Arc::new(BackfillWorker::new(
        db,
        archive_reader,
        embedding_client,
        ChunkingConfig::default(),
        Duration::from_secs(config.backfill_video_deadline_secs),
    ));

    info!("Starting backfill worker loop");
    if let Err(err) = run_worker_loop(worker, config.backfill_batch_size).await {
        error!(error = %err, "worker process error");
    }

    if let Err(err) = server_handle.join() {
        error!(?err, "server thread panicked");
    }

    Ok(())
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
    chat_state: ChatGatewayState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::{
        storage::store::testing::TestStorageManager,
        utils::{config::testing::test_config_memory, embedding::testing::HashedEmbeddingClient, llm::testing::StaticLlmClient},
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn build_test_app() -> Router {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        let config = test_config_memory();
        let storage = TestStorageManager::new_memory()
            .await
            .expect("failed to build storage manager")
            .clone_storage();
        let embedding_client: Arc<dyn Embedder> = Arc::new(HashedEmbeddingClient::new(8));

        let api_state = ApiState {
            db: db.clone(),
            config: config.clone(),
            storage: storage.clone(),
            embedding_client: Arc::new(EmbeddingClient::new(
                Client::with_config(OpenAIConfig::new().with_api_base("http://localhost")),
                "test-embedding".into(),
                8,
                8000,
            )),
            metrics: Arc::new(Metrics::new()),
        };
        let chat_state = ChatGatewayState {
            db,
            config,
            storage,
            embedding_client,
            llm_proxy: Arc::new(StaticLlmClient::responding_with(vec!["ok".into()])),
            metrics: Arc::new(Metrics::new()),
        };

        Router::new()
            .nest("/api/v1", api_routes_v1(&api_state))
            .merge(chat_routes())
            .with_state(AppState {
                api_state,
                chat_state,
            })
    }

    #[tokio::test]
    async fn health_route_is_reachable_through_the_combined_router() {
        let app = build_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
