//! Backfill Worker binary: runs the chunk/embed catch-up loop (spec §4.F)
//! with no HTTP or WebSocket surface in-process.

use std::{sync::Arc, time::Duration};

use async_openai::{config::OpenAIConfig, Client};
use chunker_pipeline::{run_worker_loop, ArchiveReader, BackfillWorker, ChunkingConfig};
use common::{
    storage::{db::SurrealDbClient, store::StorageManager, types::system_settings::SystemSettings},
    utils::{config::get_config, embedding::EmbeddingClient},
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
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
    let embedding_client = Arc::new(EmbeddingClient::new(
        remote_client,
        config.embedding_model.clone(),
        config.embedding_dimension,
        config.embedding_char_cap,
    ));

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

    Ok(())
}
