use std::{convert::Infallible, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};

use crate::api_state::ApiState;

/// `GET /stats`: a snapshot of every counter/histogram/gauge named in spec
/// §4.M, always `200`.
pub async fn stats(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(state.metrics.snapshot())
}

/// `GET /stats/stream`: the same snapshot as a Server-Sent Events stream,
/// one event every 3 seconds.
pub async fn stats_stream(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream::unfold(state, |state| async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let event = Event::default().json_data(state.metrics.snapshot()).ok();
        event.map(|event| (Ok(event), state))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::db::SurrealDbClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn stats_snapshot_includes_backfill_section() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
                .await
                .unwrap(),
        );
        let storage = common::storage::store::testing::TestStorageManager::new_memory()
            .await
            .unwrap()
            .clone_storage();
        let client = async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new().with_api_base("http://localhost"),
        );
        let embedding_client = Arc::new(common::utils::embedding::EmbeddingClient::new(
            client,
            "test-embedding".into(),
            8,
            8000,
        ));
        let metrics = Arc::new(common::observability::Metrics::new());
        metrics.record_video_chunked();
        let state = ApiState {
            db,
            config: common::utils::config::testing::test_config_memory(),
            storage,
            embedding_client,
            metrics,
        };

        let response = stats(State(state)).await;
        assert_eq!(response.0["backfill"]["videos_chunked"], 1);
    }
}
