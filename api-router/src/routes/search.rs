use axum::{extract::State, Json};
use common::storage::types::video::{Hit, Video};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filters: Option<SearchFilters>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchFilters {
    pub channel_id: Option<String>,
    pub min_date: Option<chrono::DateTime<chrono::Utc>>,
    pub max_date: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Hit>,
    pub total_found: usize,
}

/// `POST /cache/search`: embeds `query` and runs it through the Store
/// Repository's vector search. `limit` is clamped to `1..=100` per the
/// contract, out-of-range values rejected as `InvalidArgument`.
pub async fn search(
    State(state): State<ApiState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    if request.limit == 0 || request.limit > 100 {
        return Err(ApiError::from(common::error::AppError::InvalidArgument(
            "limit must be between 1 and 100".into(),
        )));
    }

    let filters = request.filters.unwrap_or_default();
    let results = Video::search_videos_by_text(
        &request.query,
        &state.embedding_client,
        request.limit,
        0,
        filters.channel_id.as_deref(),
        filters.min_date,
        filters.max_date,
        &state.db,
    )
    .await?;

    Ok(Json(SearchResponse {
        query: request.query,
        total_found: results.len(),
        results,
    }))
}
