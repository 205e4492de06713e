use axum::{extract::State, Json};
use common::storage::types::{archive_record::ArchiveRecord, topic::Topic, video::Video};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError, youtube::extract_video_id};

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
    #[serde(default)]
    pub fetch_metadata: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub video_id: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub cached: bool,
}

/// `POST /youtube/analyze`: looks the video up in the Store Repository by
/// the id embedded in `url`. Fetching metadata for a video not already
/// indexed is a third-party API wrapper and out of scope for this engine,
/// so an uncached video is reported with empty tags/summary rather than
/// triggering an external call.
pub async fn analyze(
    State(state): State<ApiState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let video_id = extract_video_id(&request.url).ok_or_else(|| {
        ApiError::from(common::error::AppError::InvalidArgument(
            "url did not contain a recognizable YouTube video id".into(),
        ))
    })?;

    let Some(video) = Video::get_video(&video_id, &state.db).await? else {
        return Ok(Json(AnalyzeResponse {
            video_id,
            tags: Vec::new(),
            summary: None,
            metadata: None,
            cached: false,
        }));
    };

    let tags = Topic::topics_for_video(&video_id, &state.db).await?;
    let summary = summary_from_archive(&state, video.archive_path.as_deref()).await?;
    let metadata = request.fetch_metadata.then(|| {
        serde_json::json!({
            "title": video.title,
            "url": video.url,
            "channel_name": video.channel_name,
            "duration_seconds": video.duration_seconds,
            "view_count": video.view_count,
            "published_at": video.published_at,
        })
    });

    Ok(Json(AnalyzeResponse {
        video_id,
        tags,
        summary,
        metadata,
        cached: true,
    }))
}

async fn summary_from_archive(
    state: &ApiState,
    archive_path: Option<&str>,
) -> Result<Option<String>, ApiError> {
    let Some(archive_path) = archive_path else {
        return Ok(None);
    };
    let record: Option<ArchiveRecord> = state
        .storage
        .get_json(archive_path)
        .await
        .map_err(ApiError::from)?;
    let Some(record) = record else {
        return Ok(None);
    };

    Ok(record
        .llm_outputs
        .into_iter()
        .find(|output| output.output_type == "summary")
        .and_then(|output| output.output_value.as_str().map(str::to_string)))
}
