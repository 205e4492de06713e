use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use surrealdb::opt::PatchOp;

use crate::{
    error::AppError, storage::db::SurrealDbClient, stored_object, utils::embedding::EmbeddingClient,
};

stored_object!(Video, "video", {
    video_id: String,
    url: String,
    title: String,
    channel_id: Option<String>,
    channel_name: Option<String>,
    duration_seconds: Option<f64>,
    view_count: Option<u64>,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    fetched_at: chrono::DateTime<chrono::Utc>,
    archive_path: Option<String>,
    embedding: Option<Vec<f32>>,
    pipeline_state: BTreeMap<String, String>,
    last_processed_at: Option<chrono::DateTime<chrono::Utc>>,
});

/// A scored search result row, per spec §4.C's `Hit`.
///
/// `text` is always `None` from a video-level search: this row has no
/// associated transcript excerpt without a separate chunk lookup, which
/// matches the RAG Retriever's "Transcript: {text or \"\"}" fallback (spec
/// §4.G).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hit {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub channel_name: Option<String>,
    pub score: f32,
    pub archive_path: Option<String>,
    pub text: Option<String>,
}

/// A stale reference returned by `find_stale_videos`: just enough to drive
/// the Backfill Worker without forcing a full `Video` load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaleRef {
    pub video_id: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of `upsert_video`: whether the row was freshly created or
/// an existing row was updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl Video {
    pub fn new(video_id: String, url: String, title: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: video_id.clone(),
            created_at: now,
            updated_at: now,
            video_id,
            url,
            title,
            channel_id: None,
            channel_name: None,
            duration_seconds: None,
            view_count: None,
            published_at: None,
            fetched_at: now,
            archive_path: None,
            embedding: None,
            pipeline_state: BTreeMap::new(),
            last_processed_at: None,
        }
    }

    /// Replaces all scalar fields for `video.video_id`, leaving chunk rows
    /// (a separate table) untouched. Creates the row if absent.
    pub async fn upsert_video(
        video: Self,
        db: &SurrealDbClient,
    ) -> Result<UpsertOutcome, AppError> {
        let existed = db.get_item::<Self>(&video.video_id).await?.is_some();
        let mut video = video;
        video.id = video.video_id.clone();
        video.updated_at = chrono::Utc::now();

        db.client
            .upsert((Self::table_name(), video.video_id.clone()))
            .content(video)
            .await
            .map_err(AppError::Database)?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    pub async fn get_video(
        video_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        db.get_item(video_id).await.map_err(AppError::Database)
    }

    /// Reads the current `pipeline_state` map, merges in `(step, version)`,
    /// and writes it back. Retries on a concurrent-write conflict so two
    /// updates to different steps on the same video never clobber each
    /// other (spec §5 shared-resource policy, scenario S6).
    pub async fn update_pipeline_state(
        video_id: &str,
        step: &str,
        version: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::Retry;

        let retry_strategy = ExponentialBackoff::from_millis(10)
            .map(jitter)
            .take(5);

        Retry::spawn(retry_strategy, || async {
            let current: Option<Self> = db.get_item(video_id).await?;
            let Some(mut current) = current else {
                return Err(surrealdb::Error::Api(surrealdb::error::Api::Query(
                    "video not found for pipeline state update".into(),
                )));
            };

            current
                .pipeline_state
                .insert(step.to_string(), version.to_string());
            let now = chrono::Utc::now();

            let _updated: Option<Self> = db
                .client
                .update((Self::table_name(), video_id))
                .patch(PatchOp::replace("/pipeline_state", current.pipeline_state))
                .patch(PatchOp::replace(
                    "/last_processed_at",
                    surrealdb::sql::Datetime::from(now),
                ))
                .patch(PatchOp::replace(
                    "/updated_at",
                    surrealdb::sql::Datetime::from(now),
                ))
                .await?;

            Ok(())
        })
        .await
        .map_err(AppError::Database)
    }

    /// Top-`limit` videos by cosine similarity against `embedding`, with
    /// optional channel and publish-date filters, paginated by `offset`.
    /// Ties are broken `updated_at` desc then `video_id` asc (spec §9 Open
    /// Question: the tie-break is not guaranteed upstream, so it is made
    /// explicit here). All argument checks raise `InvalidArgument`.
    #[allow(clippy::too_many_arguments)]
    pub async fn search_video_by_embedding(
        embedding: &[f32],
        dimension: usize,
        limit: usize,
        offset: usize,
        channel_filter: Option<&str>,
        min_date: Option<chrono::DateTime<chrono::Utc>>,
        max_date: Option<chrono::DateTime<chrono::Utc>>,
        db: &SurrealDbClient,
    ) -> Result<Vec<Hit>, AppError> {
        if embedding.len() != dimension {
            return Err(AppError::InvalidArgument(format!(
                "embedding length {} does not match configured dimension {dimension}",
                embedding.len()
            )));
        }
        if let (Some(min), Some(max)) = (min_date, max_date) {
            if min > max {
                return Err(AppError::InvalidArgument(
                    "min_date must be <= max_date".into(),
                ));
            }
        }

        // Over-fetch past `limit+offset` so filters applied after the
        // vector kNN step still leave enough rows to paginate through;
        // SurrealDB's `<|k,ef|>` operator only bounds the initial kNN set.
        let take = (limit + offset).saturating_mul(4).max(limit + offset).max(1);

        let rows: Vec<serde_json::Value> = db
            .client
            .query(
                "SELECT *, vector::similarity::cosine(embedding, $embedding) AS score
                 FROM type::table($table)
                 WHERE embedding <|$take,100|> $embedding
                    AND (embedding IS NOT NONE)
                    AND ($channel_filter IS NONE OR channel_id = $channel_filter)
                    AND ($min_date IS NONE OR published_at >= $min_date)
                    AND ($max_date IS NONE OR published_at <= $max_date)
                 ORDER BY score DESC, updated_at DESC, video_id ASC
                 LIMIT $limit START $offset",
            )
            .bind(("table", Self::table_name()))
            .bind(("embedding", embedding.to_vec()))
            .bind(("take", take))
            .bind(("channel_filter", channel_filter.map(str::to_string)))
            .bind(("min_date", min_date.map(surrealdb::sql::Datetime::from)))
            .bind(("max_date", max_date.map(surrealdb::sql::Datetime::from)))
            .bind(("limit", limit))
            .bind(("offset", offset))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let score = row.get("score")?.as_f64()? as f32;
                let video: Self = serde_json::from_value(row).ok()?;
                Some(Hit {
                    video_id: video.video_id,
                    title: video.title,
                    url: video.url,
                    channel_name: video.channel_name,
                    score,
                    archive_path: video.archive_path,
                    text: None,
                })
            })
            .collect())
    }

    /// Embeds free-text `query` via the Embedding Client, then delegates to
    /// [`Self::search_video_by_embedding`]. Rejects an empty query before
    /// spending an embedding call on it.
    #[allow(clippy::too_many_arguments)]
    pub async fn search_videos_by_text(
        query: &str,
        embedding_client: &EmbeddingClient,
        limit: usize,
        offset: usize,
        channel_filter: Option<&str>,
        min_date: Option<chrono::DateTime<chrono::Utc>>,
        max_date: Option<chrono::DateTime<chrono::Utc>>,
        db: &SurrealDbClient,
    ) -> Result<Vec<Hit>, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidArgument("query text must not be empty".into()));
        }
        let embedding = embedding_client.embed(query).await?;
        Self::search_video_by_embedding(
            &embedding,
            embedding_client.dimension(),
            limit,
            offset,
            channel_filter,
            min_date,
            max_date,
            db,
        )
        .await
    }

    /// Videos where `pipeline_state[step]` is absent or not equal to
    /// `current_version`, oldest-updated first.
    pub async fn find_stale_videos(
        step: &str,
        current_version: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<StaleRef>, AppError> {
        let refs: Vec<StaleRef> = db
            .client
            .query(
                "SELECT video_id, updated_at FROM type::table($table)
                 WHERE (pipeline_state[$step] IS NONE OR pipeline_state[$step] != $version)
                 ORDER BY updated_at ASC
                 LIMIT $limit",
            )
            .bind(("table", Self::table_name()))
            .bind(("step", step.to_string()))
            .bind(("version", current_version.to_string()))
            .bind(("limit", limit))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;

        Ok(refs)
    }

    /// Chunk-step candidates per spec §4.F: archive present, chunk step not
    /// yet at `current_version`, oldest-updated first.
    pub async fn find_chunk_candidates(
        current_version: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<StaleRef>, AppError> {
        let refs: Vec<StaleRef> = db
            .client
            .query(
                "SELECT video_id, updated_at FROM type::table($table)
                 WHERE archive_path IS NOT NONE
                    AND (pipeline_state.chunk_transcript IS NONE OR pipeline_state.chunk_transcript != $version)
                 ORDER BY updated_at ASC
                 LIMIT $limit",
            )
            .bind(("table", Self::table_name()))
            .bind(("version", current_version.to_string()))
            .bind(("limit", limit))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(refs)
    }

    /// Embed-step candidates per spec §4.F: chunk step already done, embed
    /// step not yet at `embed_version`, oldest-updated first.
    pub async fn find_embed_candidates(
        embed_version: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<StaleRef>, AppError> {
        let refs: Vec<StaleRef> = db
            .client
            .query(
                "SELECT video_id, updated_at FROM type::table($table)
                 WHERE pipeline_state.chunk_transcript IS NOT NONE
                    AND (pipeline_state.embed_chunks IS NONE OR pipeline_state.embed_chunks != $version)
                 ORDER BY updated_at ASC
                 LIMIT $limit",
            )
            .bind(("table", Self::table_name()))
            .bind(("version", embed_version.to_string()))
            .bind(("limit", limit))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("failed to start in-memory surrealdb")
    }

    fn unit_vector(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; dim];
        if let Some(slot) = v.get_mut(hot) {
            *slot = 1.0;
        }
        v
    }

    async fn seed_videos(db: &SurrealDbClient, count: usize, dim: usize) {
        for i in 0..count {
            let mut video = Video::new(format!("v{i}"), format!("https://x/{i}"), format!("Title {i}"));
            video.embedding = Some(unit_vector(dim, i % dim));
            Video::upsert_video(video, db).await.unwrap();
        }
    }

    #[tokio::test]
    async fn search_video_by_embedding_rejects_wrong_dimension() {
        let db = memory_db().await;
        let err = Video::search_video_by_embedding(&[1.0, 0.0], 4, 5, 0, None, None, None, &db)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn search_video_by_embedding_rejects_inverted_date_range() {
        let db = memory_db().await;
        let later = chrono::Utc::now();
        let earlier = later - chrono::Duration::days(1);
        let err = Video::search_video_by_embedding(
            &unit_vector(4, 0),
            4,
            5,
            0,
            None,
            Some(later),
            Some(earlier),
            &db,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn search_video_by_embedding_returns_topk_sorted_by_score() {
        let db = memory_db().await;
        seed_videos(&db, 10, 4).await;

        let hits = Video::search_video_by_embedding(&unit_vector(4, 0), 4, 5, 0, None, None, None, &db)
            .await
            .unwrap();
        assert_eq!(hits.len(), 5);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn search_video_by_embedding_pagination_is_disjoint() {
        let db = memory_db().await;
        seed_videos(&db, 10, 4).await;

        let page1 = Video::search_video_by_embedding(&unit_vector(4, 0), 4, 4, 0, None, None, None, &db)
            .await
            .unwrap();
        let page2 = Video::search_video_by_embedding(&unit_vector(4, 0), 4, 4, 4, None, None, None, &db)
            .await
            .unwrap();

        let ids1: std::collections::HashSet<_> = page1.iter().map(|h| h.video_id.clone()).collect();
        let ids2: std::collections::HashSet<_> = page2.iter().map(|h| h.video_id.clone()).collect();
        assert!(ids1.is_disjoint(&ids2));
    }

    #[tokio::test]
    async fn search_videos_by_text_rejects_empty_query() {
        let db = memory_db().await;
        let client = EmbeddingClient::new(
            async_openai::Client::new(),
            "test-model".into(),
            4,
            8000,
        );
        let err = Video::search_videos_by_text("   ", &client, 5, 0, None, None, None, &db)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn upsert_video_creates_then_updates() {
        let db = memory_db().await;
        let video = Video::new(
            "v1".into(),
            "https://example.com/v1".into(),
            "Title".into(),
        );

        let outcome = Video::upsert_video(video.clone(), &db).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let mut updated = video;
        updated.title = "New title".into();
        let outcome = Video::upsert_video(updated, &db).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let fetched = Video::get_video("v1", &db).await.unwrap().unwrap();
        assert_eq!(fetched.title, "New title");
    }

    #[tokio::test]
    async fn update_pipeline_state_merges_concurrent_steps() {
        let db = memory_db().await;
        let video = Video::new("v2".into(), "https://x".into(), "T".into());
        Video::upsert_video(video, &db).await.unwrap();

        let (a, b) = tokio::join!(
            Video::update_pipeline_state("v2", "chunk_transcript", "v1.0", &db),
            Video::update_pipeline_state("v2", "embed_chunks", "bge-m3.1024", &db),
        );
        a.unwrap();
        b.unwrap();

        let video = Video::get_video("v2", &db).await.unwrap().unwrap();
        assert_eq!(
            video.pipeline_state.get("chunk_transcript").map(String::as_str),
            Some("v1.0")
        );
        assert_eq!(
            video.pipeline_state.get("embed_chunks").map(String::as_str),
            Some("bge-m3.1024")
        );
    }

    #[tokio::test]
    async fn find_stale_videos_orders_oldest_first() {
        let db = memory_db().await;
        for id in ["a", "b", "c"] {
            let video = Video::new(id.into(), format!("https://x/{id}"), "T".into());
            Video::upsert_video(video, &db).await.unwrap();
        }
        Video::update_pipeline_state("a", "chunk_transcript", "v1.0", &db)
            .await
            .unwrap();

        let stale = Video::find_stale_videos("chunk_transcript", "v1.0", 10, &db)
            .await
            .unwrap();
        let ids: Vec<&str> = stale.iter().map(|s| s.video_id.as_str()).collect();
        assert!(ids.contains(&"b"));
        assert!(ids.contains(&"c"));
        assert!(!ids.contains(&"a"));
    }

    #[tokio::test]
    async fn find_chunk_candidates_requires_archive_and_unset_step() {
        let db = memory_db().await;
        let mut with_archive = Video::new("a".into(), "https://x/a".into(), "T".into());
        with_archive.archive_path = Some("archives/a.json".into());
        Video::upsert_video(with_archive, &db).await.unwrap();

        let without_archive = Video::new("b".into(), "https://x/b".into(), "T".into());
        Video::upsert_video(without_archive, &db).await.unwrap();

        let mut already_chunked = Video::new("c".into(), "https://x/c".into(), "T".into());
        already_chunked.archive_path = Some("archives/c.json".into());
        Video::upsert_video(already_chunked, &db).await.unwrap();
        Video::update_pipeline_state("c", "chunk_transcript", "v1.0", &db)
            .await
            .unwrap();

        let candidates = Video::find_chunk_candidates("v1.0", 10, &db).await.unwrap();
        let ids: Vec<&str> = candidates.iter().map(|c| c.video_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn find_embed_candidates_requires_chunked_and_unset_embed() {
        let db = memory_db().await;
        let not_chunked = Video::new("a".into(), "https://x/a".into(), "T".into());
        Video::upsert_video(not_chunked, &db).await.unwrap();

        let chunked_only = Video::new("b".into(), "https://x/b".into(), "T".into());
        Video::upsert_video(chunked_only, &db).await.unwrap();
        Video::update_pipeline_state("b", "chunk_transcript", "v1.0", &db)
            .await
            .unwrap();

        let fully_done = Video::new("c".into(), "https://x/c".into(), "T".into());
        Video::upsert_video(fully_done, &db).await.unwrap();
        Video::update_pipeline_state("c", "chunk_transcript", "v1.0", &db)
            .await
            .unwrap();
        Video::update_pipeline_state("c", "embed_chunks", "bge-m3.1024", &db)
            .await
            .unwrap();

        let candidates = Video::find_embed_candidates("bge-m3.1024", 10, &db)
            .await
            .unwrap();
        let ids: Vec<&str> = candidates.iter().map(|c| c.video_id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }
}
