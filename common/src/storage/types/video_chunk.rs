use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(VideoChunk, "video_chunk", {
    video_id: String,
    chunk_index: u32,
    text: String,
    start_time: f64,
    end_time: f64,
    token_count: u32,
    embedding: Option<Vec<f32>>,
});

/// A chunk returned from vector or full-text search, carrying its score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkHit {
    pub chunk: VideoChunk,
    pub score: f32,
}

impl VideoChunk {
    pub fn chunk_id(video_id: &str, chunk_index: u32) -> String {
        format!("{video_id}:{chunk_index}")
    }

    pub fn new(
        video_id: String,
        chunk_index: u32,
        text: String,
        start_time: f64,
        end_time: f64,
        token_count: u32,
    ) -> Self {
        let now = chrono::Utc::now();
        let id = Self::chunk_id(&video_id, chunk_index);
        Self {
            id,
            created_at: now,
            updated_at: now,
            video_id,
            chunk_index,
            text,
            start_time,
            end_time,
            token_count,
            embedding: None,
        }
    }

    /// Rejects any set whose `chunk_index` values are not exactly `0..N-1`.
    pub fn validate_contiguous(chunks: &[Self]) -> Result<(), AppError> {
        let mut indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        indices.sort_unstable();
        for (expected, actual) in indices.iter().enumerate() {
            if *actual != expected as u32 {
                return Err(AppError::InvalidChunkSet(format!(
                    "chunk_index values must be contiguous from 0, found {indices:?}"
                )));
            }
        }
        Ok(())
    }

    pub async fn delete_chunks_for_video(
        video_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE FROM type::table($table) WHERE video_id = $video_id")
            .bind(("table", Self::table_name()))
            .bind(("video_id", video_id.to_string()))
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn upsert_chunk(chunk: Self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .upsert((Self::table_name(), chunk.id.clone()))
            .content(chunk)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Writes a full chunk set idempotently: delete-then-insert inside a
    /// single transaction, so readers observe either the old set or the new
    /// one, never a mixture (spec §5 ordering guarantee).
    pub async fn upsert_chunks(chunks: Vec<Self>, db: &SurrealDbClient) -> Result<(), AppError> {
        if chunks.is_empty() {
            return Ok(());
        }
        Self::validate_contiguous(&chunks)?;

        let video_id = chunks[0].video_id.clone();
        db.client
            .query(
                "BEGIN TRANSACTION;
                 DELETE FROM type::table($table) WHERE video_id = $video_id;
                 FOR $chunk IN $chunks {
                    UPSERT type::thing($table, $chunk.id) CONTENT $chunk;
                 };
                 COMMIT TRANSACTION;",
            )
            .bind(("table", Self::table_name()))
            .bind(("video_id", video_id))
            .bind(("chunks", chunks))
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn get_chunks_for_video(
        video_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE video_id = $video_id ORDER BY chunk_index ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("video_id", video_id.to_string()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(chunks)
    }

    /// Top-`take` chunks by cosine similarity against `query_embedding`.
    /// Ties broken by `updated_at` desc then the chunk's `video_id` asc,
    /// matching the ordering the spec defines for video-level search (spec
    /// §9 Open Question: the source does not guarantee this tie-break, this
    /// implementation resolves it explicitly).
    pub async fn vector_search(
        take: usize,
        query_embedding: Vec<f32>,
        db: &SurrealDbClient,
    ) -> Result<Vec<ChunkHit>, AppError> {
        let rows: Vec<ChunkHit> = db
            .client
            .query(
                "SELECT *, vector::similarity::cosine(embedding, $embedding) AS score
                 FROM type::table($table)
                 WHERE embedding <|$take,100|> $embedding
                 ORDER BY score DESC, updated_at DESC, video_id ASC
                 LIMIT $take",
            )
            .bind(("table", Self::table_name()))
            .bind(("embedding", query_embedding))
            .bind(("take", take))
            .await
            .map_err(AppError::Database)?
            .take::<Vec<serde_json::Value>>(0)
            .map_err(AppError::Database)
            .map(|rows| {
                rows.into_iter()
                    .filter_map(|row| {
                        let score = row.get("score")?.as_f64()? as f32;
                        let chunk: VideoChunk = serde_json::from_value(row).ok()?;
                        Some(ChunkHit { chunk, score })
                    })
                    .collect()
            })?;

        Ok(rows)
    }

    pub async fn fts_search(
        take: usize,
        terms: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<ChunkHit>, AppError> {
        let rows: Vec<serde_json::Value> = db
            .client
            .query(
                "SELECT *, (IF search::score(0) != NONE THEN search::score(0) ELSE 0 END) AS score
                 FROM type::table($table)
                 WHERE text @0@ $terms
                 ORDER BY score DESC
                 LIMIT $limit",
            )
            .bind(("table", Self::table_name()))
            .bind(("terms", terms.to_string()))
            .bind(("limit", take))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;

        let hits = rows
            .into_iter()
            .filter_map(|row| {
                let score = row.get("score")?.as_f64()? as f32;
                let chunk: VideoChunk = serde_json::from_value(row).ok()?;
                Some(ChunkHit { chunk, score })
            })
            .collect();
        Ok(hits)
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

    #[tokio::test]
    async fn upsert_chunks_is_idempotent_replace() {
        let db = memory_db().await;
        let chunks = vec![
            VideoChunk::new("v1".into(), 0, "a".into(), 0.0, 1.0, 10),
            VideoChunk::new("v1".into(), 1, "b".into(), 1.0, 2.0, 10),
        ];
        VideoChunk::upsert_chunks(chunks, &db).await.unwrap();

        let second = vec![VideoChunk::new("v1".into(), 0, "only".into(), 0.0, 1.0, 5)];
        VideoChunk::upsert_chunks(second, &db).await.unwrap();

        let fetched = VideoChunk::get_chunks_for_video("v1", &db).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].text, "only");
    }

    #[tokio::test]
    async fn upsert_chunks_rejects_non_contiguous() {
        let chunks = vec![
            VideoChunk::new("v1".into(), 0, "a".into(), 0.0, 1.0, 10),
            VideoChunk::new("v1".into(), 2, "b".into(), 1.0, 2.0, 10),
        ];
        let err = VideoChunk::validate_contiguous(&chunks).unwrap_err();
        assert!(matches!(err, AppError::InvalidChunkSet(_)));
    }

    #[tokio::test]
    async fn delete_by_video_id_removes_only_matching_rows() {
        let db = memory_db().await;
        VideoChunk::upsert_chunks(
            vec![VideoChunk::new("v1".into(), 0, "a".into(), 0.0, 1.0, 10)],
            &db,
        )
        .await
        .unwrap();
        VideoChunk::upsert_chunks(
            vec![VideoChunk::new("v2".into(), 0, "b".into(), 0.0, 1.0, 10)],
            &db,
        )
        .await
        .unwrap();

        VideoChunk::delete_chunks_for_video("v1", &db).await.unwrap();

        assert!(VideoChunk::get_chunks_for_video("v1", &db)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            VideoChunk::get_chunks_for_video("v2", &db).await.unwrap().len(),
            1
        );
    }
}
