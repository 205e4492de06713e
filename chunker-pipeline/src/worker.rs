//! The Backfill Worker (spec §4.F): drives videos through the
//! `chunk -> embed` pipeline in bounded, sequential batches.
//!
//! Grounded on `original_source/compose/worker/embedding_backfill.py` /
//! `compose/cli/backfill_embeddings.py` for the `status/run/report`
//! three-operation surface, and on the teacher's claim-loop shape
//! (`ingestion-pipeline/src/lib.rs::run_worker_loop`) for the idle/backoff
//! polling pattern used by [`run_worker_loop`].

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use common::{
    error::AppError,
    pipeline_steps::{current_version, CHUNK_TRANSCRIPT, EMBED_CHUNKS},
    storage::{
        db::SurrealDbClient,
        types::{video::Video, video_chunk::VideoChunk},
    },
    utils::embedding::Embedder,
};
use futures::Stream;
use tracing::{error, info, instrument, warn};

use crate::{
    archive_reader::ArchiveReader,
    chunker::{chunk_plain, chunk_timed, ChunkingConfig, TranscriptChunk},
};

/// Which pipeline step(s) a `run`/`report` call should drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Chunk,
    Embed,
    All,
}

/// Aggregate counters returned by [`BackfillWorker::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackfillStatus {
    pub total_videos: usize,
    pub videos_with_archive: usize,
    pub videos_chunked: usize,
    pub videos_embedded: usize,
    pub total_chunks: usize,
    pub chunks_with_embeddings: usize,
}

/// Why a single video's chunk/embed step was skipped rather than processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoTranscript,
    NothingToEmbed,
}

/// Outcome of processing one video through one step, as emitted by
/// [`BackfillWorker::report`] and summarized by [`RunOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    Chunked { video_id: String, chunk_count: usize },
    Embedded { video_id: String, embedded_count: usize },
    Skipped { video_id: String, step: &'static str, reason: SkipReason },
    Failed { video_id: String, step: &'static str, reason: String },
}

/// A single progress event from a [`BackfillWorker::report`] stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub outcome: VideoOutcome,
}

/// Aggregate result of one [`BackfillWorker::run`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub chunked: usize,
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunOutcome {
    fn record(&mut self, outcome: &VideoOutcome) {
        match outcome {
            VideoOutcome::Chunked { .. } => self.chunked += 1,
            VideoOutcome::Embedded { .. } => self.embedded += 1,
            VideoOutcome::Skipped { .. } => self.skipped += 1,
            VideoOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Drives the chunk-and-embed pipeline (spec §4.F). Owns the Archive Reader,
/// the chunking configuration, and the Embedding Client; all Store
/// Repository access goes through `common::storage::types::video`/
/// `video_chunk` directly, matching the rest of the workspace's
/// repository-free-function style.
pub struct BackfillWorker {
    db: Arc<SurrealDbClient>,
    archive_reader: ArchiveReader,
    embedding_client: Arc<dyn Embedder>,
    chunking_config: ChunkingConfig,
    per_video_deadline: Duration,
}

impl BackfillWorker {
    #[must_use]
    pub fn new(
        db: Arc<SurrealDbClient>,
        archive_reader: ArchiveReader,
        embedding_client: Arc<dyn Embedder>,
        chunking_config: ChunkingConfig,
        per_video_deadline: Duration,
    ) -> Self {
        Self {
            db,
            archive_reader,
            embedding_client,
            chunking_config,
            per_video_deadline,
        }
    }

    /// Counters per spec §4.F's `status()`.
    pub async fn status(&self) -> Result<BackfillStatus, AppError> {
        let chunk_version = current_version(CHUNK_TRANSCRIPT).unwrap_or_default();
        let embed_version = current_version(EMBED_CHUNKS).unwrap_or_default();

        #[derive(serde::Deserialize)]
        struct Count {
            count: usize,
        }

        let mut response = self
            .db
            .client
            .query("SELECT count() AS count FROM video GROUP ALL")
            .query("SELECT count() AS count FROM video WHERE archive_path IS NOT NONE GROUP ALL")
            .query("SELECT count() AS count FROM video WHERE pipeline_state.chunk_transcript = $chunk_version GROUP ALL")
            .bind(("chunk_version", chunk_version.to_string()))
            .query("SELECT count() AS count FROM video WHERE pipeline_state.embed_chunks = $embed_version GROUP ALL")
            .bind(("embed_version", embed_version.to_string()))
            .query("SELECT count() AS count FROM video_chunk GROUP ALL")
            .query("SELECT count() AS count FROM video_chunk WHERE embedding IS NOT NONE GROUP ALL")
            .await
            .map_err(AppError::Database)?;

        let total_videos: Vec<Count> = response.take(0).map_err(AppError::Database)?;
        let videos_with_archive: Vec<Count> = response.take(1).map_err(AppError::Database)?;
        let videos_chunked: Vec<Count> = response.take(2).map_err(AppError::Database)?;
        let videos_embedded: Vec<Count> = response.take(3).map_err(AppError::Database)?;
        let total_chunks: Vec<Count> = response.take(4).map_err(AppError::Database)?;
        let chunks_with_embeddings: Vec<Count> = response.take(5).map_err(AppError::Database)?;

        Ok(BackfillStatus {
            total_videos: total_videos.first().map_or(0, |c| c.count),
            videos_with_archive: videos_with_archive.first().map_or(0, |c| c.count),
            videos_chunked: videos_chunked.first().map_or(0, |c| c.count),
            videos_embedded: videos_embedded.first().map_or(0, |c| c.count),
            total_chunks: total_chunks.first().map_or(0, |c| c.count),
            chunks_with_embeddings: chunks_with_embeddings.first().map_or(0, |c| c.count),
        })
    }

    /// Processes up to `batch` videos per selected step, sequentially
    /// (spec §5: a worker processes a batch sequentially within a run for
    /// ordered progress reporting). `dry_run` loads and computes but skips
    /// every write.
    pub async fn run(&self, step: Step, batch: usize, dry_run: bool) -> Result<RunOutcome, AppError> {
        let mut outcome = RunOutcome::default();
        for event in self.process_batch(step, batch, dry_run).await {
            outcome.record(&event.outcome);
        }
        Ok(outcome)
    }

    /// Same processing as [`Self::run`], but yields a [`ProgressEvent`] per
    /// video as it completes instead of waiting for the whole batch.
    pub fn report(
        self: Arc<Self>,
        step: Step,
        batch: usize,
        dry_run: bool,
    ) -> Pin<Box<dyn Stream<Item = ProgressEvent> + Send>> {
        Box::pin(stream! {
            if matches!(step, Step::Chunk | Step::All) {
                let chunk_version = current_version(CHUNK_TRANSCRIPT).unwrap_or_default();
                let candidates = Video::find_chunk_candidates(chunk_version, batch, &self.db)
                    .await
                    .unwrap_or_default();
                for candidate in candidates {
                    let outcome = self.chunk_one(&candidate.video_id, dry_run).await;
                    yield ProgressEvent { outcome };
                }
            }
            if matches!(step, Step::Embed | Step::All) {
                let embed_version = current_version(EMBED_CHUNKS).unwrap_or_default();
                let candidates = Video::find_embed_candidates(embed_version, batch, &self.db)
                    .await
                    .unwrap_or_default();
                for candidate in candidates {
                    let outcome = self.embed_one(&candidate.video_id, dry_run).await;
                    yield ProgressEvent { outcome };
                }
            }
        })
    }

    async fn process_batch(&self, step: Step, batch: usize, dry_run: bool) -> Vec<ProgressEvent> {
        let mut events = Vec::new();

        if matches!(step, Step::Chunk | Step::All) {
            let chunk_version = current_version(CHUNK_TRANSCRIPT).unwrap_or_default();
            let candidates = Video::find_chunk_candidates(chunk_version, batch, &self.db)
                .await
                .unwrap_or_default();
            for candidate in candidates {
                let outcome = self.chunk_one(&candidate.video_id, dry_run).await;
                events.push(ProgressEvent { outcome });
            }
        }

        if matches!(step, Step::Embed | Step::All) {
            let embed_version = current_version(EMBED_CHUNKS).unwrap_or_default();
            let candidates = Video::find_embed_candidates(embed_version, batch, &self.db)
                .await
                .unwrap_or_default();
            for candidate in candidates {
                let outcome = self.embed_one(&candidate.video_id, dry_run).await;
                events.push(ProgressEvent { outcome });
            }
        }

        events
    }

    /// One video through the chunk step (spec §4.F "Chunk step"). Timeout
    /// and per-step failures leave `pipeline_state` untouched so a later run
    /// retries the video (spec §5 cancellation & timeouts).
    #[instrument(level = "debug", skip_all, fields(video_id = %video_id))]
    async fn chunk_one(&self, video_id: &str, dry_run: bool) -> VideoOutcome {
        let result = tokio::time::timeout(self.per_video_deadline, self.chunk_one_inner(video_id, dry_run)).await;
        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(video_id, error = %err, "chunk step failed");
                VideoOutcome::Failed {
                    video_id: video_id.to_string(),
                    step: CHUNK_TRANSCRIPT,
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                error!(video_id, "chunk step exceeded per-video deadline");
                VideoOutcome::Failed {
                    video_id: video_id.to_string(),
                    step: CHUNK_TRANSCRIPT,
                    reason: "timeout".to_string(),
                }
            }
        }
    }

    async fn chunk_one_inner(&self, video_id: &str, dry_run: bool) -> Result<VideoOutcome, AppError> {
        let video = Video::get_video(video_id, &self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("video not found: {video_id}")))?;
        let archive_path = video
            .archive_path
            .ok_or_else(|| AppError::InvalidArgument(format!("video {video_id} has no archive_path")))?;

        let archive = self.archive_reader.fetch(&archive_path).await?;

        let transcript_chunks: Vec<TranscriptChunk> = if let Some(timed) = &archive.timed_transcript {
            chunk_timed(timed, &self.chunking_config)
        } else if let Some(raw) = &archive.raw_transcript {
            chunk_plain(raw, &self.chunking_config)
        } else {
            info!(video_id, "no transcript available, skipping chunk step");
            return Ok(VideoOutcome::Skipped {
                video_id: video_id.to_string(),
                step: CHUNK_TRANSCRIPT,
                reason: SkipReason::NoTranscript,
            });
        };

        let count = transcript_chunks.len();
        if dry_run {
            return Ok(VideoOutcome::Chunked {
                video_id: video_id.to_string(),
                chunk_count: count,
            });
        }

        let chunks: Vec<VideoChunk> = transcript_chunks
            .into_iter()
            .map(|c| {
                VideoChunk::new(
                    video_id.to_string(),
                    c.chunk_index,
                    c.text,
                    c.start_time,
                    c.end_time,
                    c.token_count,
                )
            })
            .collect();

        VideoChunk::upsert_chunks(chunks, &self.db).await?;

        let version = current_version(CHUNK_TRANSCRIPT).unwrap_or("v1.0");
        Video::update_pipeline_state(video_id, CHUNK_TRANSCRIPT, version, &self.db).await?;

        info!(video_id, chunk_count = count, "chunked video");
        Ok(VideoOutcome::Chunked {
            video_id: video_id.to_string(),
            chunk_count: count,
        })
    }

    /// One video through the embed step (spec §4.F "Embed step"). Only
    /// chunks whose `embedding` is still null are sent to the Embedding
    /// Client, so replaying this step on an already-embedded video is a
    /// no-op write (spec §8 invariant 4).
    #[instrument(level = "debug", skip_all, fields(video_id = %video_id))]
    async fn embed_one(&self, video_id: &str, dry_run: bool) -> VideoOutcome {
        let result = tokio::time::timeout(self.per_video_deadline, self.embed_one_inner(video_id, dry_run)).await;
        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(video_id, error = %err, "embed step failed");
                VideoOutcome::Failed {
                    video_id: video_id.to_string(),
                    step: EMBED_CHUNKS,
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                error!(video_id, "embed step exceeded per-video deadline");
                VideoOutcome::Failed {
                    video_id: video_id.to_string(),
                    step: EMBED_CHUNKS,
                    reason: "timeout".to_string(),
                }
            }
        }
    }

    async fn embed_one_inner(&self, video_id: &str, dry_run: bool) -> Result<VideoOutcome, AppError> {
        let chunks = VideoChunk::get_chunks_for_video(video_id, &self.db).await?;
        let pending: Vec<VideoChunk> = chunks.into_iter().filter(|c| c.embedding.is_none()).collect();

        let version = current_version(EMBED_CHUNKS).unwrap_or("bge-m3.1024");

        if pending.is_empty() {
            if !dry_run {
                Video::update_pipeline_state(video_id, EMBED_CHUNKS, version, &self.db).await?;
            }
            return Ok(VideoOutcome::Skipped {
                video_id: video_id.to_string(),
                step: EMBED_CHUNKS,
                reason: SkipReason::NothingToEmbed,
            });
        }

        if dry_run {
            return Ok(VideoOutcome::Embedded {
                video_id: video_id.to_string(),
                embedded_count: pending.len(),
            });
        }

        let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedding_client.embed_batch(&texts).await?;

        for (mut chunk, embedding) in pending.into_iter().zip(vectors.into_iter()) {
            chunk.embedding = Some(embedding);
            VideoChunk::upsert_chunk(chunk, &self.db).await?;
        }

        Video::update_pipeline_state(video_id, EMBED_CHUNKS, version, &self.db).await?;

        let embedded_count = texts.len();
        info!(video_id, embedded_count, "embedded chunks");
        Ok(VideoOutcome::Embedded {
            video_id: video_id.to_string(),
            embedded_count,
        })
    }
}

/// Polls [`BackfillWorker::run`] in a loop with an idle backoff, for the
/// standalone `worker` binary. Mirrors the teacher's claim-and-sleep shape
/// (`ingestion-pipeline/src/lib.rs::run_worker_loop`), generalized from a
/// work-queue claim to the Backfill Worker's candidate-selection model.
pub async fn run_worker_loop(worker: Arc<BackfillWorker>, batch: usize) -> Result<(), AppError> {
    let idle_backoff = Duration::from_secs(5);
    loop {
        let outcome = worker.run(Step::All, batch, false).await?;
        let did_work = outcome.chunked + outcome.embedded + outcome.skipped + outcome.failed > 0;
        info!(?outcome, "backfill batch complete");
        if !did_work {
            tokio::time::sleep(idle_backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{
        storage::{
            store::StorageManager,
            types::archive_record::{ArchiveRecord, TimedSegment},
        },
        utils::{config::testing::test_config_memory, embedding::testing::HashedEmbeddingClient},
    };
    use uuid::Uuid;

    async fn memory_db() -> Arc<SurrealDbClient> {
        Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .unwrap(),
        )
    }

    async fn worker_with(db: Arc<SurrealDbClient>) -> (BackfillWorker, StorageManager) {
        let storage = StorageManager::new(&test_config_memory()).await.unwrap();
        let archive_reader = ArchiveReader::new(storage.clone());
        let embedding_client: Arc<dyn common::utils::embedding::Embedder> =
            Arc::new(HashedEmbeddingClient::new(4));
        let config = ChunkingConfig {
            target_tokens: 5,
            max_tokens: 8,
            min_tokens: 1,
            pause_threshold: 8.0,
            chars_per_token: 4.0,
        };
        let worker = BackfillWorker::new(
            db,
            archive_reader,
            embedding_client,
            config,
            Duration::from_secs(5),
        );
        (worker, storage)
    }

    async fn seed_video_with_archive(db: &SurrealDbClient, storage: &StorageManager, video_id: &str) {
        let archive_path = format!("archives/{video_id}.json");
        let record = ArchiveRecord {
            video_id: video_id.to_string(),
            url: format!("https://example.com/{video_id}"),
            fetched_at: Utc::now(),
            youtube_metadata: serde_json::json!({}),
            raw_transcript: None,
            timed_transcript: Some(vec![
                TimedSegment { text: "Hello world".into(), start: 0.0, duration: 2.0 },
                TimedSegment { text: "How are you".into(), start: 2.0, duration: 2.0 },
            ]),
            llm_outputs: vec![],
            import_metadata: Default::default(),
        };
        storage.put_json(&archive_path, &record).await.unwrap();

        let mut video = Video::new(video_id.to_string(), record.url.clone(), "Title".into());
        video.archive_path = Some(archive_path);
        Video::upsert_video(video, db).await.unwrap();
    }

    #[tokio::test]
    async fn status_counts_start_at_zero() {
        let db = memory_db().await;
        let (worker, _storage) = worker_with(db).await;
        let status = worker.status().await.unwrap();
        assert_eq!(status, BackfillStatus::default());
    }

    #[tokio::test]
    async fn chunk_then_embed_marks_pipeline_state() {
        let db = memory_db().await;
        let (worker, storage) = worker_with(db.clone()).await;
        seed_video_with_archive(&db, &storage, "v1").await;

        let run_result = worker.run(Step::Chunk, 10, false).await.unwrap();
        assert_eq!(run_result.chunked, 1);

        let chunks = VideoChunk::get_chunks_for_video("v1", &db).await.unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.embedding.is_none()));

        let embed_result = worker.run(Step::Embed, 10, false).await.unwrap();
        assert_eq!(embed_result.embedded, 1);

        let chunks = VideoChunk::get_chunks_for_video("v1", &db).await.unwrap();
        assert!(chunks.iter().all(|c| c.embedding.as_ref().is_some_and(|e| e.len() == 4)));

        let video = Video::get_video("v1", &db).await.unwrap().unwrap();
        assert_eq!(video.pipeline_state.get("chunk_transcript").map(String::as_str), Some("v1.0"));
        assert_eq!(video.pipeline_state.get("embed_chunks").map(String::as_str), Some("bge-m3.1024"));
    }

    #[tokio::test]
    async fn run_all_chunks_then_embeds_in_one_call() {
        let db = memory_db().await;
        let (worker, storage) = worker_with(db.clone()).await;
        for id in ["a", "b", "c"] {
            seed_video_with_archive(&db, &storage, id).await;
        }

        let outcome = worker.run(Step::All, 10, false).await.unwrap();
        assert_eq!(outcome.chunked, 3);
        assert_eq!(outcome.embedded, 3);

        for id in ["a", "b", "c"] {
            let video = Video::get_video(id, &db).await.unwrap().unwrap();
            assert_eq!(video.pipeline_state.len(), 2);
            let chunks = VideoChunk::get_chunks_for_video(id, &db).await.unwrap();
            assert!(chunks.iter().all(|c| c.embedding.as_ref().is_some_and(|e| e.len() == 4)));
        }
    }

    #[tokio::test]
    async fn reembed_is_idempotent_noop() {
        let db = memory_db().await;
        let (worker, storage) = worker_with(db.clone()).await;
        seed_video_with_archive(&db, &storage, "v1").await;

        worker.run(Step::All, 10, false).await.unwrap();
        let second = worker.run(Step::Embed, 10, false).await.unwrap();
        // Already-embedded video is no longer an embed candidate at all.
        assert_eq!(second.embedded, 0);
        assert_eq!(second.skipped, 0);
    }

    #[tokio::test]
    async fn chunk_step_skips_video_with_no_transcript() {
        let db = memory_db().await;
        let (worker, storage) = worker_with(db.clone()).await;
        let archive_path = "archives/empty.json";
        let record = ArchiveRecord {
            video_id: "empty".into(),
            url: "https://example.com/empty".into(),
            fetched_at: Utc::now(),
            youtube_metadata: serde_json::json!({}),
            raw_transcript: None,
            timed_transcript: None,
            llm_outputs: vec![],
            import_metadata: Default::default(),
        };
        storage.put_json(archive_path, &record).await.unwrap();
        let mut video = Video::new("empty".into(), record.url.clone(), "Title".into());
        video.archive_path = Some(archive_path.to_string());
        Video::upsert_video(video, &db).await.unwrap();

        let outcome = worker.run(Step::Chunk, 10, false).await.unwrap();
        assert_eq!(outcome.skipped, 1);

        let video = Video::get_video("empty", &db).await.unwrap().unwrap();
        assert!(!video.pipeline_state.contains_key("chunk_transcript"));
    }

    #[tokio::test]
    async fn dry_run_makes_no_writes() {
        let db = memory_db().await;
        let (worker, storage) = worker_with(db.clone()).await;
        seed_video_with_archive(&db, &storage, "v1").await;

        let outcome = worker.run(Step::Chunk, 10, true).await.unwrap();
        assert_eq!(outcome.chunked, 1);

        assert!(VideoChunk::get_chunks_for_video("v1", &db).await.unwrap().is_empty());
        let video = Video::get_video("v1", &db).await.unwrap().unwrap();
        assert!(!video.pipeline_state.contains_key("chunk_transcript"));
    }

    #[tokio::test]
    async fn report_emits_one_event_per_video() {
        use futures::StreamExt;

        let db = memory_db().await;
        let (worker, storage) = worker_with(db.clone()).await;
        seed_video_with_archive(&db, &storage, "v1").await;
        seed_video_with_archive(&db, &storage, "v2").await;

        let worker = Arc::new(worker);
        let events: Vec<ProgressEvent> = worker.report(Step::Chunk, 10, false).collect().await;
        assert_eq!(events.len(), 2);
    }
}
