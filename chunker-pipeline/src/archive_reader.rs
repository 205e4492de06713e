//! Fetches and validates the immutable ingested artifact for a video.
//!
//! Grounded on the Blob Store Gateway (4.A) plus the JSON archive shape
//! from `populate_surrealdb_from_archive.py`: no mutation, `NotFound` when
//! the object is absent, `MalformedArchive` when it fails to parse or is
//! missing `video_id`.

use common::{error::AppError, storage::store::StorageManager, storage::types::archive_record::ArchiveRecord};

#[derive(Clone)]
pub struct ArchiveReader {
    storage: StorageManager,
}

impl ArchiveReader {
    #[must_use]
    pub fn new(storage: StorageManager) -> Self {
        Self { storage }
    }

    pub async fn fetch(&self, archive_path: &str) -> Result<ArchiveRecord, AppError> {
        let record: Option<ArchiveRecord> = match self.storage.get_json(archive_path).await {
            Ok(record) => record,
            Err(AppError::Serialization(err)) => {
                return Err(AppError::MalformedArchive(format!(
                    "archive at {archive_path} failed to parse: {err}"
                )))
            }
            Err(other) => return Err(other),
        };

        let record = record
            .ok_or_else(|| AppError::NotFound(format!("archive not found: {archive_path}")))?;

        if record.video_id.trim().is_empty() {
            return Err(AppError::MalformedArchive(format!(
                "archive at {archive_path} is missing video_id"
            )));
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::archive_record::{ImportMetadata, TimedSegment};

    fn sample_record(video_id: &str) -> ArchiveRecord {
        ArchiveRecord {
            video_id: video_id.into(),
            url: "https://example.com/v1".into(),
            fetched_at: chrono::Utc::now(),
            youtube_metadata: serde_json::json!({}),
            raw_transcript: None,
            timed_transcript: Some(vec![TimedSegment { text: "hi".into(), start: 0.0, duration: 1.0 }]),
            llm_outputs: vec![],
            import_metadata: ImportMetadata::default(),
        }
    }

    async fn memory_storage() -> StorageManager {
        StorageManager::new(&common::utils::config::testing::test_config_memory())
            .await
            .expect("create memory storage")
    }

    #[tokio::test]
    async fn fetch_missing_archive_is_not_found() {
        let storage = memory_storage().await;
        let reader = ArchiveReader::new(storage);
        let err = reader.fetch("archives/missing.json").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_malformed_json_is_malformed_archive() {
        let storage = memory_storage().await;
        storage.put_text("archives/bad.json", "not json").await.unwrap();
        let reader = ArchiveReader::new(storage);
        let err = reader.fetch("archives/bad.json").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedArchive(_)));
    }

    #[tokio::test]
    async fn fetch_missing_video_id_is_malformed_archive() {
        let storage = memory_storage().await;
        storage
            .put_json(
                "archives/no_id.json",
                &serde_json::json!({"url": "https://x", "fetched_at": "2024-01-01T00:00:00Z"}),
            )
            .await
            .unwrap();
        let reader = ArchiveReader::new(storage);
        let err = reader.fetch("archives/no_id.json").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedArchive(_)));
    }

    #[tokio::test]
    async fn fetch_valid_archive_round_trips() {
        let storage = memory_storage().await;
        let record = sample_record("v1");
        storage.put_json("archives/v1.json", &record).await.unwrap();
        let reader = ArchiveReader::new(storage);
        let fetched = reader.fetch("archives/v1.json").await.unwrap();
        assert_eq!(fetched.video_id, "v1");
    }
}
