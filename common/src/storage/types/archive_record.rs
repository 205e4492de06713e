use serde::{Deserialize, Serialize};

/// An ordered `{text, start, duration}` entry in a timed transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimedSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// An opaque `{output_type, output_value}` pair from an upstream LLM call
/// made during ingestion (e.g. a generated summary or tag list).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmOutput {
    pub output_type: String,
    pub output_value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImportMetadata {
    pub source: Option<String>,
    pub recommendation_weight: Option<f32>,
}

/// The immutable JSON document holding the ground-truth ingested artifact
/// for one video, as stored in the Blob Store at `archive_path`.
///
/// This is a plain data document, not a [`super::StoredObject`] — it lives
/// in the Blob Store Gateway, not the relational/vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveRecord {
    pub video_id: String,
    pub url: String,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub youtube_metadata: serde_json::Value,
    #[serde(default)]
    pub raw_transcript: Option<String>,
    #[serde(default)]
    pub timed_transcript: Option<Vec<TimedSegment>>,
    #[serde(default)]
    pub llm_outputs: Vec<LlmOutput>,
    #[serde(default)]
    pub import_metadata: ImportMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let record = ArchiveRecord {
            video_id: "v1".into(),
            url: "https://example.com/v1".into(),
            fetched_at: chrono::Utc::now(),
            youtube_metadata: serde_json::json!({"duration": 120}),
            raw_transcript: None,
            timed_transcript: Some(vec![TimedSegment {
                text: "hello".into(),
                start: 0.0,
                duration: 1.0,
            }]),
            llm_outputs: vec![],
            import_metadata: ImportMetadata::default(),
        };

        let json = serde_json::to_string(&record).unwrap();
        let roundtripped: ArchiveRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, roundtripped);
    }

    #[test]
    fn missing_video_id_fails_to_parse() {
        let bad = serde_json::json!({"url": "https://x", "fetched_at": "2024-01-01T00:00:00Z"});
        let result: Result<ArchiveRecord, _> = serde_json::from_value(bad);
        assert!(result.is_err());
    }
}
