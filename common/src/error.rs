use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Unified error type for the retrieval and ingestion engine.
///
/// Variants map onto the error taxonomy in the system specification:
/// each one is raised at a specific boundary and recovered from in a
/// specific way (rejected at the edge, logged and skipped, or bubbled
/// to the session boundary as a status code / error frame).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),

    /// A caller-supplied argument failed validation at a public entry point.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Embedding vector length did not match the configured dimension `D`.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// `upsert_chunks` received a non-contiguous `chunk_index` set.
    #[error("Invalid chunk set: {0}")]
    InvalidChunkSet(String),
    /// The Blob Store transport failed (connection, timeout, backend error).
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// The remote embedding endpoint could not be reached or errored.
    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// Neither LLM upstream (remote or local) could be reached.
    #[error("LLM unavailable: {0}")]
    LLMUnavailable(String),
    /// An archive blob existed but failed to parse, or was missing `video_id`.
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),
    /// A bounded operation exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl AppError {
    /// Maps this error onto the exit codes documented in the spec's CLI contract:
    /// `0` success, `1` unhandled error, `124` timeout.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Timeout(_) => 124,
            _ => 1,
        }
    }
}
