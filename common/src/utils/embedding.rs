use std::time::Duration;

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use tracing::debug;

use crate::error::AppError;

/// Deadline applied to every embedding call, per spec §4.B.
const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(120);

/// Seam the Backfill Worker and RAG Retriever code against, so tests can
/// swap in [`testing::HashedEmbeddingClient`] instead of calling out to a
/// real embedding endpoint.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

/// Wraps the remote embedding endpoint behind the fixed-dimension contract
/// the rest of the system relies on: `embed`/`embed_batch`, input
/// truncated to a configured character cap, output validated against `D`.
///
/// Retries are deliberately not performed here (spec §4.B: "retries are NOT
/// performed at this layer") — the Backfill Worker and RAG Retriever decide
/// whether and how to retry a failed call.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
    char_cap: usize,
}

impl EmbeddingClient {
    #[must_use]
    pub fn new(client: Client<OpenAIConfig>, model: String, dimension: usize, char_cap: usize) -> Self {
        Self {
            client,
            model,
            dimension,
            char_cap,
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.char_cap) {
            Some((byte_idx, _)) => &text[..byte_idx],
            None => text,
        }
    }

    /// Embeds a single string, truncating to the configured character cap
    /// first. Returns `DimensionMismatch` if the upstream's vector length
    /// does not equal the configured dimension.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let truncated = self.truncate(text);
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .dimensions(self.dimension as u32)
            .input([truncated])
            .build()
            .map_err(AppError::OpenAI)?;

        let response = tokio::time::timeout(EMBEDDING_TIMEOUT, self.client.embeddings().create(request))
            .await
            .map_err(|_| AppError::Timeout("embedding request exceeded 120s deadline".into()))?
            .map_err(|err| AppError::EmbeddingUnavailable(err.to_string()))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingUnavailable("no embedding data received".into()))?
            .embedding;

        self.validate_dimension(embedding)
    }

    /// Embeds a batch of strings in one upstream call. Caller policy: the
    /// embed step feeds in only chunks with a null embedding.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let truncated: Vec<&str> = texts.iter().map(|t| self.truncate(t)).collect();

        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .dimensions(self.dimension as u32)
            .input(truncated)
            .build()
            .map_err(AppError::OpenAI)?;

        let response = tokio::time::timeout(EMBEDDING_TIMEOUT, self.client.embeddings().create(request))
            .await
            .map_err(|_| AppError::Timeout("embedding batch exceeded 120s deadline".into()))?
            .map_err(|err| AppError::EmbeddingUnavailable(err.to_string()))?;

        debug!(count = response.data.len(), "received batch embeddings");

        response
            .data
            .into_iter()
            .map(|d| self.validate_dimension(d.embedding))
            .collect()
    }

    fn validate_dimension(&self, embedding: Vec<f32>) -> Result<Vec<f32>, AppError> {
        if embedding.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Self::embed(self, text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Self::embed_batch(self, texts).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use async_trait::async_trait;

    use super::Embedder;
    use crate::error::AppError;

    /// Deterministic, hash-based "embedding" for tests: no network call,
    /// stable across runs, fixed dimension. Mirrors the teacher's
    /// `EmbeddingProvider::new_hashed` test seam.
    #[derive(Clone)]
    pub struct HashedEmbeddingClient {
        dimension: usize,
    }

    impl HashedEmbeddingClient {
        #[must_use]
        pub fn new(dimension: usize) -> Self {
            Self { dimension }
        }

        #[must_use]
        pub fn dimension(&self) -> usize {
            self.dimension
        }

        pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
            Ok(hashed_vector(text, self.dimension))
        }

        pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            Ok(texts.iter().map(|t| hashed_vector(t, self.dimension)).collect())
        }
    }

    #[async_trait]
    impl Embedder for HashedEmbeddingClient {
        fn dimension(&self) -> usize {
            Self::dimension(self)
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
            Self::embed(self, text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            Self::embed_batch(self, texts).await
        }
    }

    fn hashed_vector(text: &str, dimension: usize) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        let mut out = Vec::with_capacity(dimension);
        for i in 0..dimension {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let bits = hasher.finish();
            // Map into [-1, 1] so cosine similarity behaves sensibly.
            out.push(((bits % 2000) as f32 - 1000.0) / 1000.0);
        }
        out
    }
}
