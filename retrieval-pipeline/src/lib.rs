#![allow(clippy::missing_docs_in_private_items)]

//! The RAG Retriever (spec §4.G): turns a free-text query into a ranked
//! set of video hits, a deduplicated source list, and a human-readable
//! context block for the chat prompt.
//!
//! Grounded on `common::storage::types::video::Video::search_video_by_embedding`
//! for the vector search itself and on the teacher's
//! `retrieval-pipeline/src/fts.rs` query-construction idiom for wrapping a
//! store query behind a small, test-covered function.

use common::{
    storage::{
        db::SurrealDbClient,
        types::{
            message::SourceRef,
            video::{Hit, Video},
        },
    },
    utils::embedding::Embedder,
};
use tracing::warn;

/// Embeds `query`, searches the Store Repository for the top `limit` video
/// hits (optionally scoped to one channel), and returns them unranked past
/// the store's own ordering. Propagates any embed/search failure to the
/// caller — callers that need fail-soft behavior should use
/// [`get_context_and_sources`] instead.
pub async fn retrieve_context(
    query: &str,
    embedding_client: &dyn Embedder,
    limit: usize,
    channel_filter: Option<&str>,
    db: &SurrealDbClient,
) -> Result<Vec<Hit>, common::error::AppError> {
    if query.trim().is_empty() {
        return Err(common::error::AppError::InvalidArgument(
            "query text must not be empty".into(),
        ));
    }
    let embedding = embedding_client.embed(query).await?;
    Video::search_video_by_embedding(
        &embedding,
        embedding_client.dimension(),
        limit,
        0,
        channel_filter,
        None,
        None,
        db,
    )
    .await
}

/// Extracts a deduplicated, order-preserving source list from a set of
/// hits, per spec §4.G: first occurrence of a `video_id` wins.
#[must_use]
pub fn extract_sources(hits: &[Hit]) -> Vec<SourceRef> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for hit in hits {
        if seen.insert(hit.video_id.clone()) {
            sources.push(SourceRef {
                video_id: hit.video_id.clone(),
                title: hit.title.clone(),
                url: hit.url.clone(),
                relevance_score: hit.score,
            });
        }
    }
    sources
}

/// Builds the chat-prompt context block and the accompanying source list
/// for `query`. Never propagates an error: any embed or search failure is
/// logged and answered with `("", [])`, matching spec §4.G so a transient
/// retrieval failure degrades the chat answer instead of aborting it.
pub async fn get_context_and_sources(
    query: &str,
    embedding_client: &dyn Embedder,
    limit: usize,
    db: &SurrealDbClient,
) -> (String, Vec<SourceRef>) {
    let hits = match retrieve_context(query, embedding_client, limit, None, db).await {
        Ok(hits) => hits,
        Err(err) => {
            warn!(error = %err, "RAG retrieval failed, answering without context");
            return (String::new(), Vec::new());
        }
    };

    if hits.is_empty() {
        return (String::new(), Vec::new());
    }

    let sources = extract_sources(&hits);
    let context_block = hits
        .iter()
        .map(format_hit)
        .collect::<Vec<String>>()
        .join("\n\n");

    (context_block, sources)
}

fn format_hit(hit: &Hit) -> String {
    let channel_name = hit.channel_name.as_deref().unwrap_or("Unknown");
    let text = hit.text.as_deref().unwrap_or("");
    format!(
        "[Video: \"{title}\"]\nChannel: {channel_name}\nRelevance: {score:.3}\n\nTranscript: {text}",
        title = hit.title,
        score = hit.score,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::embedding::testing::HashedEmbeddingClient;
    use uuid::Uuid;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .unwrap()
    }

    async fn seed_embedded_video(db: &SurrealDbClient, video_id: &str, title: &str, text: &str, embedder: &HashedEmbeddingClient) {
        let mut video = Video::new(video_id.to_string(), format!("https://example.com/{video_id}"), title.to_string());
        video.channel_name = Some("Test Channel".into());
        video.embedding = Some(embedder.embed(text).await.unwrap());
        Video::upsert_video(video, db).await.unwrap();
    }

    #[tokio::test]
    async fn extract_sources_dedups_preserving_first_occurrence_order() {
        let hits = vec![
            Hit { video_id: "a".into(), title: "A".into(), url: "u1".into(), channel_name: None, score: 0.9, archive_path: None, text: None },
            Hit { video_id: "b".into(), title: "B".into(), url: "u2".into(), channel_name: None, score: 0.8, archive_path: None, text: None },
            Hit { video_id: "a".into(), title: "A again".into(), url: "u1b".into(), channel_name: None, score: 0.95, archive_path: None, text: None },
        ];
        let sources = extract_sources(&hits);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].video_id, "a");
        assert_eq!(sources[0].title, "A");
        assert_eq!(sources[1].video_id, "b");
    }

    #[tokio::test]
    async fn empty_query_is_invalid_argument() {
        let db = memory_db().await;
        let embedder = HashedEmbeddingClient::new(4);
        let err = retrieve_context("   ", &embedder, 5, None, &db).await.unwrap_err();
        assert!(matches!(err, common::error::AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn context_block_matches_template_and_sources_match_hits() {
        let db = memory_db().await;
        let embedder = HashedEmbeddingClient::new(4);
        seed_embedded_video(&db, "v1", "Intro to Rust", "talking about ownership and borrowing", &embedder).await;

        let (context, sources) = get_context_and_sources("ownership and borrowing", &embedder, 5, &db).await;
        assert!(context.contains("[Video: \"Intro to Rust\"]"));
        assert!(context.contains("Channel: Test Channel"));
        assert!(context.contains("Relevance: "));
        assert!(context.contains("Transcript:"));
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].video_id, "v1");
    }

    #[tokio::test]
    async fn no_matching_videos_returns_empty_context_and_sources() {
        let db = memory_db().await;
        let embedder = HashedEmbeddingClient::new(4);
        let (context, sources) = get_context_and_sources("anything", &embedder, 5, &db).await;
        assert_eq!(context, "");
        assert!(sources.is_empty());
    }
}
