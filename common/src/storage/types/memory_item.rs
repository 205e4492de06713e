use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Preference,
    Fact,
    Context,
    General,
}

stored_object!(MemoryItem, "memory", {
    content: String,
    category: MemoryCategory,
    source_conversation_id: Option<String>,
    relevance_score: f32,
});

impl MemoryItem {
    pub fn new(
        content: String,
        category: MemoryCategory,
        source_conversation_id: Option<String>,
        relevance_score: f32,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            content,
            category,
            source_conversation_id,
            relevance_score: relevance_score.clamp(0.0, 1.0),
        }
    }

    pub async fn list(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        db.get_all_stored_items().await.map_err(AppError::Database)
    }

    pub async fn add(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.store_item(self.clone()).await.map_err(AppError::Database)?;
        Ok(self)
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        db.get_item(id).await.map_err(AppError::Database)
    }

    pub async fn delete(id: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        db.delete_item(id).await.map_err(AppError::Database)
    }

    /// Patches `content`/`category`/`relevance_score` on an existing memory.
    /// Returns `None` if the memory does not exist.
    pub async fn update(
        id: &str,
        content: Option<String>,
        category: Option<MemoryCategory>,
        relevance_score: Option<f32>,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let Some(mut current) = Self::get(id, db).await? else {
            return Ok(None);
        };

        if let Some(content) = content {
            current.content = content;
        }
        if let Some(category) = category {
            current.category = category;
        }
        if let Some(relevance_score) = relevance_score {
            current.relevance_score = relevance_score.clamp(0.0, 1.0);
        }
        current.updated_at = chrono::Utc::now();

        let updated: Option<Self> = db
            .client
            .update((Self::table_name(), id))
            .content(current)
            .await
            .map_err(AppError::Database)?;
        Ok(updated)
    }

    pub async fn clear_all(db: &SurrealDbClient) -> Result<(), AppError> {
        db.drop_table::<Self>().await.map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn search(query: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let all = Self::list(db).await?;
        let needle = query.to_lowercase();
        Ok(all
            .into_iter()
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .collect())
    }

    /// Scores every memory by `word_overlap(context, content) / len(content_words) *
    /// relevance_score`, returning the top `limit` by that score, descending.
    #[must_use]
    pub fn get_relevant_memories(context_text: &str, limit: usize, memories: &[Self]) -> Vec<Self> {
        let context_words: std::collections::HashSet<String> = context_text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();

        let mut scored: Vec<(f32, Self)> = memories
            .iter()
            .map(|m| {
                let content_words: Vec<String> =
                    m.content.split_whitespace().map(|w| w.to_lowercase()).collect();
                if content_words.is_empty() {
                    return (0.0, m.clone());
                }
                let overlap = content_words
                    .iter()
                    .filter(|w| context_words.contains(*w))
                    .count() as f32;
                let score = (overlap / content_words.len() as f32) * m.relevance_score;
                (score, m.clone())
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, m)| m).collect()
    }

    /// Builds the memory block injected into a chat prompt: a fixed preface
    /// followed by bulleted contents, or an empty string when there are no
    /// relevant memories.
    #[must_use]
    pub fn build_memory_context(context_text: &str, limit: usize, memories: &[Self]) -> String {
        let relevant = Self::get_relevant_memories(context_text, limit, memories);
        if relevant.is_empty() {
            return String::new();
        }

        let mut block = String::from("Here are some things you remember about the user:\n");
        for memory in &relevant {
            block.push_str("- ");
            block.push_str(&memory.content);
            block.push('\n');
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid as UuidGen;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &UuidGen::new_v4().to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_get_delete_round_trip() {
        let db = memory_db().await;
        let item = MemoryItem::new("likes rust".into(), MemoryCategory::Preference, None, 0.9)
            .add(&db)
            .await
            .unwrap();

        let fetched = MemoryItem::get(&item.id, &db).await.unwrap().unwrap();
        assert_eq!(fetched.content, "likes rust");

        let deleted = MemoryItem::delete(&item.id, &db).await.unwrap();
        assert!(deleted.is_some());
        assert!(MemoryItem::get(&item.id, &db).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_patches_only_given_fields() {
        let db = memory_db().await;
        let item = MemoryItem::new("likes rust".into(), MemoryCategory::Preference, None, 0.5)
            .add(&db)
            .await
            .unwrap();

        let updated = MemoryItem::update(&item.id, None, None, Some(0.9), &db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "likes rust");
        assert!((updated.relevance_score - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn update_missing_memory_returns_none() {
        let db = memory_db().await;
        let result = MemoryItem::update("missing", Some("x".into()), None, None, &db)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn relevant_memories_favor_word_overlap_and_relevance() {
        let memories = vec![
            MemoryItem::new("likes rust programming".into(), MemoryCategory::Preference, None, 1.0),
            MemoryItem::new("dislikes cold weather".into(), MemoryCategory::Preference, None, 1.0),
        ];

        let top = MemoryItem::get_relevant_memories("tell me about rust programming", 1, &memories);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].content, "likes rust programming");
    }

    #[test]
    fn memory_context_empty_when_no_matches() {
        let memories = vec![MemoryItem::new("dislikes cold weather".into(), MemoryCategory::Preference, None, 1.0)];
        let context = MemoryItem::build_memory_context("completely unrelated", 5, &[]);
        assert_eq!(context, "");
        let _ = memories;
    }

    #[test]
    fn memory_context_prefixed_when_present() {
        let memories = vec![MemoryItem::new("likes rust".into(), MemoryCategory::Preference, None, 1.0)];
        let context = MemoryItem::build_memory_context("rust", 5, &memories);
        assert!(context.starts_with("Here are some things you remember about the user:\n"));
        assert!(context.contains("- likes rust"));
    }
}
