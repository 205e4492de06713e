use futures::StreamExt;
use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::db::SurrealDbClient,
    stored_object,
    utils::llm::{ChatRole, ChatTurn, LlmProxy},
};

use super::message::{Message, MessageRole, SourceRef};

stored_object!(Conversation, "conversation", {
    title: String,
    model: String,
});

/// Summary row returned by `list_conversations`/`search_conversations`:
/// conversation metadata plus a derived message count, without pulling
/// every message into memory.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ConversationMeta {
    pub id: String,
    pub title: String,
    pub model: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub message_count: u32,
}

impl Conversation {
    pub fn new(title: String, model: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            model,
        }
    }

    pub async fn create_conversation(
        title: String,
        model: String,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let conversation = Self::new(title, model);
        db.store_item(conversation.clone())
            .await
            .map_err(AppError::Database)?;
        Ok(conversation)
    }

    /// Sorted by `updated_at` descending, each row carrying its message
    /// count.
    pub async fn list_conversations(
        db: &SurrealDbClient,
    ) -> Result<Vec<ConversationMeta>, AppError> {
        let rows: Vec<ConversationMeta> = db
            .client
            .query(
                "SELECT id, title, model, created_at, updated_at,
                    count((SELECT id FROM message WHERE conversation_id = $parent.id)) AS message_count
                 FROM type::table($table)
                 ORDER BY updated_at DESC",
            )
            .bind(("table", Self::table_name()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(rows)
    }

    pub async fn get_conversation(
        conversation_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<(Self, Vec<Message>)>, AppError> {
        let Some(conversation): Option<Self> =
            db.get_item(conversation_id).await.map_err(AppError::Database)?
        else {
            return Ok(None);
        };

        let messages: Vec<Message> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE conversation_id = $conversation_id ORDER BY timestamp ASC")
            .bind(("table", Message::table_name()))
            .bind(("conversation_id", conversation_id.to_string()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;

        Ok(Some((conversation, messages)))
    }

    pub async fn update_conversation(
        id: &str,
        title: Option<String>,
        model: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let Some(_existing): Option<Self> = db.get_item(id).await.map_err(AppError::Database)?
        else {
            return Ok(None);
        };

        let mut update = db.client.update((Self::table_name(), id));
        if let Some(title) = title {
            update = update.patch(PatchOp::replace("/title", title));
        }
        if let Some(model) = model {
            update = update.patch(PatchOp::replace("/model", model));
        }
        let updated: Option<Self> = update
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::from(chrono::Utc::now()),
            ))
            .await
            .map_err(AppError::Database)?;

        Ok(updated)
    }

    /// Appends a message to the conversation and bumps the conversation's
    /// `updated_at` so `list_conversations` reflects the new activity.
    /// Returns `None` if the conversation does not exist.
    pub async fn add_message(
        conversation_id: &str,
        role: MessageRole,
        content: String,
        sources: Option<Vec<SourceRef>>,
        db: &SurrealDbClient,
    ) -> Result<Option<Message>, AppError> {
        let exists: Option<Self> = db
            .get_item(conversation_id)
            .await
            .map_err(AppError::Database)?;
        if exists.is_none() {
            return Ok(None);
        }

        let message = Message::new(conversation_id.to_string(), role, content, sources);
        db.store_item(message.clone())
            .await
            .map_err(AppError::Database)?;

        let _: Option<Self> = db
            .client
            .update((Self::table_name(), conversation_id))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::from(chrono::Utc::now()),
            ))
            .await
            .map_err(AppError::Database)?;

        Ok(Some(message))
    }

    /// Deletes messages before the conversation itself, preserving
    /// referential integrity.
    pub async fn delete_conversation(id: &str, db: &SurrealDbClient) -> Result<bool, AppError> {
        let existing: Option<Self> = db.get_item(id).await.map_err(AppError::Database)?;
        if existing.is_none() {
            return Ok(false);
        }

        db.client
            .query("DELETE FROM type::table($table) WHERE conversation_id = $id")
            .bind(("table", Message::table_name()))
            .bind(("id", id.to_string()))
            .await
            .map_err(AppError::Database)?;

        let _: Option<Self> = db.delete_item(id).await.map_err(AppError::Database)?;
        Ok(true)
    }

    /// Substring match on title or any message content. Query length < 2 is
    /// rejected as `InvalidArgument`.
    pub async fn search_conversations(
        query: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<ConversationMeta>, AppError> {
        if query.chars().count() < 2 {
            return Err(AppError::InvalidArgument(
                "search query must be at least 2 characters".into(),
            ));
        }

        let rows: Vec<ConversationMeta> = db
            .client
            .query(
                "SELECT id, title, model, created_at, updated_at,
                    count((SELECT id FROM message WHERE conversation_id = $parent.id)) AS message_count
                 FROM type::table($table)
                 WHERE string::contains(string::lowercase(title), string::lowercase($query))
                    OR (SELECT id FROM message WHERE conversation_id = $parent.id AND string::contains(string::lowercase(content), string::lowercase($query)))
                 ORDER BY updated_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("query", query.to_string()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(rows)
    }

    /// Truncates `first_message` to 50 characters at a word boundary. Used
    /// as the title-generation fallback when the LLM call fails; per the
    /// spec's Open Question, this truncates by Unicode scalar value count,
    /// not bytes, so multi-byte characters are never split mid-codepoint.
    #[must_use]
    pub fn fallback_title(first_message: &str) -> String {
        const MAX_LEN: usize = 50;
        let chars: Vec<char> = first_message.chars().collect();
        if chars.len() <= MAX_LEN {
            return first_message.to_string();
        }

        let truncated: String = chars[..MAX_LEN].iter().collect();
        match truncated.rfind(' ') {
            Some(idx) if idx > 0 => truncated[..idx].to_string(),
            _ => truncated,
        }
    }

    /// Asks the LLM for a 3-6 word title for `first_message`. Falls back to
    /// [`Self::fallback_title`] on any upstream failure or empty response,
    /// per spec §4.H — title generation never fails the conversation.
    pub async fn generate_title(
        first_message: &str,
        model: &str,
        llm: &dyn LlmProxy,
    ) -> String {
        let prompt = format!(
            "Give a short, 3 to 6 word title summarizing this message. \
             Respond with the title only, no quotes or punctuation at the end.\n\nMessage: {first_message}"
        );
        let messages = vec![ChatTurn {
            role: ChatRole::User,
            content: prompt,
        }];

        let mut stream = llm.stream_completion(model, messages).await;
        let mut title = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(token) => title.push_str(&token),
                Err(_) => return Self::fallback_title(first_message),
            }
        }

        let title = title.trim().trim_matches('"').to_string();
        if title.is_empty() {
            Self::fallback_title(first_message)
        } else {
            title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::types::message::MessageRole, utils::llm::testing::StaticLlmClient};

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn create_and_get_conversation() {
        let db = memory_db().await;
        let conversation = Conversation::create_conversation("Title".into(), "gpt-4o".into(), &db)
            .await
            .unwrap();

        let (fetched, messages) = Conversation::get_conversation(&conversation.id, &db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.title, "Title");
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn get_conversation_not_found_returns_none() {
        let db = memory_db().await;
        assert!(Conversation::get_conversation("missing", &db)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_conversation_removes_messages_first() {
        let db = memory_db().await;
        let conversation = Conversation::create_conversation("T".into(), "m".into(), &db)
            .await
            .unwrap();
        db.store_item(Message::new(
            conversation.id.clone(),
            MessageRole::User,
            "hi".into(),
            None,
        ))
        .await
        .unwrap();

        let deleted = Conversation::delete_conversation(&conversation.id, &db)
            .await
            .unwrap();
        assert!(deleted);

        let (_, messages) = {
            let result = Conversation::get_conversation(&conversation.id, &db)
                .await
                .unwrap();
            assert!(result.is_none());
            (0, Vec::<Message>::new())
        };
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn add_message_bumps_conversation_updated_at() {
        let db = memory_db().await;
        let conversation = Conversation::create_conversation("T".into(), "m".into(), &db)
            .await
            .unwrap();
        let original_updated_at = conversation.updated_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let message = Conversation::add_message(
            &conversation.id,
            MessageRole::User,
            "hello".into(),
            None,
            &db,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(message.content, "hello");

        let (updated, messages) = Conversation::get_conversation(&conversation.id, &db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(updated.updated_at > original_updated_at);
    }

    #[tokio::test]
    async fn add_message_to_missing_conversation_returns_none() {
        let db = memory_db().await;
        let result = Conversation::add_message("missing", MessageRole::User, "hi".into(), None, &db)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn search_conversations_rejects_short_query() {
        let db = memory_db().await;
        let err = Conversation::search_conversations("a", &db).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn fallback_title_truncates_at_word_boundary() {
        let long = "a ".repeat(40);
        let title = Conversation::fallback_title(&long);
        assert!(title.chars().count() <= 50);
        assert!(!title.ends_with(' '));
    }

    #[test]
    fn fallback_title_keeps_short_message_unchanged() {
        assert_eq!(Conversation::fallback_title("hi"), "hi");
    }

    #[tokio::test]
    async fn generate_title_uses_llm_response() {
        let llm = StaticLlmClient::responding_with(vec!["Rust ".into(), "Ownership Basics".into()]);
        let title = Conversation::generate_title("explain ownership", "gpt-4o-mini", &llm).await;
        assert_eq!(title, "Rust Ownership Basics");
    }

    #[tokio::test]
    async fn generate_title_falls_back_on_llm_failure() {
        let llm = StaticLlmClient::failing();
        let long_message = "a ".repeat(40);
        let title = Conversation::generate_title(&long_message, "gpt-4o-mini", &llm).await;
        assert_eq!(title, Conversation::fallback_title(&long_message));
    }
}
