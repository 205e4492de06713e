use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Topic, "topic", {
    normalized_name: String,
    name: String,
    video_count: u32,
});

impl Topic {
    pub fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn new(name: String) -> Self {
        let normalized_name = Self::normalize(&name);
        let now = chrono::Utc::now();
        Self {
            id: normalized_name.clone(),
            created_at: now,
            updated_at: now,
            normalized_name,
            name,
            video_count: 0,
        }
    }

    /// Upserts one topic node per name and links `video_id` to each via the
    /// `video_topic` relationship table. Topics are never auto-deleted.
    pub async fn link_video_to_topics(
        video_id: &str,
        names: &[String],
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        for name in names {
            let normalized = Self::normalize(name);
            let existing: Option<Self> =
                db.get_item(&normalized).await.map_err(AppError::Database)?;
            if existing.is_none() {
                db.store_item(Self::new(name.clone()))
                    .await
                    .map_err(AppError::Database)?;
            }

            db.client
                .query(
                    "RELATE (type::thing('video', $video_id))->video_topic->(type::thing('topic', $topic_id))",
                )
                .bind(("video_id", video_id.to_string()))
                .bind(("topic_id", normalized))
                .await
                .map_err(AppError::Database)?;
        }
        Ok(())
    }

    /// Names of every topic linked to `video_id`, in no particular order.
    pub async fn topics_for_video(
        video_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<String>, AppError> {
        let names: Vec<String> = db
            .client
            .query("SELECT VALUE name FROM (type::thing('video', $video_id))->video_topic->topic")
            .bind(("video_id", video_id.to_string()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn topic_names_are_normalized() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .unwrap();

        Topic::link_video_to_topics("v1", &["  Rust Programming  ".to_string()], &db)
            .await
            .unwrap();

        let topic = db
            .get_item::<Topic>("rust programming")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(topic.name, "  Rust Programming  ");
    }

    #[tokio::test]
    async fn topics_for_video_lists_linked_names() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .unwrap();

        Topic::link_video_to_topics(
            "v1",
            &["Rust".to_string(), "Async".to_string()],
            &db,
        )
        .await
        .unwrap();

        let mut names = Topic::topics_for_video("v1", &db).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["Async".to_string(), "Rust".to_string()]);
    }
}
