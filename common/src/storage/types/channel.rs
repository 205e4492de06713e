use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Channel, "channel", {
    channel_id: String,
    channel_name: String,
    video_count: u32,
});

impl Channel {
    pub fn new(channel_id: String, channel_name: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: channel_id.clone(),
            created_at: now,
            updated_at: now,
            channel_id,
            channel_name,
            video_count: 0,
        }
    }

    /// Creates the channel node if it does not already exist and links
    /// `video_id` to it via the `video_channel` relationship table. Both
    /// operations are idempotent.
    pub async fn link_video_to_channel(
        video_id: &str,
        channel_id: &str,
        channel_name: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let existing: Option<Self> = db.get_item(channel_id).await.map_err(AppError::Database)?;
        if existing.is_none() {
            let channel = Self::new(channel_id.to_string(), channel_name.to_string());
            db.store_item(channel).await.map_err(AppError::Database)?;
        }

        db.client
            .query(
                "RELATE (type::thing('video', $video_id))->video_channel->(type::thing('channel', $channel_id))",
            )
            .bind(("video_id", video_id.to_string()))
            .bind(("channel_id", channel_id.to_string()))
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }
}
