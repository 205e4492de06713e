use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient, storage::types::StoredObject};

/// The persisted-config tier: a single row holding operator-tunable
/// settings that outlive a process restart. Everything else (connection
/// strings, feature flags) lives in environment/file config instead.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SystemSettings {
    pub id: String,
    pub embedding_model: String,
    pub embedding_dimensions: u32,
}

impl StoredObject for SystemSettings {
    fn table_name() -> &'static str {
        "system_settings"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl SystemSettings {
    const SINGLETON_ID: &'static str = "current";

    #[must_use]
    pub fn defaults(embedding_model: &str, embedding_dimensions: u32) -> Self {
        Self {
            id: Self::SINGLETON_ID.to_string(),
            embedding_model: embedding_model.to_string(),
            embedding_dimensions,
        }
    }

    /// Writes the defaults row only if none exists yet; a no-op on restart.
    pub async fn ensure_initialized(
        db: &SurrealDbClient,
        embedding_model: &str,
        embedding_dimensions: u32,
    ) -> Result<(), AppError> {
        let existing: Option<Self> = db
            .get_item(Self::SINGLETON_ID)
            .await
            .map_err(AppError::Database)?;
        if existing.is_none() {
            db.store_item(Self::defaults(embedding_model, embedding_dimensions))
                .await
                .map_err(AppError::Database)?;
        }
        Ok(())
    }

    pub async fn get_current(db: &SurrealDbClient) -> Result<Self, AppError> {
        let settings: Option<Self> = db
            .get_item(Self::SINGLETON_ID)
            .await
            .map_err(AppError::Database)?;
        settings.ok_or_else(|| AppError::NotFound("system settings not initialized".into()))
    }

    pub async fn update(
        db: &SurrealDbClient,
        embedding_model: Option<String>,
        embedding_dimensions: Option<u32>,
    ) -> Result<Self, AppError> {
        let mut current = Self::get_current(db).await?;
        if let Some(model) = embedding_model {
            current.embedding_model = model;
        }
        if let Some(dims) = embedding_dimensions {
            current.embedding_dimensions = dims;
        }

        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing('system_settings', $id) MERGE $changes RETURN AFTER")
            .bind(("id", Self::SINGLETON_ID))
            .bind(("changes", current))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;

        updated.ok_or_else(|| AppError::InternalError("system settings update returned nothing".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn ensure_initialized_is_idempotent() {
        let db = memory_db().await;
        SystemSettings::ensure_initialized(&db, "text-embedding-3-large", 1024)
            .await
            .unwrap();
        SystemSettings::ensure_initialized(&db, "some-other-model", 256)
            .await
            .unwrap();

        let settings = SystemSettings::get_current(&db).await.unwrap();
        assert_eq!(settings.embedding_model, "text-embedding-3-large");
        assert_eq!(settings.embedding_dimensions, 1024);
    }

    #[tokio::test]
    async fn get_current_without_init_is_not_found() {
        let db = memory_db().await;
        let err = SystemSettings::get_current(&db).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_merges_only_provided_fields() {
        let db = memory_db().await;
        SystemSettings::ensure_initialized(&db, "model-a", 768).await.unwrap();

        let updated = SystemSettings::update(&db, None, Some(1024)).await.unwrap();
        assert_eq!(updated.embedding_model, "model-a");
        assert_eq!(updated.embedding_dimensions, 1024);
    }
}
