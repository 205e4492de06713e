use serde::{Deserialize, Serialize};
pub mod archive_record;
pub mod channel;
pub mod conversation;
pub mod memory_item;
pub mod message;
pub mod style;
pub mod system_settings;
pub mod topic;
pub mod video;
pub mod video_chunk;

pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}

/// Declares a struct that is persisted as a SurrealDB record: it gets an
/// `id`, `created_at`, and `updated_at` field for free plus whatever custom
/// fields are listed, and an implementation of [`StoredObject`].
///
/// `id` tolerates being deserialized either from a plain string or from a
/// SurrealDB `Thing` reference (some queries return record links rather
/// than bare ids), and timestamps round-trip through
/// `surrealdb::sql::Datetime` rather than serde's default `chrono`
/// representation, which SurrealDB does not speak natively.
#[macro_export]
macro_rules! stored_object {
    ($name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),* $(,)?}) => {
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
        pub struct $name {
            #[serde(deserialize_with = "$crate::storage::types::deserialize_flexible_id")]
            pub id: String,
            #[serde(
                serialize_with = "$crate::storage::types::serialize_datetime",
                deserialize_with = "$crate::storage::types::deserialize_datetime",
                default = "chrono::Utc::now"
            )]
            pub created_at: chrono::DateTime<chrono::Utc>,
            #[serde(
                serialize_with = "$crate::storage::types::serialize_datetime",
                deserialize_with = "$crate::storage::types::deserialize_datetime",
                default = "chrono::Utc::now"
            )]
            pub updated_at: chrono::DateTime<chrono::Utc>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl $crate::storage::types::StoredObject for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}

struct FlexibleIdVisitor;

impl<'de> serde::de::Visitor<'de> for FlexibleIdVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a string or a Thing")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(value)
    }

    fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let thing =
            surrealdb::sql::Thing::deserialize(serde::de::value::MapAccessDeserializer::new(map))?;
        Ok(thing.id.to_raw())
    }
}

pub fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_any(FlexibleIdVisitor)
}

pub fn serialize_datetime<S>(
    date: &chrono::DateTime<chrono::Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    Into::<surrealdb::sql::Datetime>::into(*date).serialize(serializer)
}

pub fn deserialize_datetime<'de, D>(
    deserializer: D,
) -> Result<chrono::DateTime<chrono::Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let dt = surrealdb::sql::Datetime::deserialize(deserializer)?;
    Ok(chrono::DateTime::<chrono::Utc>::from(dt))
}
