use async_trait::async_trait;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use tracing::warn;

use crate::application::stores::{RecordStore, StoreError};
use crate::domain::record::{CacheKey, CacheRecord, StoragePaths};

use super::{map_sqlx_error, PgRecordStore};

#[derive(sqlx::FromRow)]
struct RecordRow {
    key: String,
    owner_id: String,
    source_text: String,
    media_path: String,
    visemes_path: Option<String>,
    word_timestamps_path: Option<String>,
    metadata: Option<JsonValue>,
    created_at: OffsetDateTime,
    updated_at: Option<OffsetDateTime>,
}

impl From<RecordRow> for CacheRecord {
    fn from(row: RecordRow) -> Self {
        let metadata = row.metadata.and_then(|value| {
            serde_json::from_value(value)
                .map_err(|err| {
                    warn!(
                        key = %row.key,
                        error = %err,
                        "stored metadata does not deserialize; serving the record without it"
                    );
                })
                .ok()
        });
        Self {
            key: CacheKey::new(row.key),
            owner_id: row.owner_id,
            source_text: row.source_text,
            storage_paths: StoragePaths {
                media_path: row.media_path,
                visemes_path: row.visemes_path,
                word_timestamps_path: row.word_timestamps_path,
            },
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_RECORD: &str = "SELECT key, owner_id, source_text, media_path, visemes_path, \
     word_timestamps_path, metadata, created_at, updated_at \
     FROM cache_records WHERE key = $1";

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find(&self, key: &CacheKey) -> Result<Option<CacheRecord>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(SELECT_RECORD)
            .bind(key.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CacheRecord::from))
    }

    async fn insert(&self, record: CacheRecord) -> Result<(), StoreError> {
        let metadata_json = match record.metadata.as_ref() {
            Some(metadata) => Some(
                serde_json::to_value(metadata)
                    .map_err(StoreError::from_persistence)?,
            ),
            None => None,
        };

        sqlx::query(
            "INSERT INTO cache_records \
             (key, owner_id, source_text, media_path, visemes_path, word_timestamps_path, \
              metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.key.as_str())
        .bind(&record.owner_id)
        .bind(&record.source_text)
        .bind(&record.storage_paths.media_path)
        .bind(record.storage_paths.visemes_path.as_deref())
        .bind(record.storage_paths.word_timestamps_path.as_deref())
        .bind(metadata_json)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.pool())
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate {
                    key: record.key.clone(),
                }
            }
            _ => map_sqlx_error(err),
        })?;

        Ok(())
    }

    async fn increment_usage(&self, key: &CacheKey) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO usage_events (record_key, recorded_at) VALUES ($1, now())",
        )
        .bind(key.as_str())
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            // An unknown key shows up as a foreign-key violation; usage
            // accounting is telemetry and must never fail the request path.
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                warn!(key = %key, "usage increment for unknown cache key ignored");
                Ok(())
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn usage_count(&self, key: &CacheKey) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM usage_events WHERE record_key = $1")
                .bind(key.as_str())
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        count
            .try_into()
            .map_err(|_| StoreError::from_persistence("count exceeds supported range"))
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cache_records WHERE key = $1")
            .bind(key.as_str())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cache_records WHERE owner_id = $1")
            .bind(owner_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
