//! # Sync State Repository
//!
//! Key/value slots for resumable sync. The only slot the mirror uses today
//! is [`STREAM_ID_KEY`], the last acknowledged stream position.
//!
//! Writes are upserts, so the slot holds at most one value and the latest
//! write wins.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Key of the stream checkpoint slot.
pub const STREAM_ID_KEY: &str = "stream_id";

/// Repository for the `sync_state` table.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    /// Creates a new SyncStateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    /// Reads a slot. `None` if it has never been written.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Writes a slot, replacing any previous value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value, updated_at)
            VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        debug!(key, value, "Sync state updated");
        Ok(())
    }

    /// Last saved stream position.
    pub async fn get_stream_id(&self) -> DbResult<Option<String>> {
        self.get(STREAM_ID_KEY).await
    }

    /// Saves the stream position.
    pub async fn set_stream_id(&self, stream_id: &str) -> DbResult<()> {
        self.set(STREAM_ID_KEY, stream_id).await
    }
}
