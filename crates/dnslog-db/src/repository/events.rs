//! # Event Repository
//!
//! Idempotent storage of mirrored DNS events.
//!
//! ## Insert-or-Ignore
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Idempotent Insert                                    │
//! │                                                                         │
//! │  insert_or_ignore(identity, event)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO dns_logs (id, ...) VALUES (?1, ...)                       │
//! │  ON CONFLICT(id) DO NOTHING                                            │
//! │       │                                                                 │
//! │       ├── rows_affected = 1 ──► InsertOutcome::Inserted                │
//! │       └── rows_affected = 0 ──► InsertOutcome::Duplicate               │
//! │                                                                         │
//! │  The PRIMARY KEY is the only mutual exclusion: a second process        │
//! │  inserting the same identity simply observes Duplicate.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use dnslog_core::{Device, DnsEvent, EventId};

// =============================================================================
// Insert Outcome
// =============================================================================

/// Result of an insert-or-ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row with the same identity already existed; nothing changed.
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

// =============================================================================
// Stored Event
// =============================================================================

/// An event read back from `dns_logs`.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: EventId,
    pub event: DnsEvent,
    /// Server-side insertion time (UTC).
    pub created_at: NaiveDateTime,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    timestamp: DateTime<Utc>,
    domain: String,
    record_type: Option<String>,
    status: Option<String>,
    blocked: bool,
    client_ip: Option<String>,
    protocol: Option<String>,
    device: Option<String>,
    root: Option<String>,
    tracker: Option<String>,
    encrypted: bool,
    created_at: NaiveDateTime,
}

impl TryFrom<EventRow> for StoredEvent {
    type Error = DbError;

    fn try_from(row: EventRow) -> DbResult<Self> {
        let device = match row.device {
            Some(text) => {
                let value: Value =
                    serde_json::from_str(&text).map_err(|e| DbError::corrupt("device", e))?;
                Device::from_value(value)
            }
            None => Device::Absent,
        };

        Ok(StoredEvent {
            id: EventId::from_stored(row.id),
            event: DnsEvent {
                timestamp: row.timestamp,
                domain: row.domain,
                record_type: row.record_type.unwrap_or_default(),
                status: row.status.unwrap_or_default(),
                blocked: row.blocked,
                client_ip: row.client_ip.unwrap_or_default(),
                protocol: row.protocol.unwrap_or_default(),
                device,
                root: row.root.unwrap_or_default(),
                tracker: row.tracker.unwrap_or_default(),
                encrypted: row.encrypted,
            },
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the `dns_logs` table.
#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    /// Creates a new EventRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EventRepository { pool }
    }

    /// Stores an event under the given identity unless one already exists.
    ///
    /// A duplicate is a normal outcome, never an error. Errors are only
    /// returned when the statement itself fails.
    pub async fn insert_or_ignore(&self, id: &EventId, event: &DnsEvent) -> DbResult<InsertOutcome> {
        let device = event.device.to_json().map(|value| value.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO dns_logs (
                id, timestamp, domain, type, status, blocked,
                client_ip, protocol, device, root, tracker, encrypted
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11, ?12
            )
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.as_str())
        .bind(event.timestamp)
        .bind(&event.domain)
        .bind(&event.record_type)
        .bind(&event.status)
        .bind(event.blocked)
        .bind(&event.client_ip)
        .bind(&event.protocol)
        .bind(device)
        .bind(&event.root)
        .bind(&event.tracker)
        .bind(event.encrypted)
        .execute(&self.pool)
        .await?;

        let outcome = if result.rows_affected() == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        };

        debug!(id = %id, ?outcome, "Stored event");
        Ok(outcome)
    }

    /// Loads one event by identity.
    pub async fn get(&self, id: &EventId) -> DbResult<Option<StoredEvent>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT
                id, timestamp, domain, type AS record_type, status, blocked,
                client_ip, protocol, device, root, tracker, encrypted, created_at
            FROM dns_logs
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredEvent::try_from).transpose()
    }

    /// Returns true if an event with this identity is stored.
    pub async fn exists(&self, id: &EventId) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM dns_logs WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    /// Counts stored events.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dns_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Timestamp of the newest stored event, if any.
    pub async fn latest_timestamp(&self) -> DbResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT timestamp FROM dns_logs ORDER BY timestamp DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(latest)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
