//! # Store Traits
//!
//! The engine writes through two narrow traits so it can run against the
//! SQLite repositories in production and in-memory fakes in tests.
//!
//! ```text
//! BatchFetcher / StreamConsumer
//!        │                    │
//!        ▼                    ▼
//!   RecordStore          PositionStore
//!   put(id, event)       load() / save(position)
//!        │                    │
//!        ▼                    ▼
//!   EventRepository      SyncStateRepository     (dnslog-db)
//! ```

use async_trait::async_trait;

use dnslog_core::{DnsEvent, EventId, Position};
use dnslog_db::{DbResult, EventRepository, InsertOutcome, SyncStateRepository};

/// Idempotent event storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Stores `event` under `id` unless already present. A duplicate is
    /// reported, never raised.
    async fn put(&self, id: &EventId, event: &DnsEvent) -> DbResult<InsertOutcome>;
}

/// The single resumable-position slot.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Last saved position, `None` if never written.
    async fn load(&self) -> DbResult<Option<Position>>;

    /// Replaces the saved position.
    async fn save(&self, position: &Position) -> DbResult<()>;
}

#[async_trait]
impl RecordStore for EventRepository {
    async fn put(&self, id: &EventId, event: &DnsEvent) -> DbResult<InsertOutcome> {
        self.insert_or_ignore(id, event).await
    }
}

#[async_trait]
impl PositionStore for SyncStateRepository {
    async fn load(&self) -> DbResult<Option<Position>> {
        // A blank stored value is treated as never written.
        Ok(self.get_stream_id().await?.and_then(Position::new))
    }

    async fn save(&self, position: &Position) -> DbResult<()> {
        self.set_stream_id(position.as_str()).await
    }
}
