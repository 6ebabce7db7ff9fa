//! # dnslog-db: Database Layer for the DNS Log Mirror
//!
//! SQLite storage for mirrored events and the stream checkpoint, through
//! sqlx with embedded migrations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        dnslog Data Flow                                 │
//! │                                                                         │
//! │  dnslog-sync (BatchFetcher / StreamConsumer)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     dnslog-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌─────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories   │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                 │   │  (embedded)  │  │   │
//! │  │   │               │    │ EventRepository │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SyncStateRepo   │   │ 001_initial  │  │   │
//! │  │   └───────────────┘    └─────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  dnslog.db (local file, WAL mode)                                      │
//! │    dns_logs   - one row per event, PRIMARY KEY = identity              │
//! │    sync_state - single 'stream_id' checkpoint row                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pool`] - Opening the database (file or in-memory)
//! - [`migrations`] - Embedded SQL migrations
//! - [`error`] - Database error types
//! - [`repository`] - Event and checkpoint repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnslog_db::{Database, DbConfig, InsertOutcome};
//!
//! let db = Database::new(DbConfig::new("dnslog.db")).await?;
//!
//! let outcome = db.events().insert_or_ignore(&event.identity(), &event).await?;
//! if outcome == InsertOutcome::Duplicate {
//!     // already mirrored
//! }
//!
//! db.sync_state().set_stream_id("1714557600123-0").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, Location};

pub use repository::events::{EventRepository, InsertOutcome, StoredEvent};
pub use repository::sync_state::{SyncStateRepository, STREAM_ID_KEY};
