//! # dnslog-sync: Sync Engine for the DNS Log Mirror
//!
//! Mirrors a NextDNS profile's query log into the local database, exactly
//! once per event, over either of the two protocols the API offers.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                SyncOrchestrator (owns SyncSession)               │  │
//! │  │                                                                  │  │
//! │  │  checkpoint present → STREAM (retry with backoff)                │  │
//! │  │  checkpoint absent  → BATCH  (once)                              │  │
//! │  └───────────────┬──────────────────────────────┬───────────────────┘  │
//! │                  ▼                              ▼                       │
//! │  ┌────────────────────────────┐  ┌────────────────────────────────┐    │
//! │  │       BatchFetcher         │  │        StreamConsumer          │    │
//! │  │                            │  │                                │    │
//! │  │ Cursor pages newest-first  │  │ id:/data: lines from position  │    │
//! │  │ Saves first page stream id │  │ Checkpoint every N inserts     │    │
//! │  │ Stops when caught up       │  │ Watchdog heartbeat             │    │
//! │  └──────────────┬─────────────┘  └───────────────┬────────────────┘    │
//! │                 │                                │                      │
//! │                 ▼                                ▼                      │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ LogSource (NextDnsClient)  RecordStore        PositionStore      │  │
//! │  │ reqwest                    EventRepository    SyncStateRepository│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Shutdown (watch channel) reaches every wait: page request, page       │
//! │  delay, stream read, reconnect backoff.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`orchestrator`] - Protocol choice and stream retry loop
//! - [`batch`] - Paginated backfill
//! - [`stream`] - Live feed consumer and watchdog
//! - [`session`] - Per-run counters and reconnect backoff
//! - [`client`] - `LogSource` trait and the NextDNS HTTP client
//! - [`store`] - Record and position store traits
//! - [`config`] - Configuration (TOML + env + flags)
//! - [`shutdown`] - Cancellation signal
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnslog_sync::{shutdown, ConfigOverrides, SyncConfig, SyncOrchestrator};
//! use dnslog_db::{Database, DbConfig};
//!
//! let config = SyncConfig::load(None, &ConfigOverrides::default())?;
//! let db = Database::new(DbConfig::new(config.database_path().unwrap())).await?;
//!
//! let (handle, signal) = shutdown::channel();
//! let mut orchestrator = SyncOrchestrator::from_config(&config, &db, signal)?;
//! let report = orchestrator.run().await?;
//! println!("{} events inserted via {}", report.totals.inserted, report.mode);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod shutdown;
pub mod store;
pub mod stream;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use batch::{BatchFetcher, BatchOutcome, BatchTermination};
pub use client::{LogSource, NextDnsClient};
pub use config::{ConfigOverrides, SyncConfig, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{SyncMode, SyncOrchestrator, SyncReport};
pub use session::{RunStats, SyncSession};
pub use shutdown::{Shutdown, ShutdownHandle};
pub use store::{PositionStore, RecordStore};
pub use stream::{StreamConsumer, StreamEnd};
