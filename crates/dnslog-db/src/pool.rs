//! # Database Handle
//!
//! Opens the mirror's SQLite file and hands out repositories.
//!
//! ## Opening
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Database::new                                  │
//! │                                                                         │
//! │  DbConfig ──► Location::File(path)   create file, WAL, busy timeout    │
//! │          └──► Location::Memory       one pinned connection (tests)     │
//! │                         │                                               │
//! │                         ▼                                               │
//! │                 SqlitePool ──► migrations (unless disabled)            │
//! │                         │                                               │
//! │          ┌──────────────┴──────────────┐                               │
//! │          ▼                             ▼                               │
//! │   db.events()                   db.sync_state()                        │
//! │   insert-or-ignore per event    stream_id checkpoint                   │
//! │                                                                         │
//! │  Any failure here surfaces before the agent touches the network.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one retrieval path writes at a time. WAL lets outside readers
//! (`sqlite3` shells, dashboards) query the file while the mirror runs.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::events::EventRepository;
use crate::repository::sync_state::SyncStateRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Where the mirror lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// Private database that disappears with the handle.
    Memory,
}

/// How to open the mirror database.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/dnslog/dnslog.db")
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: Location,

    /// Pool size for file databases. Default: 2
    pub pool_size: u32,

    /// How long a write waits on a lock held by an outside process.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Apply pending migrations when opening. Default: true
    pub migrate: bool,
}

impl DbConfig {
    /// File-backed database; the file and its parent must be writable.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: Location::File(path.into()),
            pool_size: 2,
            busy_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }

    /// Fresh, isolated in-memory database.
    pub fn in_memory() -> Self {
        DbConfig {
            location: Location::Memory,
            pool_size: 1,
            busy_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn migrate(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = match &self.location {
            Location::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                // The last commit may be lost on power failure; the next run
                // fetches it again and dedups by identity.
                .synchronous(SqliteSynchronous::Normal),
            Location::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?,
        };
        Ok(options.busy_timeout(self.busy_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        match self.location {
            Location::File(_) => SqlitePoolOptions::new().max_connections(self.pool_size),
            // Every connection to :memory: is its own database, so the pool
            // holds exactly one and never recycles it.
            Location::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Open mirror database. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database and applies migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        match &config.location {
            Location::File(path) => info!(path = %path.display(), "Opening database"),
            Location::Memory => debug!("Opening in-memory database"),
        }

        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let db = Database { pool };
        if config.migrate {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Idempotent; applied versions are tracked by sqlx.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await?;
        debug!("Schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> EventRepository {
        EventRepository::new(self.pool.clone())
    }

    pub fn sync_state(&self) -> SyncStateRepository {
        SyncStateRepository::new(self.pool.clone())
    }

    /// Waits for in-flight statements, then closes every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Database closed");
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
