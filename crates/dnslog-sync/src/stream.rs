//! # Stream Consumer
//!
//! Follows the live log feed from a saved position, storing each event and
//! checkpointing the feed position as it goes.
//!
//! ## Line Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stream Line Protocol                               │
//! │                                                                         │
//! │  id: 1714557600123-0    ──► latest position = token (nothing stored)   │
//! │  data: {"domain":...}   ──► decode ─► identity ─► put()                │
//! │                               │                     │                   │
//! │                               └─ malformed: skip    ├─ Inserted         │
//! │                                                     │   every Nth ──►   │
//! │                                                     │   save(latest)    │
//! │                                                     └─ Duplicate        │
//! │  <blank> / :comment / other ──► ignored                                │
//! │                                                                         │
//! │  On exit (clean end, error or shutdown):                               │
//! │     latest != last saved ──► save(latest)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Watchdog
//! A heartbeat task logs lines read, events inserted and time since the
//! last line. It only reads shared atomics and is aborted when the read
//! loop exits, so exactly one runs per invocation.

use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::LogSource;
use crate::error::SyncResult;
use crate::session::{RunStats, SyncSession};
use crate::shutdown::Shutdown;
use crate::store::{PositionStore, RecordStore};
use dnslog_core::{DnsEvent, LineFramer, Position, StreamLine};
use dnslog_db::InsertOutcome;

// =============================================================================
// Outcome
// =============================================================================

/// How a stream invocation ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the feed.
    Closed,
    /// Shutdown was requested.
    Cancelled,
}

// =============================================================================
// Liveness Counters
// =============================================================================

/// Progress shared between the read loop and the watchdog.
#[derive(Debug)]
pub struct StreamCounters {
    started: Instant,
    lines: AtomicU64,
    inserted: AtomicU64,
    /// Milliseconds after `started` of the last line.
    last_line_ms: AtomicU64,
    heartbeats: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        StreamCounters {
            started: Instant::now(),
            lines: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
            last_line_ms: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
        }
    }

    fn line_read(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
        let now = self.started.elapsed().as_millis() as u64;
        self.last_line_ms.store(now, Ordering::Relaxed);
    }

    fn event_inserted(&self) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn inserted(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    /// Time since the last line, or since opening if none arrived yet.
    pub fn idle(&self) -> Duration {
        let last = Duration::from_millis(self.last_line_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

impl Default for StreamCounters {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Watchdog
// =============================================================================

/// Periodic liveness report for one stream invocation.
///
/// Aborted by [`Watchdog::stop`] or on drop.
pub struct Watchdog {
    handle: JoinHandle<()>,
}

impl Watchdog {
    pub fn spawn(counters: Arc<StreamCounters>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                counters.heartbeats.fetch_add(1, Ordering::Relaxed);
                info!(
                    lines = counters.lines(),
                    inserted = counters.inserted(),
                    idle_secs = counters.idle().as_secs(),
                    "Stream alive"
                );
            }
        });
        Watchdog { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =============================================================================
// Stream Consumer
// =============================================================================

/// Read-loop state that outlives a failed read.
struct Progress {
    latest: Position,
    saved: Position,
    since_checkpoint: u32,
    stats: RunStats,
}

/// One invocation of the live feed.
pub struct StreamConsumer<'a> {
    source: &'a dyn LogSource,
    records: &'a dyn RecordStore,
    positions: &'a dyn PositionStore,
    checkpoint_every: u32,
    heartbeat_interval: Duration,
    shutdown: Shutdown,
}

impl<'a> StreamConsumer<'a> {
    pub fn new(
        source: &'a dyn LogSource,
        records: &'a dyn RecordStore,
        positions: &'a dyn PositionStore,
        checkpoint_every: u32,
        heartbeat_interval: Duration,
        shutdown: Shutdown,
    ) -> Self {
        StreamConsumer {
            source,
            records,
            positions,
            checkpoint_every: checkpoint_every.max(1),
            heartbeat_interval,
            shutdown,
        }
    }

    /// Consumes the feed opened at `position` until it ends, fails, or
    /// shutdown is requested.
    ///
    /// `position` is assumed to be the saved checkpoint. Whatever the exit
    /// path, the newest position seen is saved if it moved, and the run's
    /// counters are folded into `session`.
    pub async fn run(&self, position: &Position, session: &mut SyncSession) -> SyncResult<StreamEnd> {
        let counters = Arc::new(StreamCounters::new());
        let watchdog = Watchdog::spawn(counters.clone(), self.heartbeat_interval);

        let mut progress = Progress {
            latest: position.clone(),
            saved: position.clone(),
            since_checkpoint: 0,
            stats: RunStats::default(),
        };

        let result = self.read_loop(position, &mut progress, &counters).await;
        watchdog.stop();

        if progress.latest != progress.saved {
            self.checkpoint(&mut progress).await;
        }

        let stats = progress.stats;
        session.absorb(stats);

        match &result {
            Ok(end) => info!(
                ?end,
                lines = stats.lines,
                inserted = stats.inserted,
                duplicates = stats.duplicates,
                skipped = stats.skipped,
                "Stream ended"
            ),
            Err(e) => warn!(
                error = %e,
                lines = stats.lines,
                inserted = stats.inserted,
                "Stream failed"
            ),
        }
        result
    }

    async fn read_loop(
        &self,
        position: &Position,
        progress: &mut Progress,
        counters: &StreamCounters,
    ) -> SyncResult<StreamEnd> {
        let mut chunks = tokio::select! {
            opened = self.source.open_stream(position) => opened?,
            _ = self.shutdown.triggered() => return Ok(StreamEnd::Cancelled),
        };
        info!(position = %position, "Connected to log stream");

        let mut framer = LineFramer::default();
        loop {
            let chunk = tokio::select! {
                chunk = chunks.next() => chunk,
                _ = self.shutdown.triggered() => return Ok(StreamEnd::Cancelled),
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for line in framer.push(&bytes)? {
                        self.handle_line(&line, progress, counters).await;
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if let Some(line) = framer.finish()? {
                        self.handle_line(&line, progress, counters).await;
                    }
                    return Ok(StreamEnd::Closed);
                }
            }
        }
    }

    async fn handle_line(&self, line: &str, progress: &mut Progress, counters: &StreamCounters) {
        progress.stats.lines += 1;
        counters.line_read();

        match StreamLine::parse(line) {
            StreamLine::Id(token) => {
                if let Some(position) = Position::new(token) {
                    debug!(position = %position, "Received event ID");
                    progress.latest = position;
                }
            }
            StreamLine::Data(payload) => self.handle_event(payload, progress, counters).await,
            StreamLine::Blank | StreamLine::Other(_) => {}
        }
    }

    async fn handle_event(&self, payload: &str, progress: &mut Progress, counters: &StreamCounters) {
        let event = match DnsEvent::from_json(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping malformed stream event");
                progress.stats.record_skipped();
                return;
            }
        };

        let id = event.identity();
        match self.records.put(&id, &event).await {
            Ok(InsertOutcome::Inserted) => {
                progress.stats.record(InsertOutcome::Inserted);
                counters.event_inserted();
                debug!(domain = %event.domain, status = %event.status, "Inserted stream event");

                progress.since_checkpoint += 1;
                if progress.since_checkpoint >= self.checkpoint_every {
                    progress.since_checkpoint = 0;
                    self.checkpoint(progress).await;
                }
            }
            Ok(InsertOutcome::Duplicate) => {
                progress.stats.record(InsertOutcome::Duplicate);
                debug!(domain = %event.domain, "Duplicate stream event");
            }
            Err(e) => {
                warn!(error = %e, id = %id, "Failed to store stream event, skipping");
                progress.stats.record_skipped();
            }
        }
    }

    /// Saves the latest position. Failure is a warning; `saved` then keeps
    /// its old value so the exit path tries again.
    async fn checkpoint(&self, progress: &mut Progress) {
        match self.positions.save(&progress.latest).await {
            Ok(()) => {
                info!(position = %progress.latest, "Updated stream checkpoint");
                progress.saved = progress.latest.clone();
            }
            Err(e) => warn!(error = %e, position = %progress.latest, "Failed to save stream checkpoint"),
        }
    }
}
