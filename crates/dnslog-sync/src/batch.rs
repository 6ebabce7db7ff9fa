//! # Batch Fetcher
//!
//! Walks the paginated log from newest to oldest, storing every event,
//! until it reaches events it already has or history runs out.
//!
//! ## Page Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Batch Fetch Flow                                 │
//! │                                                                         │
//! │  cursor = none                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  fetch_page(cursor) ──error──► abort run, return error                 │
//! │       │                                                                 │
//! │       ├── first page with meta.stream.id? ──► save position NOW        │
//! │       │                                                                 │
//! │       ├── page empty? ─────────────────────► Exhausted                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  put(identity, event) for each event                                   │
//! │       │                                                                 │
//! │       ├── every event a duplicate? ────────► CaughtUp                  │
//! │       ├── no next cursor? ─────────────────► Exhausted                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sleep(page_delay) ──shutdown──► Cancelled                             │
//! │       │                                                                 │
//! │       └──► fetch_page(next cursor) ...                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stream id is saved before the first page is processed so that a run
//! interrupted mid-backfill still resumes on the live feed next time.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::LogSource;
use crate::error::SyncResult;
use crate::session::{RunStats, SyncSession};
use crate::shutdown::Shutdown;
use crate::store::{PositionStore, RecordStore};
use dnslog_core::{LogPage, Position};

// =============================================================================
// Outcome
// =============================================================================

/// Why a batch run stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTermination {
    /// A non-empty page held only events already stored.
    CaughtUp,
    /// An empty page or an empty cursor: no older history.
    Exhausted,
    /// Shutdown was requested.
    Cancelled,
}

/// Result of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Pages received.
    pub pages: u32,
    /// Stream position discovered on the first page.
    pub stream_id: Option<Position>,
    pub termination: BatchTermination,
}

// =============================================================================
// Batch Fetcher
// =============================================================================

/// One backfill pass over the paginated log.
pub struct BatchFetcher<'a> {
    source: &'a dyn LogSource,
    records: &'a dyn RecordStore,
    positions: &'a dyn PositionStore,
    page_delay: Duration,
    shutdown: Shutdown,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(
        source: &'a dyn LogSource,
        records: &'a dyn RecordStore,
        positions: &'a dyn PositionStore,
        page_delay: Duration,
        shutdown: Shutdown,
    ) -> Self {
        BatchFetcher {
            source,
            records,
            positions,
            page_delay,
            shutdown,
        }
    }

    /// Runs until caught up, exhausted, cancelled, or a request fails.
    ///
    /// Counters of every page processed are folded into `session`, also
    /// when a later page fails.
    pub async fn run(&self, session: &mut SyncSession) -> SyncResult<BatchOutcome> {
        let mut cursor: Option<String> = None;
        let mut outcome = BatchOutcome {
            pages: 0,
            stream_id: None,
            termination: BatchTermination::Exhausted,
        };

        loop {
            let page = tokio::select! {
                page = self.source.fetch_page(cursor.as_deref()) => page?,
                _ = self.shutdown.triggered() => {
                    info!(pages = outcome.pages, "Batch fetch cancelled");
                    outcome.termination = BatchTermination::Cancelled;
                    return Ok(outcome);
                }
            };
            outcome.pages += 1;

            if outcome.pages == 1 {
                outcome.stream_id = self.save_stream_id(&page).await;
            }

            if page.is_empty() {
                info!(pages = outcome.pages, "Reached end of history");
                return Ok(outcome);
            }

            let stats = self.store_page(&page).await;
            session.absorb(stats);

            info!(
                page = outcome.pages,
                events = page.len(),
                inserted = stats.inserted,
                duplicates = stats.duplicates,
                skipped = stats.skipped,
                "Processed page"
            );

            if stats.duplicates == page.len() as u64 {
                info!(pages = outcome.pages, "Caught up with stored events");
                outcome.termination = BatchTermination::CaughtUp;
                return Ok(outcome);
            }

            match page.next_cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => {
                    info!(pages = outcome.pages, "No more pages");
                    return Ok(outcome);
                }
            }

            if !self.shutdown.sleep(self.page_delay).await {
                info!(pages = outcome.pages, "Batch fetch cancelled");
                outcome.termination = BatchTermination::Cancelled;
                return Ok(outcome);
            }
        }
    }

    /// Saves the first page's stream id, if any. A failed write is only
    /// logged; the token is still returned.
    async fn save_stream_id(&self, page: &LogPage) -> Option<Position> {
        let position = page.stream_position()?;

        match self.positions.save(&position).await {
            Ok(()) => info!(stream_id = %position, "Saved stream position from first page"),
            Err(e) => warn!(error = %e, stream_id = %position, "Failed to save stream position"),
        }
        Some(position)
    }

    async fn store_page(&self, page: &LogPage) -> RunStats {
        let mut stats = RunStats::default();

        for event in page.events() {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed event");
                    stats.record_skipped();
                    continue;
                }
            };

            let id = event.identity();
            match self.records.put(&id, &event).await {
                Ok(outcome) => {
                    debug!(id = %id, ?outcome, "Stored page event");
                    stats.record(outcome);
                }
                Err(e) => {
                    warn!(error = %e, id = %id, "Failed to store event, skipping");
                    stats.record_skipped();
                }
            }
        }

        stats
    }
}
