//! # Sync Orchestrator
//!
//! Chooses the retrieval protocol from the saved checkpoint and drives it.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Orchestrator States                                │
//! │                                                                         │
//! │                  load checkpoint                                       │
//! │              (read failure = absent)                                   │
//! │                 │               │                                       │
//! │          present│               │absent                                 │
//! │                 ▼               ▼                                       │
//! │         ┌─────────────┐   ┌─────────────┐                              │
//! │   ┌────►│   STREAM    │   │    BATCH    │                              │
//! │   │     └──────┬──────┘   └──────┬──────┘                              │
//! │   │            │                 │                                      │
//! │   │   closed / │ error           ├── ok (any termination) ──► done     │
//! │   │  cancelled │   │             └── error ──────────────────► fatal   │
//! │   │      │     │   ▼                                                    │
//! │   │      ▼     │ BACKOFF (1s, 2s, 4s ... 60s, never reset)             │
//! │   │    done    │   │                                                    │
//! │   │            │   ▼                                                    │
//! │   └────────────┴ reload checkpoint (keep previous if unreadable)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A batch run never hands over to the stream within the same process; the
//! stream id it saved is picked up by the next run.

use std::sync::Arc;
use tracing::{info, warn};

use crate::batch::{BatchFetcher, BatchTermination};
use crate::client::{LogSource, NextDnsClient};
use crate::config::{SyncConfig, SyncSettings};
use crate::error::SyncResult;
use crate::session::{RunStats, SyncSession};
use crate::shutdown::Shutdown;
use crate::store::{PositionStore, RecordStore};
use crate::stream::{StreamConsumer, StreamEnd};
use dnslog_core::Position;
use dnslog_db::Database;

// =============================================================================
// Report
// =============================================================================

/// Retrieval protocol used by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Stream,
    Batch,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Stream => write!(f, "stream"),
            SyncMode::Batch => write!(f, "batch"),
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Session totals over all attempts.
    pub totals: RunStats,
    /// Retrieval attempts made (batch runs make one).
    pub attempts: u32,
    /// True if the run ended because shutdown was requested.
    pub cancelled: bool,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Top-level sync driver. Owns the session for its whole lifetime.
pub struct SyncOrchestrator {
    source: Arc<dyn LogSource>,
    records: Arc<dyn RecordStore>,
    positions: Arc<dyn PositionStore>,
    settings: SyncSettings,
    shutdown: Shutdown,
    session: SyncSession,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn LogSource>,
        records: Arc<dyn RecordStore>,
        positions: Arc<dyn PositionStore>,
        settings: SyncSettings,
        shutdown: Shutdown,
    ) -> Self {
        let session = SyncSession::new(settings.initial_backoff(), settings.max_backoff());
        SyncOrchestrator {
            source,
            records,
            positions,
            settings,
            shutdown,
            session,
        }
    }

    /// Wires the NextDNS client and the SQLite repositories.
    pub fn from_config(config: &SyncConfig, db: &Database, shutdown: Shutdown) -> SyncResult<Self> {
        let client = NextDnsClient::new(config)?;
        Ok(Self::new(
            Arc::new(client),
            Arc::new(db.events()),
            Arc::new(db.sync_state()),
            config.sync.clone(),
            shutdown,
        ))
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    /// Runs one sync.
    ///
    /// ## Returns
    /// * `Ok(SyncReport)` - stream ended or was cancelled, or batch finished
    /// * `Err(SyncError)` - batch request failed (stream errors are retried)
    pub async fn run(&mut self) -> SyncResult<SyncReport> {
        match self.load_checkpoint().await {
            Some(position) => {
                info!(position = %position, "Resuming from saved position, using stream");
                self.run_stream(position).await
            }
            None => {
                info!("No saved position, backfilling with batch fetch");
                self.run_batch().await
            }
        }
    }

    async fn run_stream(&mut self, mut position: Position) -> SyncResult<SyncReport> {
        loop {
            let attempt = self.session.begin_attempt();
            info!(attempt, position = %position, "Starting stream attempt");

            let consumer = StreamConsumer::new(
                self.source.as_ref(),
                self.records.as_ref(),
                self.positions.as_ref(),
                self.settings.checkpoint_every,
                self.settings.heartbeat_interval(),
                self.shutdown.clone(),
            );

            let err = match consumer.run(&position, &mut self.session).await {
                Ok(StreamEnd::Closed) => {
                    info!(attempt, "Stream closed cleanly");
                    return Ok(self.report(SyncMode::Stream, false));
                }
                Ok(StreamEnd::Cancelled) => return Ok(self.report(SyncMode::Stream, true)),
                Err(e) => e,
            };

            let delay = self.session.next_backoff();
            warn!(
                error = %err,
                retryable = err.is_retryable(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Stream failed, reconnecting after backoff"
            );

            if !self.shutdown.sleep(delay).await {
                info!("Shutdown during backoff");
                return Ok(self.report(SyncMode::Stream, true));
            }

            if let Some(latest) = self.load_checkpoint().await {
                position = latest;
            }
        }
    }

    async fn run_batch(&mut self) -> SyncResult<SyncReport> {
        let attempt = self.session.begin_attempt();

        let fetcher = BatchFetcher::new(
            self.source.as_ref(),
            self.records.as_ref(),
            self.positions.as_ref(),
            self.settings.page_delay(),
            self.shutdown.clone(),
        );

        let outcome = fetcher.run(&mut self.session).await?;
        let totals = self.session.totals();
        info!(
            attempt,
            pages = outcome.pages,
            termination = ?outcome.termination,
            stream_id = ?outcome.stream_id.as_ref().map(Position::as_str),
            inserted = totals.inserted,
            duplicates = totals.duplicates,
            "Batch fetch finished"
        );

        let cancelled = outcome.termination == BatchTermination::Cancelled;
        Ok(self.report(SyncMode::Batch, cancelled))
    }

    /// Reads the checkpoint; an unreadable one counts as absent.
    async fn load_checkpoint(&self) -> Option<Position> {
        match self.positions.load().await {
            Ok(position) => position,
            Err(e) => {
                warn!(error = %e, "Failed to read stream checkpoint");
                None
            }
        }
    }

    fn report(&self, mode: SyncMode, cancelled: bool) -> SyncReport {
        SyncReport {
            mode,
            totals: self.session.totals(),
            attempts: self.session.attempts(),
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::testing::{
        data_frame, event, page, MemoryPositions, MemoryRecords, ScriptedSource, StreamScript,
    };
    use dnslog_db::DbConfig;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Harness {
        source: Arc<ScriptedSource>,
        records: Arc<MemoryRecords>,
        positions: Arc<MemoryPositions>,
    }

    impl Harness {
        fn new(source: ScriptedSource, records: MemoryRecords, positions: MemoryPositions) -> Self {
            Harness {
                source: Arc::new(source),
                records: Arc::new(records),
                positions: Arc::new(positions),
            }
        }

        fn orchestrator(&self, shutdown: Shutdown) -> SyncOrchestrator {
            SyncOrchestrator::new(
                self.source.clone(),
                self.records.clone(),
                self.positions.clone(),
                SyncSettings::default(),
                shutdown,
            )
        }
    }

    fn reset() -> SyncError {
        SyncError::StreamRead("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_checkpoint_backfills() {
        let events = [event("a.example", 1), event("b.example", 2), event("c.example", 3)];
        let h = Harness::new(
            ScriptedSource::with_pages(vec![Ok(page(&events, Some(""), Some("abc")))]),
            MemoryRecords::default(),
            MemoryPositions::default(),
        );

        let report = h.orchestrator(Shutdown::never()).run().await.unwrap();

        assert_eq!(report.mode, SyncMode::Batch);
        assert_eq!(report.totals.inserted, 3);
        assert_eq!(report.attempts, 1);
        assert!(!report.cancelled);
        assert_eq!(h.records.len(), 3);
        assert_eq!(h.positions.current().as_deref(), Some("abc"));
        // Batch never hands over to the stream in the same run
        assert!(h.source.stream_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_backs_off_and_resumes_from_new_position() {
        let first = format!("id: xyz\n{}", data_frame(&event("a.example", 1)));
        let h = Harness::new(
            ScriptedSource::with_streams(vec![
                StreamScript::fails_after(first, reset()),
                StreamScript::closes(""),
            ]),
            MemoryRecords::default(),
            MemoryPositions::at("abc"),
        );

        let start = Instant::now();
        let report = h.orchestrator(Shutdown::never()).run().await.unwrap();

        assert_eq!(report.mode, SyncMode::Stream);
        assert_eq!(report.attempts, 2);
        assert_eq!(report.totals.inserted, 1);
        assert_eq!(h.positions.current().as_deref(), Some("xyz"));
        assert_eq!(
            h.source.stream_requests(),
            vec!["abc".to_string(), "xyz".to_string()]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_across_failures() {
        let h = Harness::new(
            ScriptedSource::with_streams(vec![
                StreamScript::Refuse(SyncError::ConnectionFailed("refused".into())),
                StreamScript::Refuse(SyncError::ConnectionFailed("refused".into())),
                StreamScript::Refuse(SyncError::HttpStatus {
                    status: 503,
                    url: "/stream".into(),
                }),
                StreamScript::closes(""),
            ]),
            MemoryRecords::default(),
            MemoryPositions::at("abc"),
        );

        let start = Instant::now();
        let mut orchestrator = h.orchestrator(Shutdown::never());
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.attempts, 4);
        // 1s + 2s + 4s
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(
            orchestrator.session().current_delay(),
            Some(Duration::from_secs(4))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_checkpoint_on_retry_keeps_previous() {
        let first = format!("id: xyz\n{}", data_frame(&event("a.example", 1)));
        let h = Harness::new(
            ScriptedSource::with_streams(vec![
                StreamScript::fails_after(first, reset()),
                StreamScript::closes(""),
            ]),
            MemoryRecords::default(),
            MemoryPositions::at("abc"),
        );

        // Let the initial read succeed, then break reads before the retry
        let positions = h.positions.clone();
        let mut orchestrator = h.orchestrator(Shutdown::never());
        let run = orchestrator.run();
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => panic!("should be backing off"),
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
        positions.fail_reads(true);

        let report = run.await.unwrap();
        assert_eq!(report.attempts, 2);
        // Previous position in memory is "abc"; the saved "xyz" could not be read
        assert_eq!(
            h.source.stream_requests(),
            vec!["abc".to_string(), "abc".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_checkpoint_at_start_means_batch() {
        let positions = MemoryPositions::at("abc");
        positions.fail_reads(true);
        let h = Harness::new(
            ScriptedSource::with_pages(vec![Ok(page(&[], None, None))]),
            MemoryRecords::default(),
            positions,
        );

        let report = h.orchestrator(Shutdown::never()).run().await.unwrap();
        assert_eq!(report.mode, SyncMode::Batch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_failure_is_fatal() {
        let h = Harness::new(
            ScriptedSource::with_pages(vec![Err(SyncError::HttpStatus {
                status: 403,
                url: "/profiles/abc123/logs".into(),
            })]),
            MemoryRecords::default(),
            MemoryPositions::default(),
        );

        let err = h.orchestrator(Shutdown::never()).run().await.unwrap_err();
        assert!(matches!(err, SyncError::HttpStatus { status: 403, .. }));
        assert_eq!(h.source.page_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caught_up_first_page_changes_nothing() {
        let known: Vec<_> = (0..5).map(|i| event(&format!("k{i}.example"), i)).collect();
        let h = Harness::new(
            ScriptedSource::with_pages(vec![Ok(page(&known, Some("older"), None))]),
            MemoryRecords::seeded(&known),
            MemoryPositions::default(),
        );

        let report = h.orchestrator(Shutdown::never()).run().await.unwrap();

        assert_eq!(report.totals.inserted, 0);
        assert_eq!(report.totals.duplicates, 5);
        assert_eq!(h.positions.current(), None);
        assert_eq!(h.source.page_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff() {
        let h = Harness::new(
            ScriptedSource::with_streams(vec![StreamScript::Refuse(SyncError::Timeout(30))]),
            MemoryRecords::default(),
            MemoryPositions::at("abc"),
        );
        let (handle, shutdown) = crate::shutdown::channel();

        let mut orchestrator = h.orchestrator(shutdown);
        let run = orchestrator.run();
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => panic!("should be backing off"),
            _ = tokio::time::sleep(Duration::from_millis(300)) => {}
        }
        handle.trigger();

        let report = run.await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_streaming() {
        let body = format!("id: p1\n{}", data_frame(&event("a.example", 1)));
        let h = Harness::new(
            ScriptedSource::with_streams(vec![StreamScript::hangs_after(body)]),
            MemoryRecords::default(),
            MemoryPositions::at("abc"),
        );
        let (handle, shutdown) = crate::shutdown::channel();

        let mut orchestrator = h.orchestrator(shutdown);
        let run = orchestrator.run();
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => panic!("stream should be open"),
            _ = tokio::time::sleep(Duration::from_secs(90)) => {}
        }
        handle.trigger();

        let report = run.await.unwrap();
        assert_eq!(report.mode, SyncMode::Stream);
        assert!(report.cancelled);
        assert_eq!(report.totals.inserted, 1);
        assert_eq!(h.positions.current().as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_sqlite_backfill_then_resume_on_stream() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let events = [event("a.example", 1), event("b.example", 2)];

        // First run: no checkpoint, backfill
        let mut first = SyncOrchestrator::new(
            Arc::new(ScriptedSource::with_pages(vec![Ok(page(&events, None, Some("abc")))])),
            Arc::new(db.events()),
            Arc::new(db.sync_state()),
            SyncSettings::default(),
            Shutdown::never(),
        );
        assert_eq!(first.run().await.unwrap().mode, SyncMode::Batch);
        assert_eq!(db.events().count().await.unwrap(), 2);

        // Second run: resumes on the stream; a replayed event dedups
        let body = format!(
            "id: p1\n{}id: p2\n{}",
            data_frame(&events[1]),
            data_frame(&event("c.example", 3))
        );
        let source = Arc::new(ScriptedSource::with_streams(vec![StreamScript::closes(body)]));
        let mut second = SyncOrchestrator::new(
            source.clone(),
            Arc::new(db.events()),
            Arc::new(db.sync_state()),
            SyncSettings::default(),
            Shutdown::never(),
        );
        let report = second.run().await.unwrap();

        assert_eq!(report.mode, SyncMode::Stream);
        assert_eq!(report.totals.inserted, 1);
        assert_eq!(report.totals.duplicates, 1);
        assert_eq!(source.stream_requests(), vec!["abc".to_string()]);
        assert_eq!(db.events().count().await.unwrap(), 3);
        assert_eq!(db.sync_state().get_stream_id().await.unwrap().as_deref(), Some("p2"));
    }
}
