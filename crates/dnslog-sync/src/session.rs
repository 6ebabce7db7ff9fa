//! # Sync Session
//!
//! In-memory bookkeeping for one orchestrator run. Nothing here is
//! persisted; a restart begins a fresh session from the saved checkpoint.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SyncOrchestrator ──owns──► SyncSession                                │
//! │       │                       ├── totals: RunStats                     │
//! │       │                       ├── attempt                              │
//! │       │                       ├── backoff: ReconnectBackoff            │
//! │       │                       └── last_activity                        │
//! │       │                                                                 │
//! │       ├── BatchFetcher::run(&mut session)   ─┐                          │
//! │       └── StreamConsumer::run(&mut session) ─┴─► session.absorb(stats)  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reconnect Backoff
//! ```text
//! Attempt 1 fails → wait 1s
//! Attempt 2 fails → wait 2s
//! ...               4s, 8s, 16s, 32s
//! Attempt 7+      → wait 60s (cap)
//! ```
//! The delay only grows within a run; a stream that ends cleanly ends the
//! run, so there is nothing to reset.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::ops::AddAssign;
use std::time::Duration;
use tokio::time::Instant;

use dnslog_db::InsertOutcome;

// =============================================================================
// Run Statistics
// =============================================================================

/// Counters for one retrieval invocation (or a whole session when summed).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Events encountered (pages or `data:` lines).
    pub seen: u64,
    /// Events newly stored.
    pub inserted: u64,
    /// Events already present.
    pub duplicates: u64,
    /// Events that could not be decoded or stored.
    pub skipped: u64,
    /// Stream lines read, including `id:` and blank lines.
    pub lines: u64,
}

impl RunStats {
    /// Counts one event and how storing it went.
    pub fn record(&mut self, outcome: InsertOutcome) {
        self.seen += 1;
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::Duplicate => self.duplicates += 1,
        }
    }

    /// Counts one event that was dropped.
    pub fn record_skipped(&mut self) {
        self.seen += 1;
        self.skipped += 1;
    }

    pub fn is_empty(&self) -> bool {
        *self == RunStats::default()
    }
}

impl AddAssign for RunStats {
    fn add_assign(&mut self, other: RunStats) {
        self.seen += other.seen;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.lines += other.lines;
    }
}

// =============================================================================
// Reconnect Backoff
// =============================================================================

/// Deterministic exponential delay: doubles from `initial` up to `max`.
pub struct ReconnectBackoff {
    inner: ExponentialBackoff,
    max: Duration,
}

impl std::fmt::Debug for ReconnectBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectBackoff")
            .field("next", &self.inner.current_interval)
            .field("max", &self.max)
            .finish()
    }
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let inner = ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: max,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None, // No limit on total time
            ..Default::default()
        };
        ReconnectBackoff { inner, max }
    }

    /// Returns the delay to wait now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.inner.next_backoff().unwrap_or(self.max);
        // The crate adds up to 1ns of jitter even with a zero factor.
        Duration::from_millis(delay.as_millis() as u64)
    }
}

// =============================================================================
// Sync Session
// =============================================================================

/// Ephemeral state of one orchestrator run.
#[derive(Debug)]
pub struct SyncSession {
    totals: RunStats,
    attempt: u32,
    backoff: ReconnectBackoff,
    current_delay: Option<Duration>,
    started_at: Instant,
    last_activity: Instant,
}

impl SyncSession {
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        let now = Instant::now();
        SyncSession {
            totals: RunStats::default(),
            attempt: 0,
            backoff: ReconnectBackoff::new(initial_backoff, max_backoff),
            current_delay: None,
            started_at: now,
            last_activity: now,
        }
    }

    /// Folds one invocation's counters into the session.
    pub fn absorb(&mut self, stats: RunStats) {
        if !stats.is_empty() {
            self.last_activity = Instant::now();
        }
        self.totals += stats;
    }

    /// Starts a new retrieval attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Delay before the next reconnect; grows on every call.
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.backoff.next_delay();
        self.current_delay = Some(delay);
        delay
    }

    pub fn totals(&self) -> RunStats {
        self.totals
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// The most recent backoff delay, if any failure happened.
    pub fn current_delay(&self) -> Option<Duration> {
        self.current_delay
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time since an invocation last reported any progress.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_delay().as_secs()).collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60, 60]);
    }

    #[test]
    fn test_backoff_respects_custom_bounds() {
        let mut backoff =
            ReconnectBackoff::new(Duration::from_millis(250), Duration::from_secs(1));
        let delays: Vec<u128> = (0..4).map(|_| backoff.next_delay().as_millis()).collect();

        assert_eq!(delays, vec![250, 500, 1000, 1000]);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut run = RunStats::default();
        run.record(InsertOutcome::Inserted);
        run.record(InsertOutcome::Inserted);
        run.record(InsertOutcome::Duplicate);
        run.record_skipped();
        run.lines = 9;

        let mut total = RunStats::default();
        total += run;
        total += run;

        assert_eq!(total.seen, 8);
        assert_eq!(total.inserted, 4);
        assert_eq!(total.duplicates, 2);
        assert_eq!(total.skipped, 2);
        assert_eq!(total.lines, 18);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_tracks_attempts_and_activity() {
        let mut session = SyncSession::new(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(session.begin_attempt(), 1);
        assert_eq!(session.begin_attempt(), 2);
        assert_eq!(session.current_delay(), None);

        assert_eq!(session.next_backoff(), Duration::from_secs(1));
        assert_eq!(session.next_backoff(), Duration::from_secs(2));
        assert_eq!(session.current_delay(), Some(Duration::from_secs(2)));

        tokio::time::advance(Duration::from_secs(10)).await;
        session.absorb(RunStats::default());
        assert_eq!(session.idle_for(), Duration::from_secs(10));

        let mut stats = RunStats::default();
        stats.record(InsertOutcome::Inserted);
        session.absorb(stats);
        assert_eq!(session.idle_for(), Duration::ZERO);
        assert_eq!(session.totals().inserted, 1);
        assert_eq!(session.attempts(), 2);
        assert_eq!(session.elapsed(), Duration::from_secs(10));
    }
}
