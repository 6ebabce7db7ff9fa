//! In-memory fakes for engine tests: a scripted [`LogSource`] and stores
//! with failure injection.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::client::{ChunkStream, LogSource};
use crate::error::{SyncError, SyncResult};
use crate::store::{PositionStore, RecordStore};
use dnslog_core::{DnsEvent, EventId, LogPage, Position};
use dnslog_db::{DbError, DbResult, InsertOutcome};

// =============================================================================
// Fixtures
// =============================================================================

/// An event at `2024-05-01T10:00:00Z + second`, from client 10.0.0.2.
pub fn event(domain: &str, second: i64) -> DnsEvent {
    let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        + chrono::Duration::seconds(second);
    DnsEvent::from_json(&format!(
        r#"{{"timestamp":"{}","domain":"{}","clientIp":"10.0.0.2","status":"default"}}"#,
        timestamp.to_rfc3339(),
        domain
    ))
    .unwrap()
}

/// `data:` frame for an event, followed by the blank separator.
pub fn data_frame(event: &DnsEvent) -> String {
    format!("data: {}\n\n", serde_json::to_string(event).unwrap())
}

pub fn page(events: &[DnsEvent], cursor: Option<&str>, stream_id: Option<&str>) -> LogPage {
    LogPage::from_events(events, cursor, stream_id)
}

// =============================================================================
// Scripted Source
// =============================================================================

/// What one `open_stream` call does.
pub enum StreamScript {
    /// The request itself fails.
    Refuse(SyncError),
    /// The body yields these chunks, then ends or hangs.
    Feed {
        chunks: Vec<SyncResult<Vec<u8>>>,
        hang: bool,
    },
}

impl StreamScript {
    /// Body that delivers `text` and closes cleanly.
    pub fn closes(text: impl Into<String>) -> Self {
        StreamScript::Feed {
            chunks: vec![Ok(text.into().into_bytes())],
            hang: false,
        }
    }

    /// Body that delivers raw bytes (not necessarily UTF-8) in one chunk.
    pub fn closes_raw(bytes: Vec<u8>) -> Self {
        StreamScript::Feed {
            chunks: vec![Ok(bytes)],
            hang: false,
        }
    }

    /// Body that delivers `text` and then fails mid-read.
    pub fn fails_after(text: impl Into<String>, err: SyncError) -> Self {
        StreamScript::Feed {
            chunks: vec![Ok(text.into().into_bytes()), Err(err)],
            hang: false,
        }
    }

    /// Body that delivers `text` and then stays open with no data.
    pub fn hangs_after(text: impl Into<String>) -> Self {
        StreamScript::Feed {
            chunks: vec![Ok(text.into().into_bytes())],
            hang: true,
        }
    }
}

/// A [`LogSource`] that replays canned pages and streams, recording every
/// request. Running out of script panics so a runaway loop fails the test.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<VecDeque<SyncResult<LogPage>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    page_requests: Mutex<Vec<Option<String>>>,
    stream_requests: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn with_pages(pages: Vec<SyncResult<LogPage>>) -> Self {
        ScriptedSource {
            pages: Mutex::new(pages.into()),
            ..Default::default()
        }
    }

    pub fn with_streams(streams: Vec<StreamScript>) -> Self {
        ScriptedSource {
            streams: Mutex::new(streams.into()),
            ..Default::default()
        }
    }

    /// Cursor sent with each page request, in order.
    pub fn page_requests(&self) -> Vec<Option<String>> {
        self.page_requests.lock().unwrap().clone()
    }

    /// Position each stream was opened at, in order.
    pub fn stream_requests(&self) -> Vec<String> {
        self.stream_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSource for ScriptedSource {
    async fn fetch_page(&self, cursor: Option<&str>) -> SyncResult<LogPage> {
        self.page_requests
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));

        let next = self.pages.lock().unwrap().pop_front();
        next.unwrap_or_else(|| panic!("unexpected page request (cursor {cursor:?})"))
    }

    async fn open_stream(&self, position: &Position) -> SyncResult<ChunkStream> {
        self.stream_requests
            .lock()
            .unwrap()
            .push(position.to_string());

        let next = self.streams.lock().unwrap().pop_front();
        match next {
            Some(StreamScript::Refuse(err)) => Err(err),
            Some(StreamScript::Feed { chunks, hang: false }) => Ok(stream::iter(chunks).boxed()),
            Some(StreamScript::Feed { chunks, hang: true }) => {
                Ok(stream::iter(chunks).chain(stream::pending()).boxed())
            }
            None => panic!("unexpected stream request at {position}"),
        }
    }
}

// =============================================================================
// Memory Stores
// =============================================================================

/// Record store keyed by identity; inserts for chosen domains fail.
#[derive(Default)]
pub struct MemoryRecords {
    rows: Mutex<HashMap<EventId, DnsEvent>>,
    failing_domains: Mutex<HashSet<String>>,
}

impl MemoryRecords {
    /// Pre-populates the store, as if a previous run had mirrored `events`.
    pub fn seeded(events: &[DnsEvent]) -> Self {
        let records = MemoryRecords::default();
        {
            let mut rows = records.rows.lock().unwrap();
            for event in events {
                rows.insert(event.identity(), event.clone());
            }
        }
        records
    }

    pub fn fail_domain(&self, domain: &str) {
        self.failing_domains.lock().unwrap().insert(domain.to_string());
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn contains(&self, event: &DnsEvent) -> bool {
        self.rows.lock().unwrap().contains_key(&event.identity())
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn put(&self, id: &EventId, event: &DnsEvent) -> DbResult<InsertOutcome> {
        if self.failing_domains.lock().unwrap().contains(&event.domain) {
            return Err(DbError::QueryFailed("injected insert failure".into()));
        }

        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(id) {
            return Ok(InsertOutcome::Duplicate);
        }
        rows.insert(id.clone(), event.clone());
        Ok(InsertOutcome::Inserted)
    }
}

/// Position slot that records every successful write.
#[derive(Default)]
pub struct MemoryPositions {
    current: Mutex<Option<Position>>,
    writes: Mutex<Vec<String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryPositions {
    pub fn at(position: &str) -> Self {
        MemoryPositions {
            current: Mutex::new(Position::new(position)),
            ..Default::default()
        }
    }

    pub fn current(&self) -> Option<String> {
        self.current.lock().unwrap().as_ref().map(Position::to_string)
    }

    /// Successful writes, oldest first.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PositionStore for MemoryPositions {
    async fn load(&self) -> DbResult<Option<Position>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DbError::ConnectionFailed("injected read failure".into()));
        }
        Ok(self.current.lock().unwrap().clone())
    }

    async fn save(&self, position: &Position) -> DbResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::QueryFailed("injected write failure".into()));
        }
        *self.current.lock().unwrap() = Some(position.clone());
        self.writes.lock().unwrap().push(position.to_string());
        Ok(())
    }
}
