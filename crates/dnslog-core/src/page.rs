//! # Page Envelope
//!
//! Response body of `GET /profiles/{profile}/logs?limit=1000[&cursor=...]`.
//!
//! ```text
//! {
//!   "data": [ {event}, {event}, ... ],
//!   "meta": {
//!     "pagination": { "cursor": "eyJ0Ijo..." },   ← "" / null when exhausted
//!     "stream":     { "id": "1714557600123-0" }   ← meaningful on first page
//!   }
//! }
//! ```
//!
//! Events are kept as raw JSON until the caller asks for them, so one bad
//! event can be skipped without discarding the rest of the page.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::event::DnsEvent;
use crate::position::Position;

/// One page of the paginated log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogPage {
    #[serde(default)]
    data: Vec<Value>,

    #[serde(default)]
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub pagination: Pagination,

    #[serde(default)]
    pub stream: StreamMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamMeta {
    #[serde(default)]
    pub id: Option<String>,
}

impl LogPage {
    /// Decodes a page envelope from its JSON text.
    pub fn from_json(body: &str) -> CoreResult<Self> {
        serde_json::from_str(body).map_err(|e| CoreError::MalformedPage {
            reason: e.to_string(),
        })
    }

    /// Builds a page from already-typed events (used by fakes and tests).
    pub fn from_events(
        events: &[DnsEvent],
        cursor: Option<&str>,
        stream_id: Option<&str>,
    ) -> Self {
        LogPage {
            data: events
                .iter()
                .filter_map(|event| serde_json::to_value(event).ok())
                .collect(),
            meta: PageMeta {
                pagination: Pagination {
                    cursor: cursor.map(str::to_string),
                },
                stream: StreamMeta {
                    id: stream_id.map(str::to_string),
                },
            },
        }
    }

    /// Number of records on the page, including ones that fail to decode.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes each record independently, in page order.
    pub fn events(&self) -> impl Iterator<Item = CoreResult<DnsEvent>> + '_ {
        self.data.iter().cloned().map(DnsEvent::from_value)
    }

    /// Cursor for the next request, `None` once history is exhausted.
    pub fn next_cursor(&self) -> Option<&str> {
        self.meta
            .pagination
            .cursor
            .as_deref()
            .filter(|cursor| !cursor.is_empty())
    }

    /// Stream-discovery token, if the server supplied a non-empty one.
    pub fn stream_position(&self) -> Option<Position> {
        self.meta.stream.id.clone().and_then(Position::new)
    }
}
