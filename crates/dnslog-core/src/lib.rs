//! # dnslog-core: Pure Event Model for the DNS Log Mirror
//!
//! This crate holds everything about a NextDNS query-log event that can be
//! expressed without touching the network or the database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        dnslog Data Flow                                 │
//! │                                                                         │
//! │  NextDNS API (pages / live stream)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ dnslog-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   event   │  │ identity  │  │   page    │  │  stream   │  │   │
//! │  │   │ DnsEvent  │  │  EventId  │  │  LogPage  │  │ StreamLine│  │   │
//! │  │   │  Device   │  │           │  │ PageMeta  │  │LineFramer │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  dnslog-db (insert-or-ignore by EventId) / dnslog-sync (policy)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`event`] - The DNS query event and its polymorphic device descriptor
//! - [`identity`] - Deterministic dedup key derived from event content
//! - [`page`] - Envelope of the paginated `/logs` endpoint
//! - [`stream`] - `id:` / `data:` line protocol of `/logs/stream`
//! - [`position`] - Opaque resume token shared by both protocols
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use dnslog_core::{DnsEvent, StreamLine};
//!
//! let line = r#"data: {"timestamp":"2024-05-01T10:00:00Z","domain":"example.com","clientIp":"10.0.0.2"}"#;
//! let StreamLine::Data(payload) = StreamLine::parse(line) else { unreachable!() };
//!
//! let event = DnsEvent::from_json(payload).unwrap();
//! assert_eq!(event.identity().as_str(), "1714557600000000000-example.com-10.0.0.2");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod event;
pub mod identity;
pub mod page;
pub mod position;
pub mod stream;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use event::{Device, DnsEvent};
pub use identity::EventId;
pub use page::{LogPage, PageMeta};
pub use position::Position;
pub use stream::{LineFramer, StreamLine};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest page the `/logs` endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Longest single line accepted from the live stream (1 MiB).
///
/// A line longer than this means the framing is broken; the stream is
/// treated as failed and reopened from the last checkpoint.
pub const MAX_STREAM_LINE_BYTES: usize = 1024 * 1024;
