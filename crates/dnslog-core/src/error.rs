//! # Error Types
//!
//! Domain-specific error types for dnslog-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  dnslog-core errors (this file)                                        │
//! │  └── CoreError        - Payload decoding and stream framing failures   │
//! │                                                                         │
//! │  dnslog-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  dnslog-sync errors (separate crate)                                   │
//! │  └── SyncError        - Transport, protocol and policy failures        │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → agent exit status / retry decision      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Errors raised while decoding data received from the log API.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A single event payload could not be decoded.
    ///
    /// ## When This Occurs
    /// - `data:` line carrying truncated or non-JSON text
    /// - Event without the required `timestamp` or `domain`
    /// - Timestamp not in RFC 3339 form
    #[error("Malformed event payload: {reason}")]
    MalformedEvent { reason: String },

    /// A whole page envelope could not be decoded.
    #[error("Malformed page envelope: {reason}")]
    MalformedPage { reason: String },

    /// A stream line exceeded the framing limit.
    #[error("Stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

impl CoreError {
    /// Creates a MalformedEvent error from any displayable cause.
    pub fn malformed_event(reason: impl std::fmt::Display) -> Self {
        CoreError::MalformedEvent {
            reason: reason.to_string(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
