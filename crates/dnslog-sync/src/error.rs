//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Payload             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  MalformedPage          │ │
//! │  │  MissingProfile │  │  HttpStatus     │  │  MalformedEvent         │ │
//! │  │  MissingApiKey  │  │  Timeout        │  │                         │ │
//! │  │  InvalidUrl     │  │  StreamRead     │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Database     │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  DatabaseError  │  │  Internal       │                              │
//! │  │                 │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! How an error is handled depends on where it surfaces, not only on its
//! category: the same `ConnectionFailed` aborts a batch run but only delays
//! the next stream attempt.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// No NextDNS profile configured.
    #[error("NextDNS profile ID not configured (--profile or NEXTDNS_PROFILE_ID)")]
    MissingProfileId,

    /// No API key configured.
    #[error("NextDNS API key not configured (--apikey or NEXTDNS_API_KEY)")]
    MissingApiKey,

    /// No database path configured.
    #[error("Database path not configured (--db or DNSLOG_DATABASE)")]
    MissingDatabase,

    /// Invalid API base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Request could not be sent or the connection dropped.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The API answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    HttpStatus { status: u16, url: String },

    /// Request timeout.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// Reading the live stream body failed.
    #[error("Stream read failed: {0}")]
    StreamRead(String),

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// A page envelope could not be decoded.
    #[error("Malformed page: {0}")]
    MalformedPage(String),

    /// A single event could not be decoded.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<dnslog_db::DbError> for SyncError {
    fn from(err: dnslog_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<dnslog_core::CoreError> for SyncError {
    fn from(err: dnslog_core::CoreError) -> Self {
        use dnslog_core::CoreError;
        match err {
            CoreError::MalformedEvent { reason } => SyncError::MalformedEvent(reason),
            CoreError::MalformedPage { reason } => SyncError::MalformedPage(reason),
            other @ CoreError::LineTooLong { .. } => SyncError::StreamRead(other.to_string()),
        }
    }
}

/// Convert reqwest errors to SyncError.
///
/// Timeouts are mapped by the client itself, which knows the configured
/// duration.
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SyncError::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.path().to_string()).unwrap_or_default(),
            };
        }
        if err.is_decode() || err.is_body() {
            return SyncError::StreamRead(err.to_string());
        }
        SyncError::ConnectionFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the failure is likely transient.
    ///
    /// Diagnostic only: it is logged with each failed stream attempt, but the
    /// stream path retries every error and the batch path retries none.
    ///
    /// ## Retryable Errors
    /// - Connection failures and dropped streams
    /// - Timeouts
    /// - HTTP 429 and 5xx
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - HTTP 4xx other than 429 (bad key, unknown profile)
    /// - Payload decoding errors
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_)
            | SyncError::Timeout(_)
            | SyncError::StreamRead(_)
            | SyncError::DatabaseError(_) => true,
            SyncError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingProfileId
                | SyncError::MissingApiKey
                | SyncError::MissingDatabase
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
        )
    }

    /// Returns true if the remote sent something that could not be decoded.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            SyncError::MalformedPage(_) | SyncError::MalformedEvent(_)
        )
    }
}
