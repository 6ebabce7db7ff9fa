//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Command-line flags (highest priority)                              │
//! │     --profile abc123 --apikey ... --db dnslog.db                       │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     NEXTDNS_PROFILE_ID=abc123                                          │
//! │     NEXTDNS_API_KEY=...                                                │
//! │     DNSLOG_DATABASE=/var/lib/dnslog/dnslog.db                          │
//! │     NEXTDNS_BASE_URL=https://api.nextdns.io                            │
//! │                                                                         │
//! │  3. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/dnslog-sync/config.toml (Linux)                          │
//! │     ~/Library/Application Support/io.dnslog.dnslog-sync/config.toml    │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [nextdns]
//! profile_id = "abc123"
//! api_key = "0123456789abcdef"
//! base_url = "https://api.nextdns.io"
//!
//! [database]
//! path = "/var/lib/dnslog/dnslog.db"
//!
//! [sync]
//! page_size = 1000
//! page_delay_ms = 100
//! request_timeout_secs = 30
//! checkpoint_every = 100
//! heartbeat_interval_secs = 30
//! initial_backoff_ms = 1000
//! max_backoff_secs = 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use dnslog_core::MAX_PAGE_SIZE;

/// Public NextDNS API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.nextdns.io";

// =============================================================================
// NextDNS Settings
// =============================================================================

/// Which profile to mirror and how to reach the API.
#[derive(Clone, Serialize, Deserialize)]
pub struct NextDnsSettings {
    /// Profile identifier (the `abc123` in `/profiles/abc123/logs`).
    #[serde(default)]
    pub profile_id: String,

    /// Value of the `X-Api-Key` header.
    #[serde(default)]
    pub api_key: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for NextDnsSettings {
    fn default() -> Self {
        NextDnsSettings {
            profile_id: String::new(),
            api_key: String::new(),
            base_url: default_base_url(),
        }
    }
}

// The API key never reaches logs.
impl std::fmt::Debug for NextDnsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let api_key = if self.api_key.is_empty() { "" } else { "***" };
        f.debug_struct("NextDnsSettings")
            .field("profile_id", &self.profile_id)
            .field("api_key", &api_key)
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Where the mirror lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file. Created on first run.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Events requested per page (1..=1000).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pause between page requests (milliseconds).
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Timeout for one page request (seconds). The stream has none.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Stream inserts between checkpoint writes.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u32,

    /// Interval of the stream liveness report (seconds).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// First reconnect delay after a stream failure (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Cap on the reconnect delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}
fn default_page_delay() -> u64 {
    100
}
fn default_request_timeout() -> u64 {
    30
}
fn default_checkpoint_every() -> u32 {
    100
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            page_size: default_page_size(),
            page_delay_ms: default_page_delay(),
            request_timeout_secs: default_request_timeout(),
            checkpoint_every: default_checkpoint_every(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl SyncSettings {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Overrides
// =============================================================================

/// Values given on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub profile_id: Option<String>,
    pub api_key: Option<String>,
    pub database: Option<PathBuf>,
    pub base_url: Option<String>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// API access.
    #[serde(default)]
    pub nextdns: NextDnsSettings,

    /// Local storage.
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Engine tuning.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Loads configuration from defaults, file, environment and overrides,
    /// then validates it.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, or the platform config directory)
    /// 3. Environment variables
    /// 4. `overrides` (command-line flags)
    ///
    /// An explicit `config_path` that does not exist is an error; a missing
    /// file in the default location is not.
    pub fn load(config_path: Option<PathBuf>, overrides: &ConfigOverrides) -> SyncResult<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                Some(path) => {
                    debug!(?path, "Config file not found, using defaults");
                    Self::default()
                }
                None => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.apply_overrides(overrides);
        config.validate()?;

        Ok(config)
    }

    /// Reads a TOML config file.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        info!(?path, "Loading sync config from file");
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parses TOML text.
    pub fn from_toml_str(contents: &str) -> SyncResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.nextdns.profile_id.trim().is_empty() {
            return Err(SyncError::MissingProfileId);
        }

        if self.nextdns.api_key.trim().is_empty() {
            return Err(SyncError::MissingApiKey);
        }

        match self.database.path {
            Some(ref path) if !path.as_os_str().is_empty() => {}
            _ => return Err(SyncError::MissingDatabase),
        }

        let base = url::Url::parse(&self.nextdns.base_url)?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Base URL must start with http:// or https://, got: {}",
                self.nextdns.base_url
            )));
        }

        let sync = &self.sync;
        if sync.page_size == 0 || sync.page_size > MAX_PAGE_SIZE {
            return Err(SyncError::InvalidConfig(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if sync.checkpoint_every == 0 {
            return Err(SyncError::InvalidConfig(
                "checkpoint_every must be greater than 0".into(),
            ));
        }

        if sync.heartbeat_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "heartbeat_interval_secs must be greater than 0".into(),
            ));
        }

        if sync.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if sync.initial_backoff_ms == 0 || sync.initial_backoff() > sync.max_backoff() {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must be non-zero and not exceed max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("NEXTDNS_PROFILE_ID") {
            debug!(profile_id = %id, "Overriding profile ID from environment");
            self.nextdns.profile_id = id;
        }

        if let Some(key) = lookup("NEXTDNS_API_KEY") {
            debug!("Overriding API key from environment");
            self.nextdns.api_key = key;
        }

        if let Some(path) = lookup("DNSLOG_DATABASE") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("NEXTDNS_BASE_URL") {
            debug!(url = %url, "Overriding base URL from environment");
            self.nextdns.base_url = url;
        }
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref id) = overrides.profile_id {
            self.nextdns.profile_id = id.clone();
        }
        if let Some(ref key) = overrides.api_key {
            self.nextdns.api_key = key.clone();
        }
        if let Some(ref path) = overrides.database {
            self.database.path = Some(path.clone());
        }
        if let Some(ref url) = overrides.base_url {
            self.nextdns.base_url = url.clone();
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "dnslog", "dnslog-sync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn profile_id(&self) -> &str {
        &self.nextdns.profile_id
    }

    /// Database path. Only `None` before validation.
    pub fn database_path(&self) -> Option<&Path> {
        self.database.path.as_deref()
    }
}
