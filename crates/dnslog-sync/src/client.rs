//! # Log Source Client
//!
//! The two retrieval endpoints of the NextDNS log API behind one trait.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        NextDNS Log API                                  │
//! │                                                                         │
//! │  PAGES (bounded timeout)                                               │
//! │  GET {base}/profiles/{profile}/logs?limit=1000[&cursor=<token>]        │
//! │  X-Api-Key: <key>                                                      │
//! │       └──► { data: [...], meta: { pagination.cursor, stream.id } }     │
//! │                                                                         │
//! │  STREAM (no timeout, body never ends on its own)                       │
//! │  GET {base}/profiles/{profile}/logs/stream?id=<token>                  │
//! │  X-Api-Key: <key>                                                      │
//! │       └──► id: <token>                                                 │
//! │            data: {event}                                               │
//! │            <blank>                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use dnslog_core::{LogPage, Position};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Raw body chunks of the live stream, in arrival order.
pub type ChunkStream = BoxStream<'static, SyncResult<Vec<u8>>>;

// =============================================================================
// Log Source Trait
// =============================================================================

/// A remote append-only log readable by page or as a live feed.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetches one page. `cursor` is `None` for the newest page.
    async fn fetch_page(&self, cursor: Option<&str>) -> SyncResult<LogPage>;

    /// Opens the live feed starting after `position`.
    ///
    /// Fails if the connection cannot be made or the server answers with a
    /// non-success status.
    async fn open_stream(&self, position: &Position) -> SyncResult<ChunkStream>;
}

// =============================================================================
// NextDNS Client
// =============================================================================

/// [`LogSource`] backed by the NextDNS REST API.
#[derive(Debug, Clone)]
pub struct NextDnsClient {
    http: reqwest::Client,
    base_url: Url,
    profile_id: String,
    api_key: String,
    page_size: u32,
    request_timeout: Duration,
}

impl NextDnsClient {
    /// Builds a client from validated configuration.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let base_url = Url::parse(&config.nextdns.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(config.nextdns.base_url.clone()));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("dnslog-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Internal(format!("http client build failed: {e}")))?;

        Ok(NextDnsClient {
            http,
            base_url,
            profile_id: config.nextdns.profile_id.clone(),
            api_key: config.nextdns.api_key.clone(),
            page_size: config.sync.page_size,
            request_timeout: config.sync.request_timeout(),
        })
    }

    /// URL of one page request.
    pub fn logs_url(&self, cursor: Option<&str>) -> SyncResult<Url> {
        let mut url = self.endpoint(&["logs"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.page_size.to_string());
            if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
                query.append_pair("cursor", cursor);
            }
        }
        Ok(url)
    }

    /// URL of the live feed opened at `position`.
    pub fn stream_url(&self, position: &Position) -> SyncResult<Url> {
        let mut url = self.endpoint(&["logs", "stream"])?;
        url.query_pairs_mut().append_pair("id", position.as_str());
        Ok(url)
    }

    fn endpoint(&self, tail: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["profiles", self.profile_id.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn get(&self, url: Url, timeout: Option<Duration>) -> SyncResult<reqwest::Response> {
        let path = url.path().to_string();
        let mut request = self.http.get(url).header(API_KEY_HEADER, &self.api_key);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                url: path,
            });
        }
        Ok(response)
    }

    fn request_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.request_timeout.as_secs())
        } else {
            SyncError::from(err)
        }
    }
}

#[async_trait]
impl LogSource for NextDnsClient {
    async fn fetch_page(&self, cursor: Option<&str>) -> SyncResult<LogPage> {
        let url = self.logs_url(cursor)?;
        debug!(url = %url, "Requesting log page");

        let response = self.get(url, Some(self.request_timeout)).await?;
        let body = response.text().await.map_err(|e| self.request_error(e))?;

        Ok(LogPage::from_json(&body)?)
    }

    async fn open_stream(&self, position: &Position) -> SyncResult<ChunkStream> {
        let url = self.stream_url(position)?;
        debug!(url = %url, "Opening log stream");

        let response = self.get(url, None).await?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(SyncError::from));

        Ok(chunks.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> SyncResult<NextDnsClient> {
        let mut config = SyncConfig::default();
        config.nextdns.profile_id = "abc123".into();
        config.nextdns.api_key = "secret".into();
        config.nextdns.base_url = base_url.into();
        NextDnsClient::new(&config)
    }

    #[test]
    fn test_first_page_url() {
        let client = client("https://api.nextdns.io").unwrap();
        let url = client.logs_url(None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.nextdns.io/profiles/abc123/logs?limit=1000"
        );

        // An empty cursor is the same as none
        assert_eq!(client.logs_url(Some("")).unwrap(), url);
    }

    #[test]
    fn test_cursor_is_encoded() {
        let client = client("https://api.nextdns.io/").unwrap();
        let url = client.logs_url(Some("eyJ0Ijo+MTJ9")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.nextdns.io/profiles/abc123/logs?limit=1000&cursor=eyJ0Ijo%2BMTJ9"
        );
    }

    #[test]
    fn test_stream_url() {
        let client = client("http://localhost:8080/v1").unwrap();
        let position = Position::new("1714557600123-0").unwrap();
        assert_eq!(
            client.stream_url(&position).unwrap().as_str(),
            "http://localhost:8080/v1/profiles/abc123/logs/stream?id=1714557600123-0"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(matches!(client("not a url"), Err(SyncError::InvalidUrl(_))));
        assert!(matches!(client("mailto:ops@example.com"), Err(SyncError::InvalidUrl(_))));
    }
}
