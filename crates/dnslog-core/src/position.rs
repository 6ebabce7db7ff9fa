//! # Stream Position
//!
//! Opaque resume token for the live stream.
//!
//! Two protocols write it and both values are interchangeable as the opening
//! `?id=` of `/logs/stream`:
//!
//! ```text
//! ┌──────────────────────┐                 ┌──────────────────────┐
//! │ Batch fetch          │  meta.stream.id │                      │
//! │ (first page of run)  │ ──────────────► │  sync_state          │
//! └──────────────────────┘                 │  key = "stream_id"   │
//! ┌──────────────────────┐   last `id:`    │                      │
//! │ Live stream          │ ──────────────► │                      │
//! └──────────────────────┘                 └──────────────────────┘
//! ```
//!
//! The engine never looks inside the token.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(String);

impl Position {
    /// Wraps a token; returns `None` for an empty or blank one.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Position(token))
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tokens_are_not_positions() {
        assert!(Position::new("").is_none());
        assert!(Position::new("   ").is_none());
        assert_eq!(Position::new("abc").unwrap().as_str(), "abc");
    }
}
