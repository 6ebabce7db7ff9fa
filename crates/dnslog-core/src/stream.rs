//! # Live Stream Line Protocol
//!
//! `/logs/stream` answers with an unbounded, line-oriented body in
//! server-sent-events style:
//!
//! ```text
//! id: 1714557600123-0
//! data: {"timestamp":"2024-05-01T10:00:00.123Z","domain":"a.example",...}
//!
//! id: 1714557600456-0
//! data: {"timestamp":"2024-05-01T10:00:00.456Z","domain":"b.example",...}
//!
//! ```
//!
//! [`LineFramer`] turns arbitrary body chunks into complete lines and
//! [`StreamLine::parse`] classifies each one. Neither touches the network.

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Line Classification
// =============================================================================

/// One classified line of the stream body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLine<'a> {
    /// `id: <token>`: position of the event that follows.
    Id(&'a str),

    /// `data: <json>`: one event payload.
    Data(&'a str),

    /// Block separator.
    Blank,

    /// Comments (`: keepalive`), other fields, anything else.
    Other(&'a str),
}

impl<'a> StreamLine<'a> {
    /// Classifies a single line (without its terminator).
    pub fn parse(line: &'a str) -> Self {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return StreamLine::Blank;
        }
        if let Some(token) = field_value(line, "id") {
            return StreamLine::Id(token);
        }
        if let Some(payload) = field_value(line, "data") {
            return StreamLine::Data(payload);
        }
        StreamLine::Other(line)
    }
}

/// `name:value` or `name: value` → `value`.
fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

// =============================================================================
// Line Framing
// =============================================================================

/// Reassembles lines from body chunks that may split anywhere.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_line_len: usize,
}

impl LineFramer {
    pub fn new(max_line_len: usize) -> Self {
        LineFramer {
            buf: Vec::new(),
            max_line_len,
        }
    }

    /// Feeds a chunk and returns every line it completed.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD so the line still reaches the
    /// payload decoder, which rejects it on its own. Fails only when a line
    /// (complete or still pending) exceeds the limit; the framer should be
    /// discarded afterwards.
    pub fn push(&mut self, chunk: &[u8]) -> CoreResult<Vec<String>> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(self.decode(&self.buf[start..end])?);
            start = end + 1;
        }
        self.buf.drain(..start);

        if self.buf.len() > self.max_line_len {
            return Err(CoreError::LineTooLong {
                limit: self.max_line_len,
            });
        }
        Ok(lines)
    }

    /// Flushes an unterminated final line at end of body.
    pub fn finish(&mut self) -> CoreResult<Option<String>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let rest = std::mem::take(&mut self.buf);
        self.decode(&rest).map(Some)
    }

    fn decode(&self, raw: &[u8]) -> CoreResult<String> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.len() > self.max_line_len {
            return Err(CoreError::LineTooLong {
                limit: self.max_line_len,
            });
        }
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(crate::MAX_STREAM_LINE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_classification() {
        assert_eq!(StreamLine::parse("id: 123-0"), StreamLine::Id("123-0"));
        assert_eq!(StreamLine::parse("id:123-0"), StreamLine::Id("123-0"));
        assert_eq!(StreamLine::parse("data: {}"), StreamLine::Data("{}"));
        assert_eq!(StreamLine::parse(""), StreamLine::Blank);
        assert_eq!(StreamLine::parse("\r"), StreamLine::Blank);
        assert_eq!(StreamLine::parse("id: abc\r"), StreamLine::Id("abc"));
        assert_eq!(StreamLine::parse(": keepalive"), StreamLine::Other(": keepalive"));
        assert_eq!(StreamLine::parse("event: log"), StreamLine::Other("event: log"));
        // A field whose name merely starts with "id" is not an id line.
        assert_eq!(StreamLine::parse("identity: x"), StreamLine::Other("identity: x"));
    }

    #[test]
    fn test_framer_handles_split_chunks() {
        let mut framer = LineFramer::new(64);

        assert!(framer.push(b"id: 1").unwrap().is_empty());
        assert_eq!(framer.push(b"23\ndata: {").unwrap(), vec!["id: 123"]);
        assert_eq!(
            framer.push(b"}\r\n\nid: 4").unwrap(),
            vec!["data: {}".to_string(), String::new()]
        );
        assert_eq!(framer.finish().unwrap(), Some("id: 4".to_string()));
        assert_eq!(framer.finish().unwrap(), None);
    }

    #[test]
    fn test_framer_rejects_oversized_lines() {
        let mut framer = LineFramer::new(8);
        assert!(matches!(
            framer.push(b"data: 0123456789"),
            Err(CoreError::LineTooLong { limit: 8 })
        ));

        let mut framer = LineFramer::new(8);
        assert!(framer.push(b"data: 0123456789\n").is_err());
    }

    #[test]
    fn test_framer_keeps_lines_around_invalid_utf8() {
        let mut framer = LineFramer::new(64);
        let mut chunk = b"id: 1\ndata: {\"domain\":\"".to_vec();
        chunk.extend_from_slice(&[0xff, 0xfe]);
        chunk.extend_from_slice(b"\"}\nid: 2\n");

        let lines = framer.push(&chunk).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id: 1");
        assert_eq!(lines[1], "data: {\"domain\":\"\u{fffd}\u{fffd}\"}");
        assert_eq!(lines[2], "id: 2");
    }
}
