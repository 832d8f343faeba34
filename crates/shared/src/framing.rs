//! Frame codec for the relay wire formats
//!
//! Two framings carry the same JSON payloads:
//!
//! - **NDJSON**: one JSON object per `\n`-terminated line
//! - **SSE**: `data: <json>` blocks separated by a blank line
//!
//! [`FrameSplitter`] works on raw bytes. Both delimiters are ASCII, so a
//! delimiter can never fall inside a multi-byte UTF-8 sequence and frames are
//! only decoded to text once complete. This makes splitting independent of
//! how the transport chunks the body.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChatRelayError;
use crate::events::StreamEvent;

/// Framing used on a streamed response body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Ndjson,
    Sse,
}

impl WireFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Ndjson => "application/x-ndjson",
            WireFormat::Sse => "text/event-stream",
        }
    }

    /// Serialize one event as a complete frame, delimiter included
    pub fn encode(&self, event: &StreamEvent) -> Result<String, ChatRelayError> {
        let json = serde_json::to_string(event)?;
        Ok(match self {
            WireFormat::Ndjson => format!("{json}\n"),
            WireFormat::Sse => format!("data: {json}\n\n"),
        })
    }

    /// Pick the framing announced by an `Accept` or `Content-Type` header value
    pub fn from_media_type(value: &str) -> Option<Self> {
        let value = value.to_ascii_lowercase();
        if value.contains("text/event-stream") {
            Some(WireFormat::Sse)
        } else if value.contains("application/x-ndjson") {
            Some(WireFormat::Ndjson)
        } else {
            None
        }
    }

    /// Extract the payload of one complete frame.
    ///
    /// Returns `None` for frames that carry nothing (blank lines, SSE comments
    /// or blocks without `data:` lines). Multiple SSE `data:` lines are joined
    /// with `\n`.
    pub fn payload(&self, frame: &str) -> Option<String> {
        match self {
            WireFormat::Ndjson => {
                let line = frame.trim();
                (!line.is_empty()).then(|| line.to_string())
            }
            WireFormat::Sse => {
                let data: Vec<&str> = frame
                    .lines()
                    .filter_map(|line| line.trim_end_matches('\r').strip_prefix("data:"))
                    .map(|value| value.strip_prefix(' ').unwrap_or(value))
                    .collect();
                if data.is_empty() {
                    return None;
                }
                let joined = data.join("\n");
                let joined = joined.trim();
                (!joined.is_empty()).then(|| joined.to_string())
            }
        }
    }

    /// Longest delimiter ending a frame
    fn max_delimiter_len(&self) -> usize {
        match self {
            WireFormat::Ndjson => 1,
            WireFormat::Sse => 3,
        }
    }

    /// Locate the end of the next frame at or after `from`: `(frame_len, delimiter_len)`
    fn find_boundary(&self, buffer: &[u8], from: usize) -> Option<(usize, usize)> {
        let mut from = from.min(buffer.len());
        match self {
            WireFormat::Ndjson => buffer[from..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| (from + offset, 1)),
            WireFormat::Sse => {
                while let Some(offset) = buffer[from..].iter().position(|b| *b == b'\n') {
                    let at = from + offset;
                    let rest = &buffer[at + 1..];
                    if rest.first() == Some(&b'\n') {
                        return Some((at, 2));
                    }
                    if rest.starts_with(b"\r\n") {
                        return Some((at, 3));
                    }
                    from = at + 1;
                }
                None
            }
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Ndjson => write!(f, "ndjson"),
            WireFormat::Sse => write!(f, "sse"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = ChatRelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(WireFormat::Ndjson),
            "sse" | "event-stream" => Ok(WireFormat::Sse),
            other => Err(ChatRelayError::UnknownWireFormat(other.to_string())),
        }
    }
}

/// Incremental splitter turning arbitrary byte chunks into frame payloads
#[derive(Debug)]
pub struct FrameSplitter {
    format: WireFormat,
    buffer: Vec<u8>,
    /// Buffer prefix already searched without finding a delimiter
    scanned: usize,
}

impl FrameSplitter {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            buffer: Vec::new(),
            scanned: 0,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Append bytes received from the transport
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the next complete frame payload out of the buffer, if any
    pub fn next_frame(&mut self) -> Option<String> {
        while let Some((frame_len, delimiter_len)) =
            self.format.find_boundary(&self.buffer, self.scanned)
        {
            self.scanned = 0;
            let frame: Vec<u8> = self.buffer.drain(..frame_len + delimiter_len).collect();
            let text = String::from_utf8_lossy(&frame[..frame_len]);
            if let Some(payload) = self.format.payload(&text) {
                return Some(payload);
            }
        }
        // A delimiter may still complete in the last few bytes
        self.scanned = self
            .buffer
            .len()
            .saturating_sub(self.format.max_delimiter_len() - 1);
        None
    }

    /// Drain every complete frame currently buffered
    pub fn drain_frames(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Flush once the transport has ended.
    ///
    /// Returns the remaining complete frames followed by the trailing frame
    /// that was never terminated by a delimiter.
    pub fn finish(&mut self) -> Vec<String> {
        let mut frames = self.drain_frames();
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let text = String::from_utf8_lossy(&rest);
        if let Some(payload) = self.format.payload(&text) {
            frames.push(payload);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_all(format: WireFormat, chunks: &[&[u8]]) -> Vec<String> {
        let mut splitter = FrameSplitter::new(format);
        let mut frames = Vec::new();
        for chunk in chunks {
            splitter.push(chunk);
            frames.extend(splitter.drain_frames());
        }
        frames.extend(splitter.finish());
        frames
    }

    #[test]
    fn test_encode_ndjson() {
        let frame = WireFormat::Ndjson.encode(&StreamEvent::chunk("Hel")).unwrap();
        assert_eq!(frame, "{\"type\":\"messageChunk\",\"message\":{\"content\":\"Hel\"}}\n");
    }

    #[test]
    fn test_encode_sse() {
        let frame = WireFormat::Sse.encode(&StreamEvent::chunk("lo")).unwrap();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
    }

    #[test]
    fn test_ndjson_split_across_chunks() {
        let frames = split_all(WireFormat::Ndjson, &[b"{\"a\":", b"1}\n{\"b\"", b":2}\n"]);
        assert_eq!(frames, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_ndjson_trailing_frame_without_newline() {
        let frames = split_all(WireFormat::Ndjson, &[b"{\"a\":1}\n\n  \n{\"b\":2}"]);
        assert_eq!(frames, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_multibyte_split_between_chunks() {
        let line = "{\"content\":\"Préparation…\"}\n".as_bytes();
        let frames = split_all(WireFormat::Ndjson, &[&line[..15], &line[15..]]);
        assert_eq!(frames, vec!["{\"content\":\"Préparation…\"}"]);
    }

    #[test]
    fn test_sse_blocks_and_comments() {
        let body = b": keep-alive\n\nevent: message\ndata: {\"x\":1}\n\ndata: [DONE]\r\n\r\n";
        let frames = split_all(WireFormat::Sse, &[body]);
        assert_eq!(frames, vec!["{\"x\":1}", "[DONE]"]);
    }

    #[test]
    fn test_sse_delimiter_split_across_chunks() {
        let frames = split_all(WireFormat::Sse, &[b"data: {\"x\":1}\n", b"\ndata: {\"y\":2}\n"]);
        assert_eq!(frames, vec!["{\"x\":1}", "{\"y\":2}"]);
    }

    #[test]
    fn test_sse_large_frame_byte_by_byte() {
        let text = "x".repeat(4096);
        let body = format!("data: {}\r\n\r\ndata: tail\n\n", text);
        let chunks: Vec<&[u8]> = body.as_bytes().chunks(1).collect();
        let frames = split_all(WireFormat::Sse, &chunks);
        assert_eq!(frames, vec![text, "tail".to_string()]);
    }

    #[test]
    fn test_scan_resumes_without_skipping_delimiter() {
        let mut splitter = FrameSplitter::new(WireFormat::Sse);
        splitter.push(b"data: a\n");
        assert_eq!(splitter.next_frame(), None);
        splitter.push(b"\r");
        assert_eq!(splitter.next_frame(), None);
        splitter.push(b"\n");
        assert_eq!(splitter.next_frame(), Some("a".to_string()));

        let mut splitter = FrameSplitter::new(WireFormat::Ndjson);
        splitter.push(b"{\"a\":");
        assert_eq!(splitter.next_frame(), None);
        splitter.push(b"1}\n{");
        assert_eq!(splitter.next_frame(), Some("{\"a\":1}".to_string()));
        assert_eq!(splitter.finish(), vec!["{".to_string()]);
    }

    #[test]
    fn test_sse_multiline_data() {
        assert_eq!(
            WireFormat::Sse.payload("data: line one\ndata: line two"),
            Some("line one\nline two".to_string())
        );
        assert_eq!(WireFormat::Sse.payload("event: ping"), None);
    }

    #[test]
    fn test_wire_format_parsing() {
        assert_eq!("ndjson".parse::<WireFormat>().unwrap(), WireFormat::Ndjson);
        assert_eq!(" SSE ".parse::<WireFormat>().unwrap(), WireFormat::Sse);
        assert!("xml".parse::<WireFormat>().is_err());
        assert_eq!(
            WireFormat::from_media_type("text/event-stream; charset=utf-8"),
            Some(WireFormat::Sse)
        );
        assert_eq!(WireFormat::from_media_type("*/*"), None);
    }
}
