//! Line framing for the generation stream.
//!
//! `FrameDecoder` is the synchronous half of the decoder: bytes in, parsed
//! lines out. It never parses a line before its `\n` has arrived, and it
//! keeps an incomplete trailing UTF-8 sequence aside until the next chunk
//! completes it, so a multi-byte character split across chunks survives.

use super::frame::StreamFrame;

/// Result of resolving one complete line
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedLine {
    /// The line parsed as a frame
    Frame(StreamFrame),
    /// The line was not a valid frame and is dropped by callers
    Malformed {
        /// The offending line, trimmed
        line: String,
        /// Parser message
        error: String,
    },
}

/// Incremental NDJSON decoder for one byte stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Decoded text not yet resolved into complete lines
    pending: String,
    /// Leading bytes of a multi-byte character cut off by a chunk boundary
    utf8_carry: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedLine> {
        let text = self.decode_utf8(chunk);

        // Everything before `scan_from` was already searched for '\n'
        let scan_from = self.pending.len();
        self.pending.push_str(&text);

        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut search = scan_from;
        while let Some(offset) = self.pending[search..].find('\n') {
            let end = search + offset;
            if let Some(line) = parse_line(&self.pending[consumed..end]) {
                lines.push(line);
            }
            consumed = end + 1;
            search = consumed;
        }
        self.pending.drain(..consumed);

        lines
    }

    /// Signal end of stream and resolve the residual line, if any
    pub fn finish(&mut self) -> Option<DecodedLine> {
        if !self.utf8_carry.is_empty() {
            let carry = std::mem::take(&mut self.utf8_carry);
            self.pending.push_str(&String::from_utf8_lossy(&carry));
        }
        let residual = std::mem::take(&mut self.pending);
        parse_line(&residual)
    }

    /// Drop all buffered state so the decoder can serve another stream
    pub fn reset(&mut self) {
        self.pending.clear();
        self.utf8_carry.clear();
    }

    /// Bytes of text waiting for a line terminator
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len() + self.utf8_carry.len()
    }

    /// Whether any partial line or partial character is buffered
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_len() > 0
    }

    /// Decode `chunk` after the carried bytes, carrying a new incomplete tail
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                    match e.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_up_to + invalid_len..];
                        }
                        None => {
                            // Truncated sequence at the very end: wait for more bytes
                            self.utf8_carry = rest[valid_up_to..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

/// Parse one line; blank lines resolve to nothing
fn parse_line(raw: &str) -> Option<DecodedLine> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    Some(match serde_json::from_str::<StreamFrame>(line) {
        Ok(frame) => DecodedLine::Frame(frame),
        Err(e) => DecodedLine::Malformed {
            line: line.to_string(),
            error: e.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses(lines: &[DecodedLine]) -> Vec<&str> {
        lines
            .iter()
            .filter_map(|l| match l {
                DecodedLine::Frame(f) => Some(f.response.as_str()),
                DecodedLine::Malformed { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_complete_lines() {
        let mut decoder = FrameDecoder::new();
        let lines = decoder.feed(b"{\"response\":\"hello\"}\n{\"response\":\"world\"}\n");
        assert_eq!(responses(&lines), vec!["hello", "world"]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.feed(b"{\"response\":").is_empty());
        assert!(decoder.feed(b"\"hel").is_empty());
        // A complete JSON object without its newline is still partial
        assert!(decoder.feed(b"lo\"}").is_empty());
        assert!(decoder.has_pending());

        let lines = decoder.feed(b"\n");
        assert_eq!(responses(&lines), vec!["hello"]);
    }

    #[test]
    fn test_chunk_spanning_two_lines() {
        let mut decoder = FrameDecoder::new();
        let first = decoder.feed(b"{\"response\":\"a\"}\n{\"response\":");
        assert_eq!(responses(&first), vec!["a"]);
        let second = decoder.feed(b"\"b\"}\n");
        assert_eq!(responses(&second), vec!["b"]);
    }

    #[test]
    fn test_split_multibyte_character() {
        let mut decoder = FrameDecoder::new();
        let line = "{\"response\":\"h\u{e9}llo \u{1f9e0}\"}\n".as_bytes();

        // Cut inside the 4-byte brain emoji and inside the 2-byte e-acute
        let e_acute = line.iter().position(|&b| b == 0xC3).unwrap();
        let emoji = line.iter().position(|&b| b == 0xF0).unwrap();

        assert!(decoder.feed(&line[..=e_acute]).is_empty());
        assert!(decoder.feed(&line[e_acute + 1..emoji + 2]).is_empty());
        let lines = decoder.feed(&line[emoji + 2..]);

        assert_eq!(responses(&lines), vec!["h\u{e9}llo \u{1f9e0}"]);
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut decoder = FrameDecoder::new();
        let lines = decoder.feed(b"{\"response\":\"a\xFFb\"}\n");
        assert_eq!(responses(&lines), vec!["a\u{fffd}b"]);
    }

    #[test]
    fn test_malformed_line_reported() {
        let mut decoder = FrameDecoder::new();
        let lines = decoder.feed(b"not json\n{\"response\":\"ok\"}\n");
        assert_eq!(lines.len(), 2);
        assert!(matches!(&lines[0], DecodedLine::Malformed { line, .. } if line == "not json"));
        assert_eq!(responses(&lines), vec!["ok"]);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let mut decoder = FrameDecoder::new();
        let lines = decoder.feed(b"\n\r\n{\"response\":\"x\"}\r\n\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(responses(&lines), vec!["x"]);
    }

    #[test]
    fn test_finish_flushes_residual() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"{\"response\":\"tail\",\"done\":true}").is_empty());

        match decoder.finish() {
            Some(DecodedLine::Frame(frame)) => {
                assert_eq!(frame.response, "tail");
                assert!(frame.done);
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(!decoder.has_pending());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_finish_with_truncated_residual() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"{\"response\":\"cut");
        assert!(matches!(
            decoder.finish(),
            Some(DecodedLine::Malformed { .. })
        ));
    }

    #[test]
    fn test_reset_discards_state() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"{\"response\":\"stale");
        decoder.feed(&[0xE2, 0x82]);
        assert!(decoder.has_pending());

        decoder.reset();
        assert!(!decoder.has_pending());
        let lines = decoder.feed(b"{\"response\":\"fresh\"}\n");
        assert_eq!(responses(&lines), vec!["fresh"]);
    }
}
