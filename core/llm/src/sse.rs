//! Minimal server-sent-events parsing.
//!
//! All three vendor APIs stream completions as SSE. Only `data:` lines
//! matter here; event names and comments are skipped. Bytes are buffered
//! so lines (and multi-byte characters) split across network reads are
//! handled.

/// Incremental SSE `data:` payload extractor.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the complete `data:` payloads seen.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }

        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_data_line() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"data: {\"x\":1}\n\n");
        assert_eq!(payloads, vec!["{\"x\":1}"]);
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: hel").is_empty());
        let payloads = parser.push(b"lo\n");
        assert_eq!(payloads, vec!["hello"]);
    }

    #[test]
    fn test_event_lines_skipped() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"event: message_start\ndata: a\n\ndata: b\n");
        assert_eq!(payloads, vec!["a", "b"]);
    }

    #[test]
    fn test_crlf_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"data: one\r\ndata: two\r\n");
        assert_eq!(payloads, vec!["one", "two"]);
    }
}
