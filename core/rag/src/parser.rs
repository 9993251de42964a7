//! Document parsing.
//!
//! Turns a file on disk into an ordered list of text chunks with page
//! metadata. PDF pages are extracted individually and split per page;
//! plain text and markdown are read in bounded windows so large files
//! never sit in memory whole, with carry-over between windows so the
//! splitter never sees a truncated boundary.

use std::io::Read;
use std::path::Path;

use regex::Regex;
use text_splitter::{ChunkConfig, TextSplitter};

use crate::config::SplitterConfig;
use crate::error::{RagError, Result};

/// Window size for streaming text reads.
const TEXT_WINDOW_BYTES: usize = 1024 * 1024;

/// One parsed chunk, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChunk {
    /// Chunk text
    pub content: String,
    /// 1-based page number
    pub page: Option<i32>,
}

/// File parser producing splitter-sized chunks.
pub struct DocumentParser {
    splitter: TextSplitter<text_splitter::Characters>,
    filename_pattern: Regex,
}

impl DocumentParser {
    /// Create a parser with the given splitter configuration.
    pub fn new(config: SplitterConfig) -> Result<Self> {
        let chunk_config = ChunkConfig::new(config.chunk_size)
            .with_overlap(config.chunk_overlap)
            .map_err(|e| RagError::Config(format!("Invalid splitter config: {e}")))?;

        let filename_pattern = Regex::new(r"^[\w\-. ]+$")
            .map_err(|e| RagError::Config(format!("Invalid filename pattern: {e}")))?;

        Ok(Self {
            splitter: TextSplitter::new(chunk_config),
            filename_pattern,
        })
    }

    /// Parse a file by extension.
    ///
    /// Filenames outside `^[\w\-. ]+$` and unsupported extensions are
    /// validation errors and must not be retried.
    pub fn parse_file(&self, file_path: &Path, filename: &str) -> Result<Vec<ParsedChunk>> {
        tracing::info!(filename, "parsing document");

        if !self.filename_pattern.is_match(filename) {
            return Err(RagError::Validation(format!(
                "Invalid filename format: {filename}"
            )));
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => self.parse_pdf(file_path),
            "txt" | "md" => self.parse_text(file_path),
            _ => Err(RagError::Validation(format!(
                "Unsupported file type: {filename}"
            ))),
        }
    }

    /// Page-by-page PDF extraction.
    fn parse_pdf(&self, file_path: &Path) -> Result<Vec<ParsedChunk>> {
        let pages = pdf_extract::extract_text_by_pages(file_path)
            .map_err(|e| RagError::Parse(format!("PDF extraction failed: {e}")))?;

        let mut chunks = Vec::new();
        for (i, page_text) in pages.iter().enumerate() {
            if page_text.trim().is_empty() {
                continue;
            }

            for piece in self.splitter.chunks(page_text) {
                chunks.push(ParsedChunk {
                    content: piece.to_string(),
                    page: Some(i as i32 + 1),
                });
            }
        }

        Ok(chunks)
    }

    /// Windowed read of plain text, splitting as the buffer fills.
    ///
    /// The last splitter piece of each window is carried into the next
    /// one so no chunk straddles a window boundary truncated.
    fn parse_text(&self, file_path: &Path) -> Result<Vec<ParsedChunk>> {
        let mut reader = std::fs::File::open(file_path)?;
        let mut window = vec![0u8; TEXT_WINDOW_BYTES];
        let mut pending: Vec<u8> = Vec::new();
        let mut text_buffer = String::new();
        let mut chunks = Vec::new();

        loop {
            let read = reader.read(&mut window)?;
            if read == 0 {
                break;
            }

            pending.extend_from_slice(&window[..read]);
            text_buffer.push_str(&drain_valid_utf8(&mut pending)?);

            if text_buffer.len() >= TEXT_WINDOW_BYTES * 2 {
                let pieces: Vec<String> =
                    self.splitter.chunks(&text_buffer).map(str::to_string).collect();

                if pieces.len() > 1 {
                    for piece in &pieces[..pieces.len() - 1] {
                        chunks.push(ParsedChunk {
                            content: piece.clone(),
                            page: Some(1),
                        });
                    }
                    text_buffer = pieces[pieces.len() - 1].clone();
                }
            }
        }

        if !pending.is_empty() {
            return Err(RagError::Parse(
                "File ends with an incomplete UTF-8 sequence".to_string(),
            ));
        }

        if !text_buffer.trim().is_empty() {
            for piece in self.splitter.chunks(&text_buffer) {
                chunks.push(ParsedChunk {
                    content: piece.to_string(),
                    page: Some(1),
                });
            }
        }

        Ok(chunks)
    }
}

/// Move the longest valid UTF-8 prefix out of `pending`.
fn drain_valid_utf8(pending: &mut Vec<u8>) -> Result<String> {
    let valid_up_to = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => {
            return Err(RagError::Parse(format!(
                "Invalid UTF-8 in text file: {e}"
            )))
        }
    };

    let text = String::from_utf8_lossy(&pending[..valid_up_to]).into_owned();
    pending.drain(..valid_up_to);
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parser() -> DocumentParser {
        DocumentParser::new(SplitterConfig {
            chunk_size: 50,
            chunk_overlap: 10,
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_filename() {
        let err = parser()
            .parse_file(Path::new("/tmp/x"), "../../etc/passwd")
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let err = parser()
            .parse_file(Path::new("/tmp/x.exe"), "setup.exe")
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Unsupported file type"));
    }

    #[test]
    fn test_accepts_spaces_and_dots_in_filename() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "short note").unwrap();

        let chunks = parser()
            .parse_file(temp.path(), "my notes v1.2.txt")
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "short note");
        assert_eq!(chunks[0].page, Some(1));
    }

    #[test]
    fn test_text_file_is_split() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..20 {
            writeln!(temp, "A sentence that pads the file with content.").unwrap();
        }
        temp.flush().unwrap();

        let chunks = parser().parse_file(temp.path(), "padded.md").unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.page == Some(1)));
        assert!(chunks.iter().all(|c| c.content.len() <= 50));
    }

    #[test]
    fn test_empty_text_file_yields_no_chunks() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "   \n\n ").unwrap();

        let chunks = parser().parse_file(temp.path(), "empty.txt").unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_drain_valid_utf8_keeps_partial_sequence() {
        // "é" is 0xC3 0xA9; feed the first byte only.
        let mut pending = vec![b'a', b'b', 0xC3];
        let text = drain_valid_utf8(&mut pending).unwrap();
        assert_eq!(text, "ab");
        assert_eq!(pending, vec![0xC3]);

        // Completing the sequence drains the rest.
        pending.push(0xA9);
        let text = drain_valid_utf8(&mut pending).unwrap();
        assert_eq!(text, "é");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_drain_invalid_utf8_is_parse_error() {
        let mut pending = vec![0xFF, 0xFE];
        assert!(drain_valid_utf8(&mut pending).is_err());
    }
}
