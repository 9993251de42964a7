//! Streaming removal of model "thinking" regions.
//!
//! Text between `<think>`/`<thinking>` and the matching closing tag must
//! never reach a client. Chunks arrive at arbitrary boundaries, so the
//! scrubber keeps a small buffer for tags split across chunks: outside a
//! thinking region the buffer is flushed as soon as it cannot be the
//! prefix of a start tag; inside one, everything is discarded until the
//! closing tag appears.

/// Tags opening a thinking region.
const START_TAGS: [&str; 2] = ["<think>", "<thinking>"];

/// Tags closing a thinking region.
const END_TAGS: [&str; 2] = ["</think>", "</thinking>"];

/// Incremental thinking-tag scrubber.
#[derive(Debug, Default)]
pub struct ThinkingScrubber {
    buffer: String,
    thinking: bool,
}

impl ThinkingScrubber {
    /// Create a scrubber in the pass-through state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the text safe to emit.
    pub fn push(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);
        let mut output = String::new();

        loop {
            if self.thinking {
                match earliest_tag(&self.buffer, &END_TAGS) {
                    Some((index, tag)) => {
                        // Drop everything through the closing tag.
                        self.buffer.drain(..index + tag.len());
                        self.thinking = false;
                    }
                    // Keep buffering; the closing tag may be split
                    // across chunks.
                    None => return output,
                }
            } else {
                match earliest_tag(&self.buffer, &START_TAGS) {
                    Some((index, tag)) => {
                        output.push_str(&self.buffer[..index]);
                        self.buffer.drain(..index + tag.len());
                        self.thinking = true;
                    }
                    None => {
                        let keep_from = partial_tag_start(&self.buffer);
                        output.push_str(&self.buffer[..keep_from]);
                        self.buffer.drain(..keep_from);
                        return output;
                    }
                }
            }
        }
    }

    /// Flush whatever remains at stream end.
    ///
    /// A partial tag that never completed is emitted as-is; content still
    /// inside an unclosed thinking region is dropped.
    pub fn finish(self) -> String {
        if self.thinking {
            String::new()
        } else {
            self.buffer
        }
    }
}

/// Earliest occurrence of any of the tags.
fn earliest_tag<'a>(buffer: &str, tags: &[&'a str]) -> Option<(usize, &'a str)> {
    tags.iter()
        .filter_map(|tag| buffer.find(tag).map(|index| (index, *tag)))
        .min_by_key(|(index, _)| *index)
}

/// Byte offset from which the buffer could still become a start tag.
///
/// Everything before it is safe to emit now.
fn partial_tag_start(buffer: &str) -> usize {
    match buffer.rfind('<') {
        Some(index) => {
            let candidate = &buffer[index..];
            let is_partial = START_TAGS
                .iter()
                .any(|tag| tag.starts_with(candidate) && candidate.len() < tag.len());
            if is_partial {
                index
            } else {
                buffer.len()
            }
        }
        None => buffer.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrub_all(chunks: &[&str]) -> String {
        let mut scrubber = ThinkingScrubber::new();
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&scrubber.push(chunk));
        }
        out.push_str(&scrubber.finish());
        out
    }

    #[test]
    fn test_passthrough_without_tags() {
        assert_eq!(scrub_all(&["Hello ", "world"]), "Hello world");
    }

    #[test]
    fn test_drops_thinking_region() {
        assert_eq!(
            scrub_all(&["Hi ", "<think>", "secret", "</think>", "there"]),
            "Hi there"
        );
    }

    #[test]
    fn test_thinking_variant_tag() {
        assert_eq!(
            scrub_all(&["a<thinking>hidden</thinking>b"]),
            "ab"
        );
    }

    #[test]
    fn test_tag_split_across_chunks() {
        assert_eq!(
            scrub_all(&["Hi <th", "ink>secret</th", "ink> there"]),
            "Hi  there"
        );
    }

    #[test]
    fn test_partial_tag_that_never_completes() {
        assert_eq!(scrub_all(&["value <thr", "ee"]), "value <three");
    }

    #[test]
    fn test_lone_angle_bracket_is_emitted() {
        assert_eq!(scrub_all(&["a < b"]), "a < b");
    }

    #[test]
    fn test_unclosed_region_dropped_at_end() {
        assert_eq!(scrub_all(&["before<think>never closed"]), "before");
    }

    #[test]
    fn test_partial_tag_flushed_at_end() {
        assert_eq!(scrub_all(&["tail <thin"]), "tail <thin");
    }

    #[test]
    fn test_multiple_regions() {
        assert_eq!(
            scrub_all(&["a<think>x</think>b<thinking>y</thinking>c"]),
            "abc"
        );
    }

    #[test]
    fn test_mismatched_close_tag_still_exits() {
        // Any end tag closes the region, as in the source behavior.
        assert_eq!(scrub_all(&["a<think>x</thinking>b"]), "ab");
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let once = scrub_all(&["Hi <think>secret</think>there <not-a-tag>"]);
        let twice = scrub_all(&[once.as_str()]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_chunking_invariance() {
        let whole = "Hi <think>deep secret</think>there<thinking>more</thinking>!";
        let by_char: Vec<String> = whole.chars().map(|c| c.to_string()).collect();
        let by_char_refs: Vec<&str> = by_char.iter().map(String::as_str).collect();

        assert_eq!(scrub_all(&[whole]), scrub_all(&by_char_refs));
        assert_eq!(scrub_all(&[whole]), "Hi there!");
    }
}
