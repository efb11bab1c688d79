//! Terminal transcript reconstruction.
//!
//! Folds an ordered stream of text fragments into the visible transcript,
//! applying backspace as "delete the previous character". The fold holds no
//! state besides the current string, so the result depends only on the
//! sequence of characters, never on how they were split into chunks.

use coderun_types::TextSource;
use tracing::trace;

/// Backspace control character.
pub const BACKSPACE: char = '\u{8}';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptReconstructor {
    text: String,
}

impl TranscriptReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one character. Backspace on an empty transcript is a no-op.
    pub fn push(&mut self, ch: char) {
        if ch == BACKSPACE {
            self.text.pop();
        } else {
            self.text.push(ch);
        }
    }

    /// Apply every character of `text` in order.
    pub fn append(&mut self, text: &str) {
        for ch in text.chars() {
            self.push(ch);
        }
    }

    /// Append a fragment from one source. Callers serialise sources; the
    /// reconstructor never reorders.
    pub fn append_chunk(&mut self, source: TextSource, text: &str) {
        trace!(
            target: "coderun::transcript",
            "Appending {} chars from {:?}",
            text.chars().count(),
            source
        );
        self.append(text);
    }

    /// Append a note on its own line, keeping everything before it.
    pub fn annotate(&mut self, note: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.append(note);
        self.text.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Drop everything. Only used when a new run begins.
    pub(crate) fn clear(&mut self) {
        self.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fold(chunks: &[&str]) -> String {
        let mut transcript = TranscriptReconstructor::new();
        for chunk in chunks {
            transcript.append(chunk);
        }
        transcript.as_str().to_string()
    }

    #[test]
    fn test_backspace_removes_previous_char() {
        assert_eq!(fold(&["AB\u{8}"]), "A");
        assert_eq!(fold(&["A", "B", "\u{8}"]), "A");
        assert_eq!(fold(&["abc\u{8}\u{8}x"]), "ax");
    }

    #[test]
    fn test_backspace_on_empty_is_noop() {
        assert_eq!(fold(&["\u{8}"]), "");
        assert_eq!(fold(&["\u{8}\u{8}a\u{8}\u{8}"]), "");
        assert_eq!(fold(&["\u{8}hi"]), "hi");
    }

    #[test]
    fn test_backspace_removes_whole_multibyte_char() {
        assert_eq!(fold(&["né\u{8}"]), "n");
        assert_eq!(fold(&["ok 👍", "\u{8}"]), "ok ");
    }

    #[test]
    fn test_sources_share_one_transcript() {
        let mut transcript = TranscriptReconstructor::new();
        transcript.append_chunk(TextSource::Remote, "Enter number: ");
        transcript.append_chunk(TextSource::LocalEcho, "4");
        transcript.append_chunk(TextSource::LocalEcho, "2");
        transcript.append_chunk(TextSource::LocalEcho, "\n");
        transcript.append_chunk(TextSource::Remote, "You entered: 42\n");
        assert_eq!(transcript.as_str(), "Enter number: 42\nYou entered: 42\n");
    }

    #[test]
    fn test_annotate_starts_on_new_line() {
        let mut transcript = TranscriptReconstructor::new();
        transcript.annotate("failed");
        assert_eq!(transcript.as_str(), "failed\n");

        let mut transcript = TranscriptReconstructor::new();
        transcript.append("partial");
        transcript.annotate("failed");
        assert_eq!(transcript.as_str(), "partial\nfailed\n");

        let mut transcript = TranscriptReconstructor::new();
        transcript.append("line\n");
        transcript.annotate("failed");
        assert_eq!(transcript.as_str(), "line\nfailed\n");
    }

    fn transcript_char() -> impl Strategy<Value = char> {
        prop_oneof![
            3 => proptest::char::range('a', 'z'),
            1 => Just('\n'),
            2 => Just(BACKSPACE),
            1 => Just('é'),
        ]
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_result(
            chars in proptest::collection::vec(transcript_char(), 0..64),
            cuts in proptest::collection::vec(0usize..64, 0..8),
        ) {
            let whole: String = chars.iter().collect();

            let mut boundaries: Vec<usize> = cuts.into_iter().map(|c| c.min(chars.len())).collect();
            boundaries.push(0);
            boundaries.push(chars.len());
            boundaries.sort_unstable();
            boundaries.dedup();

            let mut chunked = TranscriptReconstructor::new();
            for window in boundaries.windows(2) {
                let piece: String = chars[window[0]..window[1]].iter().collect();
                chunked.append(&piece);
            }

            let mut single = TranscriptReconstructor::new();
            single.append(&whole);

            let mut per_char = TranscriptReconstructor::new();
            for ch in &chars {
                per_char.push(*ch);
            }

            prop_assert_eq!(chunked.as_str(), single.as_str());
            prop_assert_eq!(per_char.as_str(), single.as_str());
        }

        #[test]
        fn prop_length_never_exceeds_printable_count(
            chars in proptest::collection::vec(transcript_char(), 0..64),
        ) {
            let mut transcript = TranscriptReconstructor::new();
            for ch in &chars {
                transcript.push(*ch);
            }
            let printable = chars.iter().filter(|c| **c != BACKSPACE).count();
            prop_assert!(transcript.as_str().chars().count() <= printable);
        }
    }
}
