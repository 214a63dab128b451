//! Overlap-based text chunking
//!
//! Splits refined text into chunks of at most `chunk_size` characters where
//! each chunk after the first carries the trailing `overlap` characters of
//! its predecessor as a prefix. `merge` is the lossless inverse: for any
//! text and any valid parameters, `merge(split(text)) == normalize(text)`.

use crate::config::ChunkConfig;
use crate::error::{Error, Result};

/// Normalize line endings to `\n`
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Overlap chunker with fixed parameters
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. Fails unless `chunk_size > overlap`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size <= overlap {
            return Err(Error::Validation(format!(
                "chunk_size ({}) must be greater than overlap ({})",
                chunk_size, overlap
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into overlapping chunks.
    ///
    /// The normalized text is partitioned into consecutive segments of at
    /// most `chunk_size - overlap` characters, cutting at whitespace where
    /// possible. Chunk i is the trailing `overlap` characters of chunk i-1
    /// followed by segment i; the first chunk carries no prefix.
    pub fn split(&self, text: &str) -> Vec<String> {
        let text = normalize_line_endings(text);
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let width = self.chunk_size - self.overlap;

        let mut segments: Vec<Vec<char>> = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let hard_end = usize::min(start + width, chars.len());
            let cut = if hard_end < chars.len()
                && !chars[hard_end].is_whitespace()
                && !chars[hard_end - 1].is_whitespace()
            {
                // Cut would land mid-word; back up to the last whitespace in
                // this segment. A single word longer than the width is split.
                match chars[start..hard_end].iter().rposition(|c| c.is_whitespace()) {
                    Some(pos) => start + pos + 1,
                    None => hard_end,
                }
            } else {
                hard_end
            };
            segments.push(chars[start..cut].to_vec());
            start = cut;
        }

        let mut chunks: Vec<String> = Vec::with_capacity(segments.len());
        let mut prev: Vec<char> = Vec::new();
        for (i, seg) in segments.into_iter().enumerate() {
            if i == 0 || self.overlap == 0 {
                chunks.push(seg.iter().collect());
                prev = seg;
                continue;
            }
            let tail_start = prev.len().saturating_sub(self.overlap);
            let mut chunk: Vec<char> = prev[tail_start..].to_vec();
            chunk.extend_from_slice(&seg);
            chunks.push(chunk.iter().collect());
            prev = chunk;
        }
        chunks
    }

    /// Reassemble chunks produced by [`split`](Self::split).
    ///
    /// For each consecutive pair the expected overlap is the trailing
    /// `min(overlap, len(merged), len(chunk))` characters of the text merged
    /// so far. A matching prefix is dropped; a mismatch (chunks edited
    /// independently) concatenates without dropping rather than erroring.
    pub fn merge(&self, chunks: &[String]) -> String {
        let mut merged: Vec<char> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let cur: Vec<char> = chunk.chars().collect();
            if i == 0 {
                merged = cur;
                continue;
            }
            let k = self.overlap.min(merged.len()).min(cur.len());
            if k > 0 && merged[merged.len() - k..] == cur[..k] {
                merged.extend_from_slice(&cur[k..]);
            } else {
                merged.extend_from_slice(&cur);
            }
        }
        merged.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str, chunk_size: usize, overlap: usize) {
        let chunker = Chunker::new(chunk_size, overlap).unwrap();
        let chunks = chunker.split(text);
        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= chunk_size,
                "chunk exceeds chunk_size: {} chars",
                chunk.chars().count()
            );
        }
        assert_eq!(chunker.merge(&chunks), normalize_line_endings(text));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(Chunker::new(10, 10), Err(Error::Validation(_))));
        assert!(matches!(Chunker::new(5, 10), Err(Error::Validation(_))));
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        let chunker = Chunker::new(100, 10).unwrap();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\t  \r\n").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::new(100, 10).unwrap();
        let chunks = chunker.split("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
        assert_eq!(chunker.merge(&chunks), "hello world");
    }

    #[test]
    fn test_first_chunk_has_no_prefix() {
        let chunker = Chunker::new(20, 5).unwrap();
        let text = "alpha beta gamma delta epsilon zeta";
        let chunks = chunker.split(text);
        assert!(chunks.len() > 1);
        assert!(text.starts_with(&chunks[0]));
    }

    #[test]
    fn test_overlap_prefix_matches_previous_tail() {
        let chunker = Chunker::new(20, 5).unwrap();
        let text = "the quick brown fox jumps over the lazy dog again and again";
        let chunks = chunker.split(text);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let tail: String = prev[prev.len().saturating_sub(5)..].iter().collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn test_round_trips() {
        round_trip("the quick brown fox jumps over the lazy dog", 15, 4);
        round_trip("one two three four five six seven eight nine ten", 12, 3);
        round_trip("word ".repeat(200).as_str(), 50, 10);
        round_trip("no spaces here just one enormous word", 10, 2);
        round_trip("ünïcödé tëxt wïth äccénts ünïcödé tëxt wïth äccénts", 14, 4);
        round_trip("short", 500, 50);
    }

    #[test]
    fn test_round_trip_zero_overlap() {
        round_trip("alpha beta gamma delta epsilon zeta eta theta", 10, 0);
    }

    #[test]
    fn test_round_trip_long_unbroken_word() {
        // Words longer than the segment width get hard-split.
        round_trip(&"a".repeat(137), 10, 3);
    }

    #[test]
    fn test_round_trip_pathological_narrow_width() {
        // chunk_size barely above overlap: one-character segments.
        round_trip("abcdef ghij", 10, 9);
    }

    #[test]
    fn test_crlf_normalization() {
        let chunker = Chunker::new(100, 10).unwrap();
        let chunks = chunker.split("line one\r\nline two\rline three");
        assert_eq!(chunker.merge(&chunks), "line one\nline two\nline three");
    }

    #[test]
    fn test_merge_lenient_on_edited_chunks() {
        let chunker = Chunker::new(20, 5).unwrap();
        // Chunks that were never produced by split: no shared overlap.
        let chunks = vec!["hello ".to_string(), "world".to_string()];
        assert_eq!(chunker.merge(&chunks), "hello world");
    }

    #[test]
    fn test_merge_empty_and_single() {
        let chunker = Chunker::new(20, 5).unwrap();
        assert_eq!(chunker.merge(&[]), "");
        assert_eq!(chunker.merge(&["only".to_string()]), "only");
    }

    #[test]
    fn test_twelve_hundred_char_scenario() {
        // 1,200 characters, chunk_size 500, overlap 50: expect 3 chunks and
        // exact reconstruction.
        let text = "lorem ipsum dolor sit amet consectetur adipiscing elit "
            .repeat(22)
            .chars()
            .take(1200)
            .collect::<String>();
        assert_eq!(text.chars().count(), 1200);

        let chunker = Chunker::new(500, 50).unwrap();
        let chunks = chunker.split(&text);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 500);
        }
        // Middle chunk carries the 50-char overlap on top of a full segment.
        assert!(chunks[1].chars().count() > chunks[0].chars().count());
        assert_eq!(chunker.merge(&chunks), text);
    }
}
