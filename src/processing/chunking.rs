//! Semantic chunking with a configurable size unit.
//!
//! Page text is split on semantic boundaries by `semchunk-rs`, then a sliding overlap is stitched
//! onto each chunk from the tail of its predecessor. Sizes and overlaps are measured either in
//! characters (the default) or in `cl100k_base` tokens counted with `tiktoken-rs`.

use crate::config::ChunkUnit;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

use super::types::ChunkingError;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const TOKEN_ENCODING: &str = "cl100k_base";

/// Chunk geometry applied to every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingSettings {
    /// Upper bound on chunk length, in `unit`.
    pub chunk_size: usize,
    /// Length carried over from the previous chunk, in `unit`.
    pub overlap: usize,
    /// How lengths are measured.
    pub unit: ChunkUnit,
}

/// Reusable splitter; the tokenizer is loaded once and shared across requests.
#[derive(Clone)]
pub struct TextSplitter {
    settings: ChunkingSettings,
    counter: TokenCounter,
}

impl std::fmt::Debug for TextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSplitter")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TextSplitter {
    /// Build a splitter, loading the tokenizer when sizes are measured in tokens.
    pub fn new(settings: ChunkingSettings) -> Result<Self, ChunkingError> {
        if settings.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        let counter = match settings.unit {
            ChunkUnit::Characters => character_counter(),
            ChunkUnit::Tokens => build_tiktoken_counter()?,
        };
        Ok(Self { settings, counter })
    }

    /// Geometry this splitter was built with.
    pub fn settings(&self) -> ChunkingSettings {
        self.settings
    }

    /// Split `text` into overlapping chunks; whitespace-only input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        chunk_text_with_counter(
            text,
            self.settings.chunk_size,
            self.settings.overlap,
            self.counter.clone(),
        )
    }
}

fn build_tiktoken_counter() -> Result<TokenCounter, ChunkingError> {
    let encoding = cl100k_base().map_err(|source: TokenizerError| ChunkingError::Tokenizer {
        encoding: TOKEN_ENCODING.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn character_counter() -> TokenCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
) -> Vec<String> {
    let overlap = overlap.min(chunk_size.saturating_sub(1));
    let counter_for_chunker = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size - overlap,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, overlap, &token_counter)
}

/// Prefix each chunk with the tail of its predecessor.
///
/// Base chunks are cut at `chunk_size - overlap`, so a tail of at most `overlap` units keeps the
/// stitched chunk within `chunk_size`. Tails always start on a word boundary.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    if overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<&str> = None;

    for current in &chunks {
        let chunk = match previous {
            Some(prior) => {
                build_overlapped_chunk(prior, current, overlap, chunk_size, token_counter)
            }
            None => current.clone(),
        };
        overlapped.push(chunk);
        previous = Some(current.as_str());
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    token_counter: &TokenCounter,
) -> String {
    let starts = word_starts(previous);
    let mut first = first_start_within(previous, &starts, overlap, token_counter);

    // Token counts are not strictly additive; shed leading words until the join fits.
    while first < starts.len() {
        let combined = join_with_tail(previous[starts[first]..].trim_end(), current);
        if token_counter.as_ref()(&combined) <= chunk_size {
            return combined;
        }
        first += 1;
    }

    current.to_string()
}

fn join_with_tail(tail: &str, current: &str) -> String {
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    combined.push_str(tail);
    if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
        combined.push(' ');
    }
    combined.push_str(current);
    combined
}

/// Byte offsets where words begin in `text`.
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut after_space = true;
    for (offset, ch) in text.char_indices() {
        let space = ch.is_whitespace();
        if after_space && !space {
            starts.push(offset);
        }
        after_space = space;
    }
    starts
}

/// Index into `starts` of the longest suffix that, with its separator, fits in `limit`.
///
/// Suffix lengths shrink as the start moves right, so a binary search needs only a
/// logarithmic number of counter calls. Returns `starts.len()` when no word fits.
fn first_start_within(
    text: &str,
    starts: &[usize],
    limit: usize,
    token_counter: &TokenCounter,
) -> usize {
    starts.partition_point(|&start| {
        let tail = format!("{} ", text[start..].trim_end());
        token_counter.as_ref()(&tail) > limit
    })
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_counter() -> TokenCounter {
        Arc::new(|segment: &str| segment.split_whitespace().count())
    }

    fn settings(chunk_size: usize, overlap: usize, unit: ChunkUnit) -> ChunkingSettings {
        ChunkingSettings {
            chunk_size,
            overlap,
            unit,
        }
    }

    #[test]
    fn chunk_text_respects_chunk_size_word_counter() {
        let chunks = chunk_text_with_counter("one two three four five", 2, 0, word_counter());
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn chunk_text_with_counter_applies_overlap() {
        let counter = word_counter();
        let chunks = chunk_text_with_counter("one two three four five", 3, 1, counter.clone());
        assert_eq!(chunks, vec!["one two", "two three four", "four five"]);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 3);
        }
    }

    #[test]
    fn splitter_rejects_zero_chunk_size() {
        let error = TextSplitter::new(settings(0, 0, ChunkUnit::Characters)).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn splitter_ignores_blank_pages() {
        let splitter = TextSplitter::new(settings(100, 20, ChunkUnit::Characters)).unwrap();
        assert!(splitter.split("   \n\t ").is_empty());
    }

    #[test]
    fn character_chunks_stay_within_budget() {
        let sentence = "Quarterly revenue grew across every region we track. ";
        let text = sentence.repeat(40);
        let splitter = TextSplitter::new(settings(200, 40, ChunkUnit::Characters)).unwrap();

        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200, "chunk too long: {}", chunk.len());
            assert!(!chunk.trim().is_empty());
        }
    }

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{i:04}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Length of the longest prefix of `next` that `previous` ends with.
    fn shared_boundary(previous: &str, next: &str) -> usize {
        (1..=previous.len().min(next.len()))
            .rev()
            .find(|&len| previous.ends_with(&next[..len]))
            .unwrap_or(0)
    }

    #[test]
    fn default_geometry_overlaps_consecutive_chunks() {
        let text = numbered_words(3000);
        let splitter = TextSplitter::new(settings(1000, 200, ChunkUnit::Characters)).unwrap();

        let chunks = splitter.split(&text);

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000, "chunk too long: {}", chunk.len());
            for word in chunk.split_whitespace() {
                assert!(
                    word.len() == 5 && word.starts_with('w'),
                    "truncated word {word:?}"
                );
            }
        }
        for pair in chunks.windows(2) {
            let shared = shared_boundary(&pair[0], &pair[1]);
            assert!(
                (150..200).contains(&shared),
                "expected ~200 chars of overlap, got {shared}"
            );
        }

        let covered: std::collections::HashSet<&str> = chunks
            .iter()
            .flat_map(|chunk| chunk.split_whitespace())
            .collect();
        for word in text.split_whitespace() {
            assert!(covered.contains(word), "lost {word}");
        }
    }

    #[test]
    fn token_chunks_overlap_within_budget() {
        let text = numbered_words(300);
        let splitter = TextSplitter::new(settings(40, 10, ChunkUnit::Tokens)).expect("tokenizer");
        let counter = build_tiktoken_counter().unwrap();

        let chunks = splitter.split(&text);

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 40);
        }
        for pair in chunks.windows(2) {
            assert!(shared_boundary(&pair[0], &pair[1]) > 0);
        }
    }

    #[test]
    fn tail_is_cut_on_word_boundary() {
        let counter = character_counter();
        let chunk = build_overlapped_chunk("alpha beta gamma", "delta", 12, 100, &counter);
        assert_eq!(chunk, "beta gamma delta");
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = TextSplitter::new(settings(1000, 200, ChunkUnit::Characters)).unwrap();
        assert_eq!(splitter.split("A short page."), vec!["A short page."]);
    }

    #[test]
    fn token_chunks_use_tiktoken_budget() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let splitter = TextSplitter::new(settings(5, 0, ChunkUnit::Tokens)).expect("tokenizer");
        let chunks = splitter.split(text);

        let counter = build_tiktoken_counter().unwrap();
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 5);
        }
        let chunk_words: Vec<&str> = chunks
            .iter()
            .flat_map(|chunk| chunk.split_whitespace())
            .collect();
        let original_words: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(chunk_words, original_words);
    }
}
