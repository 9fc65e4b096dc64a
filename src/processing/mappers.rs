//! Mapping helpers between extracted pages, chunks, and Pinecone records.

use crate::pinecone::{ChunkMetadata, ScoredChunk, VectorRecord};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{chunking::TextSplitter, loader::PageText};

/// Chunk text with the provenance needed for its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PreparedChunk {
    pub(crate) text: String,
    pub(crate) source: String,
    pub(crate) page: u32,
    pub(crate) chunk_index: u32,
    pub(crate) chunk_hash: String,
}

/// Split every page and drop blank chunks and chunks repeated within the same page.
///
/// Identical text on different pages or files is kept so each copy retains its own source and
/// page. Returns the surviving chunks and the number of duplicates skipped.
pub(crate) fn prepare_chunks(
    pages: &[PageText],
    splitter: &TextSplitter,
) -> (Vec<PreparedChunk>, usize) {
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for page in pages {
        let mut seen = HashSet::new();
        let mut chunk_index = 0;
        for text in splitter.split(&page.text) {
            if text.trim().is_empty() {
                continue;
            }
            let hash = compute_chunk_hash(&text);
            if !seen.insert(hash.clone()) {
                skipped += 1;
                continue;
            }
            prepared.push(PreparedChunk {
                text,
                source: page.source.clone(),
                page: page.page,
                chunk_index,
                chunk_hash: hash,
            });
            chunk_index += 1;
        }
    }

    (prepared, skipped)
}

/// Pair chunks with their vectors; callers guarantee equal lengths.
pub(crate) fn build_records(
    chunks: Vec<PreparedChunk>,
    vectors: Vec<Vec<f32>>,
    ingested_at: &str,
) -> Vec<VectorRecord> {
    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, values)| VectorRecord {
            id: Uuid::new_v4().to_string(),
            values,
            metadata: ChunkMetadata {
                text: chunk.text,
                source: chunk.source,
                page: chunk.page,
                chunk_index: chunk.chunk_index,
                chunk_hash: chunk.chunk_hash,
                ingested_at: ingested_at.to_string(),
            },
        })
        .collect()
}

/// Chunk texts in retrieval order, skipping hits stored without text.
pub(crate) fn context_passages(hits: Vec<ScoredChunk>) -> Vec<String> {
    hits.into_iter().filter_map(|hit| hit.text).collect()
}

/// Stable SHA-256 digest of chunk text.
pub(crate) fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for chunk metadata.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkUnit;
    use crate::processing::chunking::ChunkingSettings;

    fn splitter_with_size(chunk_size: usize) -> TextSplitter {
        TextSplitter::new(ChunkingSettings {
            chunk_size,
            overlap: 0,
            unit: ChunkUnit::Characters,
        })
        .expect("splitter")
    }

    fn splitter() -> TextSplitter {
        splitter_with_size(1000)
    }

    fn page(source: &str, page: u32, text: &str) -> PageText {
        PageText {
            source: source.into(),
            page,
            text: text.into(),
        }
    }

    #[test]
    fn prepare_chunks_keeps_repeated_text_from_other_pages() {
        let pages = vec![
            page("a.pdf", 1, "alpha"),
            page("a.pdf", 2, "beta"),
            page("b.pdf", 1, "alpha"),
            page("b.pdf", 2, "   "),
        ];

        let (chunks, skipped) = prepare_chunks(&pages, &splitter());

        let provenance: Vec<_> = chunks
            .iter()
            .map(|chunk| (chunk.text.as_str(), chunk.source.as_str(), chunk.page))
            .collect();
        assert_eq!(
            provenance,
            vec![("alpha", "a.pdf", 1), ("beta", "a.pdf", 2), ("alpha", "b.pdf", 1)]
        );
        assert_eq!(skipped, 0);
        assert_eq!(chunks[0].chunk_hash, chunks[2].chunk_hash);
        assert_eq!(chunks[1].chunk_index, 0);
    }

    #[test]
    fn prepare_chunks_skips_repeats_within_a_page() {
        let pages = vec![page("a.pdf", 1, "alpha\nalpha\ngamma")];

        let (chunks, skipped) = prepare_chunks(&pages, &splitter_with_size(5));

        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "gamma"]);
        assert_eq!(skipped, 1);
        assert_eq!(chunks[1].chunk_index, 1);
    }

    #[test]
    fn build_records_carries_metadata_and_unique_ids() {
        let chunk = |text: &str, index| PreparedChunk {
            text: text.into(),
            source: "report.pdf".into(),
            page: 3,
            chunk_index: index,
            chunk_hash: compute_chunk_hash(text),
        };
        let records = build_records(
            vec![chunk("first", 0), chunk("second", 1)],
            vec![vec![0.1], vec![0.2]],
            "2024-05-01T10:00:00Z",
        );

        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
        assert_eq!(records[1].values, vec![0.2_f32]);
        assert_eq!(records[1].metadata.text, "second");
        assert_eq!(records[1].metadata.page, 3);
        assert_eq!(records[1].metadata.chunk_index, 1);
        assert_eq!(records[1].metadata.ingested_at, "2024-05-01T10:00:00Z");
    }

    #[test]
    fn context_passages_skip_textless_hits() {
        let hit = |id: &str, text: Option<&str>| ScoredChunk {
            id: id.into(),
            score: 0.5,
            text: text.map(str::to_string),
            source: None,
            page: None,
        };
        let passages = context_passages(vec![
            hit("a", Some("one")),
            hit("b", None),
            hit("c", Some("two")),
        ]);
        assert_eq!(passages, vec!["one", "two"]);
    }

    #[test]
    fn chunk_hash_is_stable() {
        let text = "Hello, world";
        assert_eq!(compute_chunk_hash(text), compute_chunk_hash(text));
        assert_eq!(compute_chunk_hash(text).len(), 64);
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
