//! Fixed-size sliding-window chunking with overlap.

use std::time::Instant;

use crate::error::ChunkingError;
use crate::models::{CHUNK_INDEX_KEY, Chunk, ChunkingConfig, Metadata, SOURCE_ID_KEY};
use crate::observability::{SharedMetricsHook, elapsed_ms, names, noop_hook};

const UNKNOWN_SOURCE: &str = "unknown";

/// Splits text into windows of `chunk_size` characters, each starting
/// `chunk_size - overlap` characters after the previous one.
#[derive(Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    metrics: SharedMetricsHook,
}

impl std::fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        validate(chunk_size, overlap)?;
        Ok(Self {
            chunk_size,
            overlap,
            metrics: noop_hook(),
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkingError> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn with_metrics_hook(mut self, hook: SharedMetricsHook) -> Self {
        self.metrics = hook;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk `text`, copying `metadata` into every chunk with its `chunk_index`.
    pub fn chunk(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        let start = Instant::now();
        let chunks = split(text, self.chunk_size, self.overlap, metadata);

        self.metrics
            .record_latency(names::CHUNKING_DURATION, elapsed_ms(start), &[]);
        self.metrics
            .increment(names::CHUNKING_CHUNKS_CREATED, chunks.len() as u64, &[]);
        chunks
    }
}

/// Chunk `text` in one call. See [`TextChunker`].
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    metadata: &Metadata,
) -> Result<Vec<Chunk>, ChunkingError> {
    Ok(TextChunker::new(chunk_size, overlap)?.chunk(text, metadata))
}

fn validate(chunk_size: usize, overlap: usize) -> Result<(), ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            overlap,
            chunk_size,
        });
    }
    Ok(())
}

fn split(text: &str, chunk_size: usize, overlap: usize, metadata: &Metadata) -> Vec<Chunk> {
    // Byte offset of every char boundary, plus the end of the string, so that
    // character windows can be sliced without re-walking the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let source_id = metadata
        .get(SOURCE_ID_KEY)
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

    let step = chunk_size - overlap;
    let mut chunks = Vec::with_capacity(total_chars.div_ceil(step));
    let mut start = 0;

    while start < total_chars {
        let end = (start + chunk_size).min(total_chars);

        let mut chunk_metadata = metadata.clone();
        chunk_metadata.insert(CHUNK_INDEX_KEY.to_string(), chunks.len().into());

        chunks.push(Chunk {
            chunk_id: Chunk::generate_id(&source_id, start, end),
            text: text[boundaries[start]..boundaries[end]].to_string(),
            offset_start: start,
            offset_end: end,
            metadata: chunk_metadata,
        });

        if end == total_chars {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::observability::testing::RecordingHook;

    fn source(id: &str) -> Metadata {
        json!({ "source_id": id }).as_object().cloned().unwrap()
    }

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    /// Rebuild the source by dropping the leading `overlap` chars of every chunk after the first.
    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    c.text.clone()
                } else {
                    c.text.chars().skip(overlap).collect()
                }
            })
            .collect()
    }

    #[test]
    fn test_single_chunk_when_text_fits() {
        let chunks = chunk_text("hello", 10, 0, &source("doc1")).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!((chunks[0].offset_start, chunks[0].offset_end), (0, 5));
        assert_eq!(chunks[0].chunk_id, "doc1:0:5");
    }

    #[test]
    fn test_multiple_chunks_without_overlap() {
        let chunks = chunk_text("abcdefghij", 4, 0, &source("doc1")).unwrap();

        assert_eq!(texts(&chunks), ["abcd", "efgh", "ij"]);
        let offsets: Vec<_> = chunks
            .iter()
            .map(|c| (c.offset_start, c.offset_end))
            .collect();
        assert_eq!(offsets, [(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn test_overlap_creates_overlapping_chunks() {
        let chunks = chunk_text("abcdefgh", 4, 2, &source("doc1")).unwrap();
        assert_eq!(texts(&chunks), ["abcd", "cdef", "efgh"]);
    }

    #[test]
    fn test_reconstructs_original_text() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(7);
        for (size, overlap) in [(10, 3), (16, 0), (7, 6), (500, 100), (1, 0)] {
            let chunks = chunk_text(&text, size, overlap, &Metadata::new()).unwrap();
            assert_eq!(reconstruct(&chunks, overlap), text, "size={size} overlap={overlap}");
            for pair in chunks.windows(2) {
                assert_eq!(pair[1].offset_start, pair[0].offset_end - overlap);
            }
        }
    }

    #[test]
    fn test_multibyte_text_is_split_on_chars() {
        let text = "héllo wörld ✓ ünïcode";
        let chunks = chunk_text(text, 5, 2, &Metadata::new()).unwrap();

        assert!(chunks.iter().all(|c| c.text.chars().count() <= 5));
        assert_eq!(reconstruct(&chunks, 2), text);
        assert_eq!(chunks.last().unwrap().offset_end, text.chars().count());
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 4, 1, &Metadata::new()).unwrap().is_empty());
    }

    #[test]
    fn test_chunk_id_uses_unknown_without_source_id() {
        let chunks = chunk_text("hello", 10, 0, &Metadata::new()).unwrap();
        assert_eq!(chunks[0].chunk_id, "unknown:0:5");
    }

    #[test]
    fn test_metadata_copied_with_chunk_index() {
        let metadata = json!({"source_id": "doc1", "author": "test"})
            .as_object()
            .cloned()
            .unwrap();
        let chunks = chunk_text("abcdefgh", 4, 0, &metadata).unwrap();

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata["author"], "test");
            assert_eq!(chunk.metadata["source_id"], "doc1");
            assert_eq!(chunk.chunk_index(), Some(i as u64));
        }
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let err = chunk_text("text", 0, 0, &Metadata::new()).unwrap_err();
        assert!(matches!(err, ChunkingError::InvalidChunkSize));
        assert_eq!(err.to_string(), "chunk_size must be > 0");
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_chunk_size() {
        for overlap in [5, 10] {
            let err = chunk_text("text", 5, overlap, &Metadata::new()).unwrap_err();
            assert!(matches!(err, ChunkingError::OverlapTooLarge { .. }));
            assert!(err.to_string().starts_with("overlap must be < chunk_size"));
        }
    }

    #[test]
    fn test_reports_metrics() {
        let hook = Arc::new(RecordingHook::default());
        let chunker = TextChunker::new(4, 0)
            .unwrap()
            .with_metrics_hook(hook.clone());

        chunker.chunk("abcdefghij", &Metadata::new());

        assert_eq!(hook.latency_names(), [names::CHUNKING_DURATION]);
        assert_eq!(hook.counter_total(names::CHUNKING_CHUNKS_CREATED), 3);
    }

    #[test]
    fn test_from_config() {
        let chunker = TextChunker::from_config(&ChunkingConfig::default()).unwrap();
        assert_eq!(chunker.chunk_size(), 1000);
        assert_eq!(chunker.overlap(), 200);
    }
}
