//! Word-window splitter with whitespace-aligned boundaries.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::chunking::ChunkingConfig;
use crate::types::KbError;

/// Upper bound on the byte length of a single "word". Runs of
/// non-whitespace longer than this are hard-split at char boundaries so
/// pathological whitespace-free input still produces bounded chunks.
pub const MAX_WORD_BYTES: usize = 2048;

/// A contiguous passage of a document, the atomic retrievable unit.
///
/// `text` is always an exact slice of the parent document
/// (`document[start_offset..end_offset]`), so the overlap shared by
/// adjacent chunks is byte-identical on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    /// Byte offset of the first char of `text` in the parent document.
    pub start_offset: usize,
    /// Byte offset one past the last char of `text` in the parent document.
    pub end_offset: usize,
    pub sequence_index: usize,
}

/// Builds the deterministic chunk id for a document position.
pub fn chunk_id(document_id: &str, sequence_index: usize) -> String {
    format!("{document_id}#{sequence_index}")
}

/// Splits `text` into overlapping word windows.
///
/// Identical `(text, config)` inputs always yield identical chunk ids,
/// offsets, and spans. Empty or whitespace-only text yields an empty
/// sequence, not an error.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, KbError> {
    config.validate()?;

    let words = word_spans(text);
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let step = config.chunk_size - config.overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < words.len() {
        // A trailing window holding only words already covered by the
        // previous chunk's overlap would duplicate content verbatim.
        if start > 0 && words.len() - start <= config.overlap {
            break;
        }
        let end = (start + config.chunk_size).min(words.len());
        let byte_start = words[start].0;
        let byte_end = words[end - 1].1;
        let sequence_index = chunks.len();
        chunks.push(Chunk {
            chunk_id: chunk_id(document_id, sequence_index),
            document_id: document_id.to_string(),
            text: text[byte_start..byte_end].to_string(),
            start_offset: byte_start,
            end_offset: byte_end,
            sequence_index,
        });
        if end == words.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Byte ranges of the words in `text`: maximal runs of non-whitespace
/// segments, with oversized runs hard-split at char boundaries.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (idx, segment) in text.split_word_bound_indices() {
        if segment.chars().all(char::is_whitespace) {
            if let Some(span) = current.take() {
                push_span(&mut spans, text, span);
            }
        } else {
            match current.as_mut() {
                Some(span) => span.1 = idx + segment.len(),
                None => current = Some((idx, idx + segment.len())),
            }
        }
    }
    if let Some(span) = current.take() {
        push_span(&mut spans, text, span);
    }

    spans
}

fn push_span(spans: &mut Vec<(usize, usize)>, text: &str, span: (usize, usize)) {
    let (start, end) = span;
    if end - start <= MAX_WORD_BYTES {
        spans.push(span);
        return;
    }

    // Hard cut: emit MAX_WORD_BYTES-sized pieces, never splitting a char.
    let mut piece_start = start;
    let mut piece_end = piece_start;
    for (offset, ch) in text[start..end].char_indices() {
        let char_end = start + offset + ch.len_utf8();
        if char_end - piece_start > MAX_WORD_BYTES {
            spans.push((piece_start, piece_end));
            piece_start = piece_end;
        }
        piece_end = char_end;
    }
    if piece_end > piece_start {
        spans.push((piece_start, piece_end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg(chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig::new(chunk_size, overlap)
    }

    #[test]
    fn five_words_two_per_chunk() {
        let chunks = chunk_document("doc1", "A B C D E", &cfg(2, 0)).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["A B", "C D", "E"]);
        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["doc1#0", "doc1#1", "doc1#2"]);
        assert_eq!(chunks[1].start_offset, 4);
        assert_eq!(chunks[1].end_offset, 7);
        assert_eq!(chunks[2].sequence_index, 2);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "the quick brown fox jumps over the lazy dog";
        let first = chunk_document("d", text, &cfg(3, 1)).unwrap();
        let second = chunk_document("d", text, &cfg(3, 1)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn overlap_regions_are_byte_identical() {
        let text = "one two three four five";
        let chunks = chunk_document("d", text, &cfg(3, 1)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two three");
        assert_eq!(chunks[1].text, "three four five");
        // The shared word is the same slice of the parent on both sides.
        let shared = &text[chunks[1].start_offset..chunks[0].end_offset];
        assert_eq!(shared, "three");
        assert!(chunks[0].text.ends_with(shared));
        assert!(chunks[1].text.starts_with(shared));
    }

    #[test]
    fn trailing_window_of_pure_overlap_is_not_emitted() {
        // Four words, window 4, overlap 1: the second window would hold
        // only the already-covered final word.
        let chunks = chunk_document("d", "a b c d", &cfg(4, 1)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a b c d");
    }

    #[test]
    fn empty_and_whitespace_only_text_yield_no_chunks() {
        assert!(chunk_document("d", "", &cfg(2, 0)).unwrap().is_empty());
        assert!(chunk_document("d", "  \n\t  ", &cfg(2, 0)).unwrap().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = chunk_document("d", "a b", &cfg(2, 2)).unwrap_err();
        assert!(matches!(err, KbError::Configuration(_)));
    }

    #[test]
    fn offsets_address_the_parent_document() {
        let text = "Ein schöner Tag\n\nnoch ein Absatz über Wörter";
        let chunks = chunk_document("d", text, &cfg(4, 2)).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.text, &text[chunk.start_offset..chunk.end_offset]);
        }
    }

    #[test]
    fn oversized_words_are_hard_split() {
        let blob = "x".repeat(3 * MAX_WORD_BYTES);
        let chunks = chunk_document("d", &blob, &cfg(1, 0)).unwrap();
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.text.len() <= MAX_WORD_BYTES);
        }
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, blob);
    }

    #[test]
    fn hard_split_respects_char_boundaries() {
        let blob = "ü".repeat(2 * MAX_WORD_BYTES);
        let chunks = chunk_document("d", &blob, &cfg(1, 0)).unwrap();
        assert!(chunks.len() >= 4);
        for chunk in &chunks {
            assert_eq!(chunk.text, &blob[chunk.start_offset..chunk.end_offset]);
        }
    }

    proptest! {
        #[test]
        fn chunks_are_stable_and_cover_in_order(
            text in "[ a-zA-Z\n]{0,200}",
            chunk_size in 1usize..10,
            overlap_shift in 0usize..10,
        ) {
            let overlap = overlap_shift % chunk_size;
            let config = cfg(chunk_size, overlap);
            let first = chunk_document("doc", &text, &config).unwrap();
            let second = chunk_document("doc", &text, &config).unwrap();
            prop_assert_eq!(&first, &second);

            let mut prev_start = 0usize;
            for (idx, chunk) in first.iter().enumerate() {
                prop_assert_eq!(chunk.sequence_index, idx);
                let expected_id = format!("doc#{idx}");
                prop_assert_eq!(chunk.chunk_id.as_str(), expected_id.as_str());
                prop_assert_eq!(chunk.text.as_str(), &text[chunk.start_offset..chunk.end_offset]);
                if idx > 0 {
                    prop_assert!(chunk.start_offset > prev_start);
                }
                prev_start = chunk.start_offset;
            }

            if let (Some(first_chunk), Some(last_chunk)) = (first.first(), first.last()) {
                // Full coverage: nothing before the first word or after the last.
                prop_assert!(text[..first_chunk.start_offset].trim().is_empty());
                prop_assert!(text[last_chunk.end_offset..].trim().is_empty());
            } else {
                prop_assert!(text.trim().is_empty());
            }
        }
    }
}
