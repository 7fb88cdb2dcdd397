//! Overlapping text chunker.
//!
//! Splits document content into windows of at most `chunk_size` characters,
//! with consecutive windows from the same document overlapping by exactly
//! `chunk_overlap` characters. Cuts prefer paragraph boundaries, then line,
//! sentence, and word boundaries; a hard character cut is the last resort.

use crate::models::Document;

/// Boundary candidates, tried in order. The cut is placed after the last
/// occurrence of the first separator present in the window.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split `text` into overlapping windows.
///
/// Every returned piece is at most `chunk_size` characters. Adjacent pieces
/// overlap by exactly `chunk_overlap` characters, except that the final
/// piece simply runs to the end of the text. Empty or whitespace-only text
/// yields no pieces.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    debug_assert!(chunk_overlap < chunk_size);

    if text.trim().is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, including the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    let total_chars = bounds.len() - 1;

    let mut pieces = Vec::new();
    let mut start = 0usize; // char index

    loop {
        if total_chars - start <= chunk_size {
            pieces.push(text[bounds[start]..].to_string());
            break;
        }

        let window = &text[bounds[start]..bounds[start + chunk_size]];
        let cut = pick_cut(window, chunk_overlap);
        let piece = &window[..cut];
        let piece_chars = piece.chars().count();
        pieces.push(piece.to_string());

        // Step back by the overlap so the next window shares its prefix
        // with this piece's suffix.
        let advance = piece_chars.saturating_sub(chunk_overlap).max(1);
        start += advance;
    }

    pieces
}

/// Byte offset of the cut within `window`: just after the last occurrence of
/// the highest-priority separator found, or the full window if none applies.
///
/// A separator is only accepted when the resulting piece is longer than the
/// overlap. Otherwise a boundary near the start of the window (a leading
/// paragraph break, say) would produce a sliver of a piece and a one-char
/// advance; falling through to a lower-priority separator keeps every
/// advance positive.
fn pick_cut(window: &str, chunk_overlap: usize) -> usize {
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let cut = pos + sep.len();
            if window[..cut].chars().count() > chunk_overlap {
                return cut;
            }
        }
    }
    window.len()
}

/// Chunk a batch of documents.
///
/// Each chunk is a [`Document`] whose content is a window of the parent's
/// content and whose metadata is cloned from the parent. Chunks preserve
/// the original text order. An empty input yields an empty output.
pub fn chunk_documents(
    documents: &[Document],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Document> {
    let mut chunks = Vec::new();
    for doc in documents {
        for piece in split_text(&doc.content, chunk_size, chunk_overlap) {
            chunks.push(Document {
                content: piece,
                metadata: doc.metadata.clone(),
            });
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocMetadata, SourceKind};

    fn doc(content: &str) -> Document {
        Document {
            content: content.to_string(),
            metadata: DocMetadata {
                topic: "Diabetes".to_string(),
                kind: SourceKind::Health,
                source: "test".to_string(),
                source_type: "topic_store".to_string(),
                url: None,
                page: None,
            },
        }
    }

    #[test]
    fn short_text_single_piece() {
        let pieces = split_text("Hello, world!", 512, 50);
        assert_eq!(pieces, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(split_text("", 512, 50).is_empty());
        assert!(split_text("   \n\n ", 512, 50).is_empty());
    }

    #[test]
    fn empty_input_sequence_yields_empty_output() {
        assert!(chunk_documents(&[], 512, 50).is_empty());
    }

    #[test]
    fn every_piece_within_limit() {
        let text = "word ".repeat(400);
        for piece in split_text(&text, 100, 20) {
            assert!(piece.chars().count() <= 100, "piece too long: {}", piece.len());
        }
    }

    #[test]
    fn adjacent_pieces_overlap_exactly() {
        let text = "alpha beta gamma delta ".repeat(40);
        let overlap = 15;
        let pieces = split_text(&text, 80, overlap);
        assert!(pieces.len() > 2);
        for pair in pieces.windows(2) {
            let left: Vec<char> = pair[0].chars().collect();
            let suffix: String = left[left.len() - overlap..].iter().collect();
            let prefix: String = pair[1].chars().take(overlap).collect();
            assert_eq!(suffix, prefix);
        }
    }

    #[test]
    fn prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let pieces = split_text(&text, 60, 10);
        assert!(pieces[0].ends_with("\n\n"));
        assert!(pieces[0].starts_with('a'));
    }

    #[test]
    fn leading_paragraph_break_does_not_stall() {
        // A short title paragraph must not become the cut for every window.
        let text = format!("Title\n\n{}", "body sentence goes on. ".repeat(40));
        let overlap = 20;
        let pieces = split_text(&text, 100, overlap);
        assert!(pieces.len() < 15);
        for piece in &pieces[..pieces.len() - 1] {
            assert!(piece.chars().count() > overlap);
        }
    }

    #[test]
    fn hard_cut_without_separators() {
        let text = "x".repeat(250);
        let pieces = split_text(&text, 100, 10);
        assert!(pieces.len() > 1);
        assert_eq!(pieces[0].len(), 100);
    }

    #[test]
    fn pieces_preserve_order() {
        let text = (0..30)
            .map(|i| format!("sentence number {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let pieces = split_text(&text, 90, 10);
        let mut last_pos = 0;
        for piece in &pieces {
            // Each piece's fresh content must appear at or after the
            // previous piece's position in the source text.
            let pos = text[last_pos..].find(piece.trim_end()).map(|p| p + last_pos);
            if let Some(p) = pos {
                assert!(p >= last_pos);
                last_pos = p;
            }
        }
    }

    #[test]
    fn chunks_carry_parent_metadata() {
        let text = "para one.\n\n".repeat(30);
        let chunks = chunk_documents(&[doc(&text)], 64, 8);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert_eq!(c.metadata.topic, "Diabetes");
            assert_eq!(c.metadata.kind, SourceKind::Health);
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "über die Zuckerkrankheit ".repeat(30);
        for piece in split_text(&text, 50, 10) {
            assert!(piece.chars().count() <= 50);
        }
    }
}
