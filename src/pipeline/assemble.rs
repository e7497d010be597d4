//! Chunk assembly: group page texts into character-bounded extraction units.
//!
//! Large documents cannot be extracted in one collaborator call without
//! unbounded memory and a single monolithic progress jump. The assembler
//! plans the work instead: it walks the pages in order and packs them into
//! [`TextChunk`]s of at most `max_chars` characters each, which the
//! orchestrator then extracts one at a time with incremental progress
//! updates.
//!
//! Two invariants matter downstream:
//!
//! * **Order and completeness** — every non-empty page appears in exactly one
//!   chunk, chunks never overlap, and concatenating all chunk texts in order
//!   reproduces the concatenation of the non-empty page texts.
//! * **Oversized pages pass through** — a single page longer than the budget
//!   becomes its own oversized chunk; the assembler never splits inside a
//!   page.

use tracing::debug;

/// Default per-chunk character budget.
pub const DEFAULT_MAX_CHARS: usize = 10_000;

/// A contiguous run of pages whose combined text fits the chunk budget
/// (except for single oversized pages, which get a chunk to themselves).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// First page in the chunk (1-indexed).
    pub start_page: u32,
    /// Last page in the chunk, inclusive.
    pub end_page: u32,
    /// The chunk's pages' texts, concatenated in page order.
    pub assembled_text: String,
    /// Page numbers covered by the chunk, ascending.
    pub pages: Vec<u32>,
}

impl TextChunk {
    /// Character count of the assembled text.
    pub fn len(&self) -> usize {
        self.assembled_text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.assembled_text.is_empty()
    }
}

/// Pack `(page_number, text)` pairs into chunks of at most `max_chars`
/// characters.
///
/// Pages with empty text are skipped entirely — they contribute nothing to
/// extraction and would only pad the page ranges. A page is flushed into the
/// current chunk first and the chunk is closed once it reaches the budget,
/// so one page can push a chunk over `max_chars` but no chunk ever starts
/// above it.
pub fn assemble(page_texts: &[(u32, String)], max_chars: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut acc = String::new();
    let mut acc_chars = 0usize;
    let mut pages: Vec<u32> = Vec::new();

    for (page_number, text) in page_texts {
        if text.is_empty() {
            continue;
        }
        acc.push_str(text);
        acc_chars += text.chars().count();
        pages.push(*page_number);

        if acc_chars >= max_chars {
            chunks.push(close_chunk(&mut acc, &mut pages));
            acc_chars = 0;
        }
    }

    if !pages.is_empty() {
        chunks.push(close_chunk(&mut acc, &mut pages));
    }

    debug!(
        chunks = chunks.len(),
        budget = max_chars,
        "assembled extraction chunks"
    );
    chunks
}

fn close_chunk(acc: &mut String, pages: &mut Vec<u32>) -> TextChunk {
    let chunk_pages = std::mem::take(pages);
    TextChunk {
        start_page: chunk_pages[0],
        end_page: *chunk_pages.last().unwrap_or(&chunk_pages[0]),
        assembled_text: std::mem::take(acc),
        pages: chunk_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<(u32, String)> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| (i as u32 + 1, t.to_string()))
            .collect()
    }

    #[test]
    fn no_pages_means_no_chunks() {
        assert!(assemble(&[], 100).is_empty());
    }

    #[test]
    fn all_empty_pages_means_no_chunks() {
        assert!(assemble(&pages(&["", "", ""]), 100).is_empty());
    }

    #[test]
    fn small_document_is_a_single_chunk() {
        let chunks = assemble(&pages(&["abc", "def"]), 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_page, 1);
        assert_eq!(chunks[0].end_page, 2);
        assert_eq!(chunks[0].assembled_text, "abcdef");
        assert_eq!(chunks[0].pages, vec![1, 2]);
    }

    #[test]
    fn budget_splits_chunks_at_page_boundaries() {
        let chunks = assemble(&pages(&["aaaa", "bbbb", "cccc"]), 6);
        assert_eq!(chunks.len(), 2);
        // "aaaa" + "bbbb" reaches 8 ≥ 6 → flush; "cccc" stands alone.
        assert_eq!(chunks[0].pages, vec![1, 2]);
        assert_eq!(chunks[1].pages, vec![3]);
    }

    #[test]
    fn oversized_page_gets_its_own_chunk() {
        let big = "x".repeat(50);
        let input = vec![(1, big.clone()), (2, "tail".to_string())];
        let chunks = assemble(&input, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].pages, vec![1]);
        assert_eq!(chunks[0].assembled_text, big);
        assert_eq!(chunks[1].pages, vec![2]);
    }

    #[test]
    fn empty_pages_are_skipped_not_ranged() {
        let chunks = assemble(&pages(&["a", "", "b"]), 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].pages, vec![1, 3]);
        assert_eq!(chunks[0].assembled_text, "ab");
    }

    #[test]
    fn concatenation_is_preserved() {
        let input = pages(&["one ", "two ", "", "three ", "four"]);
        let full: String = input.iter().map(|(_, t)| t.as_str()).collect();
        for budget in [1usize, 4, 7, 1000] {
            let chunks = assemble(&input, budget);
            let joined: String = chunks.iter().map(|c| c.assembled_text.as_str()).collect();
            assert_eq!(joined, full, "budget {budget}");
        }
    }

    #[test]
    fn chunks_never_overlap() {
        let input = pages(&["aa", "bb", "cc", "dd", "ee"]);
        let chunks = assemble(&input, 3);
        let mut seen: Vec<u32> = chunks.iter().flat_map(|c| c.pages.clone()).collect();
        let deduped = {
            let mut s = seen.clone();
            s.dedup();
            s
        };
        assert_eq!(seen, deduped);
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn char_budget_counts_chars_not_bytes() {
        // Multibyte characters: 4 chars but 12 bytes each page.
        let input = vec![(1, "ééé".to_string()), (2, "ééé".to_string())];
        let chunks = assemble(&input, 6);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 6);
    }
}
