// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Size-bounded text chunker for embedding.
//!
//! Windows of [`CHUNK_SIZE`] bytes with [`CHUNK_OVERLAP`] bytes of overlap,
//! cutting at a paragraph break when one falls inside the tail of the
//! window, else at a sentence end, else at whitespace.

/// Target chunk size in bytes.
pub const CHUNK_SIZE: usize = 1200;
/// Overlap carried into the next chunk.
pub const CHUNK_OVERLAP: usize = 200;

pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_text_with(text, CHUNK_SIZE, CHUNK_OVERLAP)
}

pub(crate) fn chunk_text_with(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= size {
        return vec![text.to_string()];
    }

    let overlap = overlap.min(size / 2);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let hard_end = floor_char_boundary(text, (start + size).min(text.len()));
        let end = if hard_end < text.len() {
            find_break(text, start, hard_end, overlap)
        } else {
            hard_end
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end >= text.len() {
            break;
        }
        // Step back by the overlap but always make forward progress.
        let next = end.saturating_sub(overlap).max(start + 1);
        start = ceil_char_boundary(text, next);
    }

    chunks
}

/// Pick the best cut inside the last `overlap` bytes before `hard_end`:
/// paragraph break, then sentence end, then whitespace, else the hard cut.
fn find_break(text: &str, start: usize, hard_end: usize, overlap: usize) -> usize {
    let window_start = hard_end.saturating_sub(overlap).max(start + 1);
    let window_start = ceil_char_boundary(text, window_start);
    let window = &text[window_start..hard_end];

    if let Some(pos) = window.rfind("\n\n") {
        return window_start + pos + 2;
    }
    if let Some(pos) = window.rfind(". ") {
        return window_start + pos + 2;
    }
    if let Some(pos) = window.rfind(char::is_whitespace) {
        let cut = window_start + pos;
        return ceil_char_boundary(text, cut + 1);
    }
    hard_end
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("   \n  ").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("a short paragraph");
        assert_eq!(chunks, vec!["a short paragraph"]);
    }

    #[test]
    fn long_text_is_split_with_bounded_chunks() {
        let text = "word ".repeat(2000);
        let chunks = chunk_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= CHUNK_SIZE, "chunk of {} bytes exceeds bound", c.len());
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "word ".repeat(2000);
        let chunks = chunk_text_with(&text, 400, 100);
        // The tail of chunk N appears at the head of chunk N+1.
        let tail: String = chunks[0].chars().rev().take(20).collect::<String>()
            .chars().rev().collect();
        assert!(
            chunks[1].contains(tail.trim()),
            "expected overlap between consecutive chunks"
        );
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let para = "x".repeat(300);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = chunk_text_with(&text, 400, 150);
        // Splits land on paragraph boundaries, so chunks start with 'x' runs.
        assert!(chunks.iter().all(|c| c.starts_with('x')));
    }

    #[test]
    fn every_byte_of_input_is_covered() {
        let text = (0..500)
            .map(|i| format!("sentence number {i}. "))
            .collect::<String>();
        let chunks = chunk_text(&text);
        // Spot-check coverage: first and last sentences both present.
        assert!(chunks.first().unwrap().contains("sentence number 0."));
        assert!(chunks.last().unwrap().contains("sentence number 499."));
    }

    #[test]
    fn multibyte_input_never_panics() {
        let text = "héllo wörld ünïcode ".repeat(300);
        let chunks = chunk_text(&text);
        assert!(!chunks.is_empty());
    }
}
