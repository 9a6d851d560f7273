//! Hierarchical text chunking with overlap.
//!
//! Goals:
//! - Prefer paragraph boundaries, then line breaks, then sentence ends,
//!   then word boundaries, then raw character cuts, in that order.
//! - Keep consecutive chunks overlapping by a configurable number of
//!   characters so retrieval keeps cross-boundary context.
//! - Stay deterministic: identical input and policy always produce the
//!   identical sequence (content-hash dedup relies on this across restarts).
//!
//! The splitter never fails on any string input; text with no separators at
//! all falls through to hard character cuts.

use tracing::trace;

/// Separator hierarchy, coarsest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Splits `text` into ordered chunks of at most `chunk_size` characters,
/// consecutive chunks overlapping by up to `overlap` characters.
///
/// Empty (or whitespace-only) input yields an empty vector.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    let mut pieces = Vec::new();
    segment(text, 0, chunk_size, overlap, &mut pieces);

    let chunks = merge(pieces, chunk_size, overlap);
    trace!(
        "split: {} chars -> {} chunks (size={}, overlap={})",
        text.len(),
        chunks.len(),
        chunk_size,
        overlap
    );
    chunks
}

/// Recursively cuts `text` into pieces of at most `chunk_size` characters,
/// descending the separator hierarchy only for oversized pieces.
fn segment(text: &str, level: usize, chunk_size: usize, overlap: usize, out: &mut Vec<String>) {
    if char_len(text) <= chunk_size {
        out.push(text.to_string());
        return;
    }

    if level >= SEPARATORS.len() {
        hard_cut(text, chunk_size, overlap, out);
        return;
    }

    let sep = SEPARATORS[level];
    if !text.contains(sep) {
        segment(text, level + 1, chunk_size, overlap, out);
        return;
    }

    for piece in text.split_inclusive(sep) {
        if char_len(piece) <= chunk_size {
            out.push(piece.to_string());
        } else {
            segment(piece, level + 1, chunk_size, overlap, out);
        }
    }
}

/// Raw character windows of `chunk_size`, stepping by `chunk_size - overlap`.
///
/// Every window is exactly `chunk_size` characters (the final one is
/// back-extended to keep that size), so [`merge`] passes them through
/// unchanged: a full-size window never packs with a neighbor and never
/// receives a seed.
fn hard_cut(text: &str, chunk_size: usize, overlap: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut start = 0usize;
    loop {
        if start + chunk_size >= chars.len() {
            let tail_start = chars.len().saturating_sub(chunk_size);
            out.push(chars[tail_start..].iter().collect());
            break;
        }
        out.push(chars[start..start + chunk_size].iter().collect());
        start += step;
    }
}

/// Greedily packs pieces into chunks of at most `chunk_size` characters,
/// seeding each new chunk with the tail of the previous one.
fn merge(pieces: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for piece in pieces {
        let piece_chars = char_len(&piece);

        if buf_chars + piece_chars <= chunk_size {
            buf.push_str(&piece);
            buf_chars += piece_chars;
            continue;
        }

        if buf_chars > 0 {
            chunks.push(buf.clone());
        }

        // Seed the next chunk with the previous tail; shrink the seed when
        // the incoming piece already fills the window on its own.
        let mut seed_len = overlap.min(buf_chars);
        if seed_len + piece_chars > chunk_size {
            seed_len = chunk_size.saturating_sub(piece_chars);
        }
        let seed = char_tail(&buf, seed_len);

        buf_chars = char_len(&seed) + piece_chars;
        buf = seed;
        buf.push_str(&piece);
    }

    if !buf.trim().is_empty() {
        chunks.push(buf);
    }
    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`, respecting char boundaries.
fn char_tail(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let total = char_len(s);
    s.chars().skip(total.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split("", 1000, 200).is_empty());
        assert!(split("   \n\n  ", 1000, 200).is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split("a short paragraph", 1000, 200);
        assert_eq!(chunks, vec!["a short paragraph".to_string()]);
    }

    #[test]
    fn no_separator_text_falls_through_to_hard_cuts() {
        // 2500 separator-free chars, chunk 1000 / overlap 200 -> windows at
        // 0 and 800, plus the back-extended final window.
        let text: String = ('a'..='z').cycle().take(2500).collect();
        let cs: Vec<char> = text.chars().collect();
        let window = |a: usize, b: usize| -> String { cs[a..b].iter().collect() };

        let chunks = split(&text, 1000, 200);
        assert_eq!(
            chunks,
            vec![window(0, 1000), window(800, 1800), window(1500, 2500)]
        );
    }

    #[test]
    fn every_chunk_respects_the_size_limit() {
        let text = "word ".repeat(1000);
        for chunk in split(&text, 128, 32) {
            assert!(char_len(&chunk) <= 128, "chunk too big: {}", chunk.len());
        }
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let text = format!("{}\n\n{}", "alpha ".repeat(20), "beta ".repeat(20));
        let chunks = split(&text, 150, 20);
        // Both paragraphs fit a chunk each; the cut lands on the blank line,
        // and the second chunk opens with the overlap tail of the first.
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("alpha"));
        assert!(!chunks[0].contains("beta"));
        let tail: String = chunks[0].chars().skip(char_len(&chunks[0]) - 20).collect();
        assert!(chunks[1].starts_with(&tail));
        assert!(chunks[1].contains("beta"));
    }

    #[test]
    fn deterministic_output() {
        let text = "Sentence one. Sentence two. Sentence three.\n\nNext paragraph here.".repeat(40);
        assert_eq!(split(&text, 300, 60), split(&text, 300, 60));
    }

    #[test]
    fn coverage_has_no_gaps() {
        // Every chunk occurs verbatim in the input, the first is a prefix,
        // the last is a suffix, and consecutive chunks overlap, so the
        // union of chunks covers the whole text.
        let text: String = (0..2500u32)
            .map(|i| char::from_u32(0x4E00 + i).unwrap())
            .collect();
        let chunks = split(&text, 1000, 200);

        assert!(text.starts_with(&chunks[0]));
        assert!(text.ends_with(chunks.last().unwrap()));

        let mut prev_end = 0usize;
        for chunk in &chunks {
            let start = text.find(chunk.as_str()).unwrap();
            assert!(start < prev_end || prev_end == 0, "gap before chunk");
            prev_end = start + chunk.len();
        }
        assert_eq!(prev_end, text.len());
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        let text = "日本語のテキスト。".repeat(400);
        let chunks = split(&text, 100, 25);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(char_len(chunk) <= 100);
        }
    }
}
