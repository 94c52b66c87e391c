//! Recursive, overlapping text chunker.
//!
//! Splits cleaned page text into [`Chunk`]s of at most `chunk_size`
//! characters. The coarsest separator present in the text is tried first
//! (paragraph, line, sentence punctuation, whitespace); pieces that are
//! still too long are split again with the finer separators, and the empty
//! separator finally cuts character by character.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text.
//! 2. Split so each separator stays attached to the start of the piece
//!    that follows it.
//! 3. Greedily merge pieces while the running length stays within
//!    `chunk_size`.
//! 4. On flush, keep the trailing pieces whose total is at most
//!    `chunk_overlap` as the start of the next chunk.
//! 5. Pieces that are too long on their own recurse with the remaining
//!    separators.
//!
//! Lengths are counted in `char`s, so no cut lands inside a UTF-8 sequence.
//! Each chunk receives a deterministic UUID derived from its provenance
//! and index, plus a SHA-256 hash of its text.
//!
//! # Example
//!
//! ```rust
//! use grounded_qa::chunk::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::new(800, 120);
//! let pieces = splitter.split_text("Short page. Still one chunk.");
//! assert_eq!(pieces, vec!["Short page. Still one chunk.".to_string()]);
//! ```

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::{Chunk, CleanedPage, Provenance};

/// Separator tiers, coarsest first. The trailing `""` is the hard cut.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "; ", ", ", " ", ""];

/// Greedy recursive splitter with character overlap.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Split `text` into trimmed, non-empty pieces of at most `chunk_size` chars.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, &sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                finer = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge_pieces(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.extend(hard_cut(piece, self.chunk_size));
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge_pieces(&fitting));
        }

        chunks
    }

    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut out, &window);
                // Drop from the front until what remains fits the overlap
                // and leaves room for the incoming piece.
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        push_joined(&mut out, &window);
        out
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split at every occurrence of `sep`, keeping `sep` at the start of the
/// following piece. The empty separator yields single characters.
fn split_keeping_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn hard_cut(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|window| window.iter().collect::<String>())
        .filter_map(|s| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Chunk counts for one chunking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChunkStats {
    pub pages: usize,
    pub chunks: usize,
}

impl ChunkStats {
    pub fn average_per_page(&self) -> f64 {
        if self.pages == 0 {
            0.0
        } else {
            self.chunks as f64 / self.pages as f64
        }
    }
}

/// Chunk a single page. Every chunk inherits the page's provenance.
pub fn chunk_page(page: &CleanedPage, splitter: &RecursiveSplitter) -> Vec<Chunk> {
    splitter
        .split_text(&page.text)
        .iter()
        .enumerate()
        .map(|(i, text)| make_chunk(&page.metadata, i as u32, text))
        .collect()
}

/// Chunk every page in order.
pub fn chunk_pages(
    pages: &[CleanedPage],
    splitter: &RecursiveSplitter,
) -> (Vec<Chunk>, ChunkStats) {
    let chunks: Vec<Chunk> = pages
        .iter()
        .flat_map(|page| chunk_page(page, splitter))
        .collect();
    let stats = ChunkStats {
        pages: pages.len(),
        chunks: chunks.len(),
    };
    tracing::info!(
        chunks = stats.chunks,
        per_page = format!("{:.2}", stats.average_per_page()),
        "chunked pages"
    );
    (chunks, stats)
}

fn make_chunk(metadata: &Provenance, index: u32, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!(
        "{}/{}#page={}&chunk={}",
        metadata.domain, metadata.source, metadata.page, index
    );

    Chunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
        metadata: metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> CleanedPage {
        CleanedPage {
            text: text.to_string(),
            metadata: Provenance {
                source: "momentum.pdf".into(),
                domain: "factors".into(),
                page: 7,
            },
        }
    }

    fn sentences(n: usize) -> String {
        (0..n)
            .map(|i| {
                format!(
                    "Sentence number {} discusses momentum decay in equity factor returns.",
                    i
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Longest k <= max such that `a` ends with the first k chars of `b`.
    fn overlap_len(a: &str, b: &str, max: usize) -> usize {
        (1..=max.min(a.len()).min(b.len()))
            .rev()
            .find(|&k| a.ends_with(&b[..k]))
            .unwrap_or(0)
    }

    #[test]
    fn short_page_yields_one_chunk() {
        let p = page("A short page about volatility clustering.");
        let chunks = chunk_page(&p, &RecursiveSplitter::new(800, 120));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, p.text);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].metadata, p.metadata);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = sentences(60);
        let splitter = RecursiveSplitter::new(800, 120);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            let len = c.chars().count();
            assert!(len <= 800, "chunk too long: {}", len);
            assert!(!c.is_empty());
        }
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let text = (0..400)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = RecursiveSplitter::new(200, 40);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let k = overlap_len(&pair[0], &pair[1], 40);
            assert!(k > 0, "no overlap between {:?} and {:?}", pair[0], pair[1]);
            assert!(k <= 40);
        }
    }

    #[test]
    fn no_text_is_lost() {
        let text = sentences(30);
        let chunks = RecursiveSplitter::new(300, 0).split_text(&text);
        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(strip(&chunks.concat()), strip(&text));
    }

    #[test]
    fn hard_cut_when_no_separator_fits() {
        let text = "x".repeat(2000);
        let chunks = RecursiveSplitter::new(800, 120).split_text(&text);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 800));
        assert_eq!(chunks[0].chars().count(), 800);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "波動率の集中 ".repeat(300);
        let chunks = RecursiveSplitter::new(100, 20).split_text(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn ids_are_deterministic_and_distinct() {
        let p = page(&sentences(40));
        let splitter = RecursiveSplitter::new(400, 60);
        let a = chunk_page(&p, &splitter);
        let b = chunk_page(&p, &splitter);
        assert_eq!(a, b);
        let ids: std::collections::HashSet<&str> = a.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), a.len());
        for (i, c) in a.iter().enumerate() {
            assert_eq!(c.chunk_index, i as u32);
            assert_eq!(c.metadata, p.metadata);
        }
    }

    #[test]
    fn chunk_stats_average() {
        let pages = vec![page(&sentences(40)), page("One small page of text.")];
        let (chunks, stats) = chunk_pages(&pages, &RecursiveSplitter::new(400, 60));
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.chunks, chunks.len());
        assert!(stats.average_per_page() > 1.0);
    }
}
