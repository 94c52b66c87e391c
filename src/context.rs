//! Evidence assembly under character budgets.
//!
//! Retrieved chunks are packed in similarity order. Each snippet may be
//! capped per chunk, and the joined block (snippets separated by a blank
//! line, separators included) never exceeds the total budget. The first
//! snippet that would overflow the budget ends packing; smaller snippets
//! further down the ranking are not tried.

use crate::config::ContextConfig;
use crate::models::{ContextBlock, ScoredChunk};

const SNIPPET_SEPARATOR: &str = "\n\n";

/// How retrieved chunks are turned into evidence text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    /// Truncate every chunk to `max_chunk_chars`, then pack.
    Snippets {
        max_chunk_chars: usize,
        max_context_chars: usize,
    },
    /// Pack whole chunks.
    Full { max_context_chars: usize },
}

impl ContextStrategy {
    pub fn from_config(config: &ContextConfig) -> Self {
        match config.strategy.as_str() {
            "full" => ContextStrategy::Full {
                max_context_chars: config.max_context_chars,
            },
            _ => ContextStrategy::Snippets {
                max_chunk_chars: config.max_chunk_chars,
                max_context_chars: config.max_context_chars,
            },
        }
    }

    fn chunk_cap(&self) -> Option<usize> {
        match self {
            ContextStrategy::Snippets {
                max_chunk_chars, ..
            } => Some(*max_chunk_chars),
            ContextStrategy::Full { .. } => None,
        }
    }

    fn budget(&self) -> usize {
        match self {
            ContextStrategy::Snippets {
                max_context_chars, ..
            }
            | ContextStrategy::Full { max_context_chars } => *max_context_chars,
        }
    }
}

/// Builds a [`ContextBlock`] from ranked retrieval results.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    strategy: ContextStrategy,
}

impl ContextBuilder {
    pub fn new(strategy: ContextStrategy) -> Self {
        Self { strategy }
    }

    pub fn build(&self, hits: &[ScoredChunk]) -> ContextBlock {
        let budget = self.strategy.budget();
        let mut block = ContextBlock::default();
        let mut used = 0usize;

        for hit in hits {
            let text = hit.chunk.text.trim();
            if text.is_empty() {
                continue;
            }

            let snippet = match self.strategy.chunk_cap() {
                Some(cap) => truncate_chars(text, cap),
                None => text,
            };
            let separator = if block.text.is_empty() {
                0
            } else {
                SNIPPET_SEPARATOR.len()
            };
            let cost = separator + snippet.chars().count();
            if used + cost > budget {
                break;
            }

            if separator > 0 {
                block.text.push_str(SNIPPET_SEPARATOR);
            }
            block.text.push_str(snippet);
            used += cost;

            if !block.citations.contains(&hit.chunk.metadata) {
                block.citations.push(hit.chunk.metadata.clone());
            }
        }

        tracing::debug!(
            chars = used,
            citations = block.citations.len(),
            "assembled context"
        );
        block
    }
}

/// The longest prefix of `text` with at most `max` chars, trailing
/// whitespace removed.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end(),
        None => text,
    }
}
