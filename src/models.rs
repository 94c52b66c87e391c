//! Core data models used throughout the pipeline.
//!
//! These types represent the pages, chunks, retrieval results, and answers
//! that flow through the build path (extract → normalize → chunk → index)
//! and the query path (retrieve → context → answer).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a piece of text came from: file name, domain folder, 1-based page.
///
/// Two chunks with equal provenance are cited once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// File name of the source document (no directory components).
    pub source: String,
    /// Top-level corpus folder the document lives in.
    pub domain: String,
    /// 1-based page number within the document.
    pub page: u32,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, page {})", self.source, self.domain, self.page)
    }
}

/// A single extracted page, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub text: String,
    pub metadata: Provenance,
}

/// A page whose text has been cleaned by [`crate::normalize`].
///
/// Same shape as [`PageRecord`]; the distinct type marks that the text is
/// normalized and at least the configured minimum length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedPage {
    pub text: String,
    pub metadata: Provenance,
}

/// A bounded slice of a cleaned page, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic UUID (v5) derived from provenance and `chunk_index`.
    pub id: String,
    /// Position of this chunk within its page, starting at 0.
    pub chunk_index: u32,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub metadata: Provenance,
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Evidence assembled for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBlock {
    pub text: String,
    pub citations: Vec<Provenance>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Final result of a query. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Provenance>,
    /// True when `text` is the canonical refusal.
    pub refused: bool,
}
