//! Query-time retrieval over a loaded index.

use std::path::Path;
use std::sync::Arc;

use crate::embedding::{embed_query, Embedder};
use crate::error::{IndexError, QueryError};
use crate::index::VectorIndex;
use crate::models::ScoredChunk;

/// A loaded index paired with the embedder that must match it.
///
/// Cheap to clone; clones share the same read-only index.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    /// Load `dir` and verify it was built with `embedder`.
    pub fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        let index = VectorIndex::load(dir)?;
        Self::new(Arc::new(index), embedder)
    }

    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        index.check_embedder(embedder.identity())?;
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// A blank query or `k = 0` returns nothing without touching the embedder.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, QueryError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| QueryError::Embedding(format!("{:#}", e)))?;

        let hits = self.index.search(&vector, k);
        tracing::debug!(
            k,
            hits = hits.len(),
            top = hits.first().map(|h| h.score).unwrap_or(0.0),
            "retrieved"
        );
        Ok(hits)
    }
}
