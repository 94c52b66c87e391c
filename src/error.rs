//! Typed errors for the library boundaries.
//!
//! Command handlers in `main.rs` wrap these with `anyhow` context; the
//! library keeps them typed so callers can tell "the index is unusable"
//! apart from "the model is unreachable".

use std::path::PathBuf;

/// File-level extraction failure, or a missing corpus.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The corpus root does not exist. Fatal for a build.
    #[error("corpus root not found: {0}")]
    CorpusMissing(PathBuf),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures building, persisting, or loading a vector index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index not found at {0:?}; run `gqa build` first")]
    Missing(PathBuf),

    #[error("index at {path:?} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(
        "embedding model mismatch: index was built with {built}, current embedder is {current}"
    )]
    EmbeddingMismatch { built: String, current: String },

    #[error("no chunks to index")]
    Empty,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The generation backend failed. Distinct from a refusal.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation is disabled; set [generation] provider in config")]
    Disabled,

    #[error("generation timed out after {0}s")]
    Timeout(u64),

    #[error("generation backend error: {0}")]
    Backend(String),
}

/// Everything that can go wrong answering a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = IndexError::Missing(PathBuf::from("/tmp/idx"));
        assert!(err.to_string().contains("gqa build"));

        let err = QueryError::from(GenerationError::Timeout(60));
        assert_eq!(err.to_string(), "generation timed out after 60s");

        let err = IndexError::EmbeddingMismatch {
            built: "hash/fnv (384)".into(),
            current: "local/bge (768)".into(),
        };
        assert!(err.to_string().contains("hash/fnv (384)"));
    }
}
