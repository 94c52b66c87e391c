//! Persisted vector index.
//!
//! An index directory holds three files written together:
//!
//! | File | Contents |
//! |------|----------|
//! | `manifest.json` | format version, embedder identity, count, dims, build time, build counters |
//! | `vectors.bin` | `count × dims` little-endian `f32`, row-major |
//! | `chunks.jsonl` | one [`Chunk`] per line, in vector order |
//!
//! Row `i` of `vectors.bin` always belongs to line `i` of `chunks.jsonl`.
//! Search is exhaustive cosine similarity; corpora here are small enough
//! that a flat scan beats maintaining an ANN structure.
//!
//! Saving stages everything in a sibling directory and swaps it in with
//! renames, so a failed or interrupted build never damages the previous
//! index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder, EmbedderIdentity};
use crate::error::IndexError;
use crate::models::{Chunk, ScoredChunk};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

pub const FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const CHUNKS_FILE: &str = "chunks.jsonl";

/// Counters recorded alongside the index for `gqa stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub raw_pages: usize,
    pub pages_skipped: usize,
    pub files_skipped: usize,
    pub cleaned_pages: usize,
    pub chunks: usize,
    pub skipped_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedder: EmbedderIdentity,
    pub count: usize,
    pub dims: usize,
    pub built_at: DateTime<Utc>,
    #[serde(default)]
    pub build: BuildRecord,
}

/// An in-memory index. Immutable once built or loaded; share it with `Arc`.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    chunks: Vec<Chunk>,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Embed `chunks` in batches and assemble an index.
    ///
    /// An embedder error fails the build. A vector with the wrong length or
    /// a non-finite component drops only its chunk, counted in
    /// `build.skipped_chunks`.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
        progress: &dyn BuildProgressReporter,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }

        let identity = embedder.identity().clone();
        let dims = identity.dims;
        let total = chunks.len();
        let mut kept = Vec::with_capacity(total);
        let mut vectors = Vec::with_capacity(total * dims);
        let mut skipped = 0usize;
        let mut done = 0usize;

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder
                .embed(&texts)
                .await
                .map_err(|e| IndexError::Embedding(format!("{:#}", e)))?;

            if embedded.len() != batch.len() {
                return Err(IndexError::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }

            for (chunk, vec) in batch.iter().zip(embedded) {
                if vec.len() != dims || vec.iter().any(|x| !x.is_finite()) {
                    tracing::warn!(
                        chunk = %chunk.id,
                        source = %chunk.metadata,
                        got_dims = vec.len(),
                        "skipping chunk with unusable embedding"
                    );
                    skipped += 1;
                    continue;
                }
                vectors.extend_from_slice(&vec);
                kept.push(chunk.clone());
            }

            done += batch.len();
            progress.report(BuildProgressEvent::Embedding {
                n: done as u64,
                total: total as u64,
            });
        }

        if kept.is_empty() {
            return Err(IndexError::Empty);
        }

        tracing::info!(indexed = kept.len(), skipped, "embedded chunks");

        Ok(Self {
            manifest: IndexManifest {
                format_version: FORMAT_VERSION,
                embedder: identity,
                count: kept.len(),
                dims,
                built_at: Utc::now(),
                build: BuildRecord {
                    chunks: total,
                    skipped_chunks: skipped,
                    ..Default::default()
                },
            },
            chunks: kept,
            vectors,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Attach pipeline counters before saving.
    pub fn set_build_record(&mut self, record: BuildRecord) {
        self.manifest.build = record;
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn row(&self, i: usize) -> &[f32] {
        let dims = self.manifest.dims;
        &self.vectors[i * dims..(i + 1) * dims]
    }

    /// Chunk counts per domain, sorted by domain name.
    pub fn domain_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for chunk in &self.chunks {
            *counts.entry(chunk.metadata.domain.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Fail unless `identity` is the embedder the index was built with.
    pub fn check_embedder(&self, identity: &EmbedderIdentity) -> Result<(), IndexError> {
        if self.manifest.embedder != *identity {
            return Err(IndexError::EmbeddingMismatch {
                built: self.manifest.embedder.to_string(),
                current: identity.to_string(),
            });
        }
        Ok(())
    }

    /// The `k` most similar chunks, best first. Equal scores keep index order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, cosine_similarity(query, self.row(i))))
            .collect();
        // `sort_by` is stable, which gives the insertion-order tie break.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }

    /// Write the index to `dir`, replacing whatever is there.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        let parent = match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        fs::create_dir_all(&parent).map_err(|e| IndexError::io(&parent, e))?;

        let tag = uuid::Uuid::new_v4().simple().to_string();
        let staging = parent.join(format!(".{}.staging-{}", name, tag));

        if let Err(e) = self.write_files(&staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let backup = parent.join(format!(".{}.old-{}", name, tag));
        let had_previous = dir.exists();
        if had_previous {
            if let Err(e) = fs::rename(dir, &backup) {
                let _ = fs::remove_dir_all(&staging);
                return Err(IndexError::io(dir, e));
            }
        }

        if let Err(e) = fs::rename(&staging, dir) {
            if had_previous {
                let _ = fs::rename(&backup, dir);
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(IndexError::io(dir, e));
        }

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&backup) {
                tracing::warn!(path = %backup.display(), error = %e, "could not remove previous index");
            }
        }

        tracing::info!(dir = %dir.display(), count = self.len(), "index saved");
        Ok(())
    }

    fn write_files(&self, staging: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(staging).map_err(|e| IndexError::io(staging, e))?;

        let manifest_path = staging.join(MANIFEST_FILE);
        let manifest = serde_json::to_vec_pretty(&self.manifest)?;
        fs::write(&manifest_path, manifest).map_err(|e| IndexError::io(&manifest_path, e))?;

        let vectors_path = staging.join(VECTORS_FILE);
        fs::write(&vectors_path, vec_to_blob(&self.vectors))
            .map_err(|e| IndexError::io(&vectors_path, e))?;

        let chunks_path = staging.join(CHUNKS_FILE);
        let file = fs::File::create(&chunks_path).map_err(|e| IndexError::io(&chunks_path, e))?;
        let mut writer = BufWriter::new(file);
        for chunk in &self.chunks {
            let line = serde_json::to_string(chunk)?;
            writeln!(writer, "{}", line).map_err(|e| IndexError::io(&chunks_path, e))?;
        }
        writer.flush().map_err(|e| IndexError::io(&chunks_path, e))?;

        Ok(())
    }

    /// Load and validate an index directory.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        if !dir.is_dir() {
            return Err(IndexError::Missing(dir.to_path_buf()));
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(IndexError::corrupt(dir, "manifest.json not found"));
        }
        let raw = fs::read(&manifest_path).map_err(|e| IndexError::io(&manifest_path, e))?;
        let manifest: IndexManifest = serde_json::from_slice(&raw)
            .map_err(|e| IndexError::corrupt(dir, format!("unreadable manifest: {}", e)))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(IndexError::corrupt(
                dir,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }
        if manifest.dims == 0 || manifest.dims != manifest.embedder.dims {
            return Err(IndexError::corrupt(
                dir,
                format!(
                    "manifest dims {} disagree with embedder dims {}",
                    manifest.dims, manifest.embedder.dims
                ),
            ));
        }

        let vectors_path = dir.join(VECTORS_FILE);
        let blob = fs::read(&vectors_path)
            .map_err(|e| IndexError::corrupt(dir, format!("{}: {}", VECTORS_FILE, e)))?;
        let expected = manifest
            .count
            .checked_mul(manifest.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexError::corrupt(dir, "manifest count/dims overflow"))?;
        if blob.len() != expected {
            return Err(IndexError::corrupt(
                dir,
                format!(
                    "{} is {} bytes, expected {}",
                    VECTORS_FILE,
                    blob.len(),
                    expected
                ),
            ));
        }

        let chunks_path = dir.join(CHUNKS_FILE);
        let text = fs::read_to_string(&chunks_path)
            .map_err(|e| IndexError::corrupt(dir, format!("{}: {}", CHUNKS_FILE, e)))?;
        let mut chunks = Vec::with_capacity(manifest.count);
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let chunk: Chunk = serde_json::from_str(line).map_err(|e| {
                IndexError::corrupt(dir, format!("{} line {}: {}", CHUNKS_FILE, lineno + 1, e))
            })?;
            chunks.push(chunk);
        }
        if chunks.len() != manifest.count {
            return Err(IndexError::corrupt(
                dir,
                format!(
                    "{} has {} chunks, manifest says {}",
                    CHUNKS_FILE,
                    chunks.len(),
                    manifest.count
                ),
            ));
        }

        tracing::debug!(dir = %dir.display(), count = manifest.count, "index loaded");

        Ok(Self {
            manifest,
            chunks,
            vectors: blob_to_vec(&blob),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::Provenance;
    use crate::progress::NoProgress;
    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn chunk(i: u32, text: &str) -> Chunk {
        Chunk {
            id: format!("id-{}", i),
            chunk_index: i,
            text: text.to_string(),
            hash: String::new(),
            metadata: Provenance {
                source: "garch.pdf".into(),
                domain: if i % 2 == 0 { "volatility" } else { "factors" }.into(),
                page: 1,
            },
        }
    }

    fn sample_chunks() -> Vec<Chunk> {
        vec![
            chunk(0, "GARCH models capture volatility clustering in returns"),
            chunk(1, "Momentum portfolios sort stocks on past year returns"),
            chunk(2, "Realized variance sums squared intraday returns"),
        ]
    }

    /// Returns a NaN vector for any text containing "poison".
    struct PoisonEmbedder(HashEmbedder);

    #[async_trait]
    impl Embedder for PoisonEmbedder {
        fn identity(&self) -> &EmbedderIdentity {
            self.0.identity()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("poison") {
                        vec![f32::NAN; self.0.identity().dims]
                    } else {
                        self.0.embed_one(t)
                    }
                })
                .collect())
        }
    }

    struct FailingEmbedder(EmbedderIdentity);

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn identity(&self) -> &EmbedderIdentity {
            &self.0
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("backend unreachable")
        }
    }

    #[tokio::test]
    async fn exact_text_query_ranks_first() {
        let embedder = HashEmbedder::new(64);
        let index = VectorIndex::build(sample_chunks(), &embedder, 2, &NoProgress)
            .await
            .unwrap();
        for target in index.chunks().to_vec() {
            let q = embedder.embed_one(&target.text);
            let hits = index.search(&q, 3);
            assert_eq!(hits[0].chunk, target);
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn ties_keep_insertion_order_and_k_bounds() {
        let embedder = HashEmbedder::new(64);
        let chunks = vec![chunk(0, "same text"), chunk(1, "same text"), chunk(2, "same text")];
        let index = VectorIndex::build(chunks, &embedder, 8, &NoProgress)
            .await
            .unwrap();
        let hits = index.search(&embedder.embed_one("same text"), 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "id-0");
        assert_eq!(hits[1].chunk.id, "id-1");
        assert!(index.search(&embedder.embed_one("same text"), 0).is_empty());
        assert_eq!(index.search(&embedder.embed_one("same text"), 10).len(), 3);
    }

    #[tokio::test]
    async fn bad_vectors_skip_only_their_chunk() {
        let embedder = PoisonEmbedder(HashEmbedder::new(32));
        let mut chunks = sample_chunks();
        chunks.push(chunk(3, "poison pill"));
        let index = VectorIndex::build(chunks, &embedder, 2, &NoProgress)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.manifest().count, 3);
        assert_eq!(index.manifest().build.skipped_chunks, 1);
        assert_eq!(index.manifest().build.chunks, 4);
    }

    #[tokio::test]
    async fn embedder_failure_fails_build() {
        let embedder = FailingEmbedder(HashEmbedder::new(8).identity().clone());
        let err = VectorIndex::build(sample_chunks(), &embedder, 2, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
    }

    #[tokio::test]
    async fn empty_build_is_an_error() {
        let err = VectorIndex::build(Vec::new(), &HashEmbedder::new(8), 2, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Empty));
    }

    #[tokio::test]
    async fn save_load_round_trip_and_overwrite() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vector_store").join("index");
        let embedder = HashEmbedder::new(32);

        let first = VectorIndex::build(sample_chunks()[..1].to_vec(), &embedder, 4, &NoProgress)
            .await
            .unwrap();
        first.save(&dir).unwrap();

        let second = VectorIndex::build(sample_chunks(), &embedder, 4, &NoProgress)
            .await
            .unwrap();
        second.save(&dir).unwrap();

        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.chunks(), second.chunks());
        assert_eq!(loaded.manifest(), second.manifest());
        loaded.check_embedder(embedder.identity()).unwrap();

        let q = embedder.embed_one("realized variance intraday");
        let a: Vec<String> = loaded
            .search(&q, 3)
            .into_iter()
            .map(|h| h.chunk.id)
            .collect();
        let b: Vec<String> = second
            .search(&q, 3)
            .into_iter()
            .map(|h| h.chunk.id)
            .collect();
        assert_eq!(a, b);

        // No staging or backup directories are left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let err = VectorIndex::load(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, IndexError::Missing(_)));
    }

    #[tokio::test]
    async fn load_detects_truncated_vectors_and_missing_chunks() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        let index = VectorIndex::build(sample_chunks(), &HashEmbedder::new(16), 4, &NoProgress)
            .await
            .unwrap();
        index.save(&dir).unwrap();

        let vectors = dir.join(VECTORS_FILE);
        let mut blob = fs::read(&vectors).unwrap();
        blob.truncate(blob.len() - 4);
        fs::write(&vectors, &blob).unwrap();
        assert!(matches!(
            VectorIndex::load(&dir).unwrap_err(),
            IndexError::Corrupt { .. }
        ));

        index.save(&dir).unwrap();
        let chunks = dir.join(CHUNKS_FILE);
        let text = fs::read_to_string(&chunks).unwrap();
        let first_line = text.lines().next().unwrap().to_string();
        fs::write(&chunks, first_line).unwrap();
        assert!(matches!(
            VectorIndex::load(&dir).unwrap_err(),
            IndexError::Corrupt { .. }
        ));
    }

    #[tokio::test]
    async fn load_rejects_oversized_manifest_count() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        let index = VectorIndex::build(
            sample_chunks()[..1].to_vec(),
            &HashEmbedder::new(16),
            4,
            &NoProgress,
        )
        .await
        .unwrap();
        index.save(&dir).unwrap();

        let manifest_path = dir.join(MANIFEST_FILE);
        let mut manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
        manifest["count"] = serde_json::json!(u64::MAX);
        fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        let err = VectorIndex::load(&dir).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
        assert!(err.to_string().contains("overflow"), "{}", err);
    }

    #[tokio::test]
    async fn embedder_mismatch_is_detected() {
        let index = VectorIndex::build(sample_chunks(), &HashEmbedder::new(16), 4, &NoProgress)
            .await
            .unwrap();
        let err = index
            .check_embedder(HashEmbedder::new(32).identity())
            .unwrap_err();
        assert!(matches!(err, IndexError::EmbeddingMismatch { .. }));
    }

    #[tokio::test]
    async fn domain_counts_are_sorted() {
        let index = VectorIndex::build(sample_chunks(), &HashEmbedder::new(16), 4, &NoProgress)
            .await
            .unwrap();
        let counts: Vec<(String, usize)> = index.domain_counts().into_iter().collect();
        assert_eq!(
            counts,
            vec![("factors".to_string(), 1), ("volatility".to_string(), 2)]
        );
    }
}
