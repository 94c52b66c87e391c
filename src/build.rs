//! Index build orchestration.
//!
//! Runs the offline path: extract → normalize → chunk → embed → persist.
//! A build is always a full rebuild; the previous index is replaced only
//! once the new one has been written completely.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chunk::{chunk_pages, RecursiveSplitter};
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::extract::{load_corpus, ExtractorSet};
use crate::index::{BuildRecord, VectorIndex};
use crate::normalize::normalize_pages;
use crate::progress::{BuildProgressEvent, BuildProgressReporter, ProgressMode};

/// Counters from one build, printed as the build summary.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSummary {
    pub record: BuildRecord,
    pub files_seen: usize,
    pub pages_discarded: usize,
    pub average_chunks_per_page: f64,
    pub indexed_chunks: usize,
}

/// Build an index from `corpus` into `index_dir` with an explicit embedder.
pub async fn build_index(
    config: &Config,
    corpus: &Path,
    index_dir: &Path,
    extractors: &ExtractorSet,
    embedder: &dyn Embedder,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildSummary> {
    let extraction = load_corpus(
        corpus,
        extractors,
        config.extraction.min_page_chars,
        progress,
    )
    .await?;
    let raw_pages = extraction.pages.len();

    let (cleaned, _) = normalize_pages(extraction.pages, config.normalize.min_chars);
    let cleaned_pages = cleaned.len();

    let splitter =
        RecursiveSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
    let (chunks, chunk_stats) = chunk_pages(&cleaned, &splitter);

    let mut index = VectorIndex::build(chunks, embedder, config.embedding.batch_size, progress)
        .await
        .context("Failed to build vector index")?;

    let record = BuildRecord {
        raw_pages,
        pages_skipped: extraction.stats.pages_skipped.len(),
        files_skipped: extraction.stats.files_skipped.len(),
        cleaned_pages,
        chunks: chunk_stats.chunks,
        skipped_chunks: index.manifest().build.skipped_chunks,
    };
    index.set_build_record(record.clone());

    progress.report(BuildProgressEvent::Persisting {
        dir: index_dir.display().to_string(),
    });
    index
        .save(index_dir)
        .with_context(|| format!("Failed to write index to {}", index_dir.display()))?;

    Ok(BuildSummary {
        record,
        files_seen: extraction.stats.files_seen,
        pages_discarded: extraction.stats.pages_discarded,
        average_chunks_per_page: chunk_stats.average_per_page(),
        indexed_chunks: index.len(),
    })
}

/// `gqa build`: resolve paths and services from config, build, print the summary.
pub async fn run_build(
    config: &Config,
    corpus: Option<PathBuf>,
    index_dir: Option<PathBuf>,
    progress: ProgressMode,
) -> Result<()> {
    let corpus = corpus.unwrap_or_else(|| config.corpus.root.clone());
    let index_dir = index_dir.unwrap_or_else(|| config.index.dir.clone());

    let embedder: Arc<dyn Embedder> = create_embedder(&config.embedding)?;
    let extractors = ExtractorSet::from_config(&config.corpus, &config.extraction);
    let reporter = progress.reporter();

    tracing::info!(
        corpus = %corpus.display(),
        index = %index_dir.display(),
        embedder = %embedder.identity(),
        "starting build"
    );

    let summary = build_index(
        config,
        &corpus,
        &index_dir,
        &extractors,
        embedder.as_ref(),
        reporter.as_ref(),
    )
    .await?;

    print_summary(&corpus, &summary);
    Ok(())
}

fn print_summary(corpus: &Path, summary: &BuildSummary) {
    let r = &summary.record;
    println!("build {}", corpus.display());
    println!("  files seen: {}", summary.files_seen);
    println!("  files skipped: {}", r.files_skipped);
    println!("  raw pages loaded: {}", r.raw_pages);
    println!("  pages skipped: {}", r.pages_skipped);
    println!("  pages discarded: {}", summary.pages_discarded);
    println!("  cleaned pages: {}", r.cleaned_pages);
    println!("  chunks: {}", r.chunks);
    println!(
        "  average chunks per page: {:.2}",
        summary.average_chunks_per_page
    );
    println!("  indexed chunks: {}", summary.indexed_chunks);
    println!("  skipped chunks: {}", r.skipped_chunks);
    println!("ok");
}
