//! Corpus traversal and fault-tolerant page extraction.
//!
//! The corpus root holds one directory per domain; each domain directory
//! holds document files. Every recognized file is handed to a
//! [`PageExtractor`], which returns one [`PageOutcome`] per page.
//!
//! Failures never abort the run (except a missing corpus root):
//! - a file that cannot be opened or parsed is recorded as a [`FileSkip`];
//! - a page that cannot be parsed is recorded as a [`PageSkip`];
//! - a page whose trimmed text is shorter than `min_page_chars` is discarded.
//!
//! Files are extracted in parallel on the blocking pool, then reassembled
//! in traversal order (domains by name, files by name, pages in order) so
//! the output is deterministic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::config::{CorpusConfig, ExtractionConfig};
use crate::error::ExtractError;
use crate::models::{PageRecord, Provenance};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

/// Result of extracting a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Raw page text, untrimmed.
    Text(String),
    /// The page could not be parsed.
    Failed { reason: String },
}

/// Produces per-page text for one document file.
///
/// Outcomes are returned in page order; page numbers are assigned by
/// position (first outcome is page 1). A file-level failure is an `Err`.
pub trait PageExtractor: Send + Sync {
    fn name(&self) -> &str;
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageOutcome>, ExtractError>;
}

/// PDF backend that parses the document once and extracts each page
/// independently, so one broken page does not lose the rest.
pub struct LopdfExtractor;

impl PageExtractor for LopdfExtractor {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageOutcome>, ExtractError> {
        let doc = lopdf::Document::load(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(ExtractError::Pdf("document has no pages".to_string()));
        }
        Ok(pages
            .keys()
            .map(|&number| match doc.extract_text(&[number]) {
                Ok(text) => PageOutcome::Text(text),
                Err(e) => PageOutcome::Failed {
                    reason: e.to_string(),
                },
            })
            .collect())
    }
}

/// PDF backend using `pdf-extract`. Better text layout, but any failure
/// fails the whole file.
pub struct PdfExtractExtractor;

impl PageExtractor for PdfExtractExtractor {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageOutcome>, ExtractError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::io(path, e))?;
        let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        Ok(pages.into_iter().map(PageOutcome::Text).collect())
    }
}

/// Plain-text documents. Pages are separated by form feed (`\x0c`).
pub struct PlainTextExtractor;

impl PageExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "text"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageOutcome>, ExtractError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::io(path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text
            .split('\x0c')
            .map(|page| PageOutcome::Text(page.to_string()))
            .collect())
    }
}

/// Maps recognized file extensions to extractors.
#[derive(Clone)]
pub struct ExtractorSet {
    extensions: Vec<String>,
    pdf: Arc<dyn PageExtractor>,
    text: Arc<dyn PageExtractor>,
}

impl ExtractorSet {
    pub fn new(
        extensions: &[String],
        pdf: Arc<dyn PageExtractor>,
        text: Arc<dyn PageExtractor>,
    ) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            pdf,
            text,
        }
    }

    /// Build the extractor set described by the configuration.
    pub fn from_config(corpus: &CorpusConfig, extraction: &ExtractionConfig) -> Self {
        let pdf: Arc<dyn PageExtractor> = match extraction.backend.as_str() {
            "pdf-extract" => Arc::new(PdfExtractExtractor),
            _ => Arc::new(LopdfExtractor),
        };
        Self::new(&corpus.extensions, pdf, Arc::new(PlainTextExtractor))
    }

    /// The extractor for `path`, or `None` if its extension is not recognized.
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn PageExtractor>> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        if !self.extensions.iter().any(|e| *e == ext) {
            return None;
        }
        match ext.as_str() {
            "pdf" => Some(self.pdf.clone()),
            "txt" => Some(self.text.clone()),
            _ => None,
        }
    }
}

/// A recognized document found during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub path: PathBuf,
    pub domain: String,
    pub source: String,
}

/// A file that could not be extracted at all.
#[derive(Debug, Clone)]
pub struct FileSkip {
    pub path: PathBuf,
    pub reason: String,
}

/// A single page that could not be extracted.
#[derive(Debug, Clone)]
pub struct PageSkip {
    pub metadata: Provenance,
    pub reason: String,
}

/// Counters and skip reasons for one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractStats {
    pub files_seen: usize,
    pub files_skipped: Vec<FileSkip>,
    pub pages_skipped: Vec<PageSkip>,
    /// Pages that parsed but carried too little text.
    pub pages_discarded: usize,
}

/// Output of [`load_corpus`].
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub pages: Vec<PageRecord>,
    pub stats: ExtractStats,
}

/// Pages and skips from a single document.
#[derive(Debug, Clone, Default)]
pub struct FileExtraction {
    pub pages: Vec<PageRecord>,
    pub pages_skipped: Vec<PageSkip>,
    pub pages_discarded: usize,
}

/// List recognized documents under `root`, in deterministic order.
///
/// Only immediate subdirectories of `root` are domains, and only files
/// directly inside a domain directory are considered.
pub fn discover_documents(
    root: &Path,
    extractors: &ExtractorSet,
) -> Result<Vec<DocumentFile>, ExtractError> {
    if !root.is_dir() {
        return Err(ExtractError::CorpusMissing(root.to_path_buf()));
    }

    let mut files = Vec::new();

    let domains = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in domains {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let domain = entry.file_name().to_string_lossy().to_string();

        let docs = WalkDir::new(entry.path())
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for doc in docs {
            let doc = match doc {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(domain = %domain, error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !doc.file_type().is_file() || extractors.for_path(doc.path()).is_none() {
                continue;
            }
            files.push(DocumentFile {
                path: doc.path().to_path_buf(),
                domain: domain.clone(),
                source: doc.file_name().to_string_lossy().to_string(),
            });
        }
    }

    Ok(files)
}

/// Extract one document, applying the minimum page length filter.
pub fn extract_document(
    file: &DocumentFile,
    extractor: &dyn PageExtractor,
    min_page_chars: usize,
) -> Result<FileExtraction, ExtractError> {
    let outcomes = extractor.extract_pages(&file.path)?;
    let mut out = FileExtraction::default();

    for (idx, outcome) in outcomes.into_iter().enumerate() {
        let metadata = Provenance {
            source: file.source.clone(),
            domain: file.domain.clone(),
            page: idx as u32 + 1,
        };
        match outcome {
            PageOutcome::Text(raw) => {
                let text = raw.trim();
                if text.is_empty() || text.chars().count() < min_page_chars {
                    out.pages_discarded += 1;
                    continue;
                }
                out.pages.push(PageRecord {
                    text: text.to_string(),
                    metadata,
                });
            }
            PageOutcome::Failed { reason } => {
                tracing::debug!(source = %metadata.source, page = metadata.page, %reason, "page skipped");
                out.pages_skipped.push(PageSkip { metadata, reason });
            }
        }
    }

    Ok(out)
}

/// Walk the corpus and extract every recognized document.
///
/// Fails only if `root` does not exist.
pub async fn load_corpus(
    root: &Path,
    extractors: &ExtractorSet,
    min_page_chars: usize,
    progress: &dyn BuildProgressReporter,
) -> Result<Extraction, ExtractError> {
    let files = discover_documents(root, extractors)?;
    let total = files.len() as u64;

    let mut handles = Vec::with_capacity(files.len());
    for file in files {
        let Some(extractor) = extractors.for_path(&file.path) else {
            continue;
        };
        let task_file = file.clone();
        let handle = tokio::task::spawn_blocking(move || {
            extract_document(&task_file, extractor.as_ref(), min_page_chars)
        });
        handles.push((file, handle));
    }

    let mut extraction = Extraction::default();

    for (n, (file, handle)) in handles.into_iter().enumerate() {
        extraction.stats.files_seen += 1;

        let outcome = match handle.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            // Some PDF parsers panic on malformed input; treat it like any
            // other unreadable file.
            Err(join_err) => Err(format!("extractor aborted: {}", join_err)),
        };

        match outcome {
            Ok(doc) => {
                extraction.stats.pages_discarded += doc.pages_discarded;
                extraction.stats.pages_skipped.extend(doc.pages_skipped);
                extraction.pages.extend(doc.pages);
            }
            Err(reason) => {
                tracing::warn!(file = %file.path.display(), %reason, "skipping document");
                extraction.stats.files_skipped.push(FileSkip {
                    path: file.path.clone(),
                    reason,
                });
            }
        }

        progress.report(BuildProgressEvent::Extracting {
            source: format!("{}/{}", file.domain, file.source),
            n: n as u64 + 1,
            total,
        });
    }

    tracing::info!(
        files = extraction.stats.files_seen,
        pages = extraction.pages.len(),
        skipped_pages = extraction.stats.pages_skipped.len(),
        skipped_files = extraction.stats.files_skipped.len(),
        "extraction finished"
    );

    Ok(extraction)
}
