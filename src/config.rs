//! TOML configuration parsing and validation.
//!
//! Every field has a default, so a missing config file yields a usable
//! [`Config`]. A file that exists but fails to parse or validate is fatal.
//!
//! ```toml
//! [corpus]
//! root = "./Data"
//!
//! [index]
//! dir = "./vector_store/index"
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [generation]
//! provider = "ollama"
//! model = "llama3.2"
//! minimum_answer_words = 6
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    pub extraction: ExtractionConfig,
    pub normalize: NormalizeConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CorpusConfig {
    pub root: PathBuf,
    /// Recognized document extensions, matched case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./Data"),
            extensions: vec!["pdf".to_string(), "txt".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./vector_store/index"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractionConfig {
    /// `"lopdf"` (per-page, tolerant) or `"pdf-extract"` (whole file).
    pub backend: String,
    /// Pages whose trimmed text is shorter than this are discarded.
    pub min_page_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            backend: "lopdf".to_string(),
            min_page_chars: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NormalizeConfig {
    pub min_chars: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self { min_chars: 120 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub url: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

/// `local` (MiniLM) when fastembed is compiled in. Otherwise `hash`, which
/// only scores shared tokens and suits tests and offline smoke runs.
fn default_embedding_provider() -> String {
    if cfg!(feature = "local-embeddings") {
        "local".to_string()
    } else {
        "hash".to_string()
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ContextConfig {
    /// `"snippets"` or `"full"`.
    pub strategy: String,
    pub max_chunk_chars: usize,
    pub max_context_chars: usize,
    /// `"research"` or `"facts"`.
    pub template: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            strategy: "snippets".to_string(),
            max_chunk_chars: 220,
            max_context_chars: 800,
            template: "research".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: Option<String>,
    pub url: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Outputs with fewer words are replaced by the refusal. A coarse proxy
    /// for a non-answer, not a correctness check.
    pub minimum_answer_words: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            max_tokens: 160,
            temperature: 0.0,
            timeout_secs: 60,
            max_retries: 2,
            minimum_answer_words: 6,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive, e.g. `"warn"` or `"grounded_qa=debug"`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    match config.extraction.backend.as_str() {
        "lopdf" | "pdf-extract" => {}
        other => bail!(
            "Unknown extraction backend: '{}'. Must be lopdf or pdf-extract.",
            other
        ),
    }

    if config.corpus.extensions.is_empty() {
        bail!("corpus.extensions must list at least one extension");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate context
    if config.context.max_chunk_chars == 0 || config.context.max_context_chars == 0 {
        bail!("context.max_chunk_chars and context.max_context_chars must be > 0");
    }
    match config.context.strategy.as_str() {
        "snippets" | "full" => {}
        other => bail!(
            "Unknown context strategy: '{}'. Must be snippets or full.",
            other
        ),
    }
    match config.context.template.as_str() {
        "research" | "facts" => {}
        other => bail!(
            "Unknown prompt template: '{}'. Must be research or facts.",
            other
        ),
    }

    // Validate embedding
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" | "local" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, local, openai, or ollama.",
            other
        ),
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}
