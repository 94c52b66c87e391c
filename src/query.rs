//! Online query path: retrieve → assemble context → answer.
//!
//! [`QueryEngine`] holds the long-lived services (loaded index, embedder,
//! generator) and is constructed once per process. `run_query` and
//! `run_retrieve` are the CLI handlers.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::answer::{AnswerGate, PromptTemplate};
use crate::config::Config;
use crate::context::{ContextBuilder, ContextStrategy};
use crate::embedding::{create_embedder, Embedder};
use crate::error::QueryError;
use crate::generate::{create_generator, Generator};
use crate::models::{Answer, ContextBlock, ScoredChunk};
use crate::retrieve::Retriever;

/// Retrieval, context assembly, and the answer gate wired together.
pub struct QueryEngine {
    retriever: Retriever,
    context: ContextBuilder,
    gate: AnswerGate,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, config: &Config) -> Self {
        Self {
            retriever,
            context: ContextBuilder::new(ContextStrategy::from_config(&config.context)),
            gate: AnswerGate::new(
                generator,
                &config.generation,
                PromptTemplate::from_name(&config.context.template),
            ),
            top_k: config.retrieval.top_k,
        }
    }

    /// Load the index at `index_dir` and build the configured services.
    pub fn open(config: &Config, index_dir: &Path) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = create_embedder(&config.embedding)?;
        let retriever = Retriever::open(index_dir, embedder)?;
        let generator = create_generator(&config.generation)?;
        Ok(Self::new(retriever, generator, config))
    }

    /// Retrieved chunks plus the context that would be sent for them.
    pub async fn evidence(
        &self,
        question: &str,
        k: Option<usize>,
    ) -> Result<(Vec<ScoredChunk>, ContextBlock), QueryError> {
        let hits = self
            .retriever
            .retrieve(question, k.unwrap_or(self.top_k))
            .await?;
        let block = self.context.build(&hits);
        Ok((hits, block))
    }

    /// Answer `question`, using `k` or the configured `top_k`.
    pub async fn ask(&self, question: &str, k: Option<usize>) -> Result<Answer, QueryError> {
        let (_, block) = self.evidence(question, k).await?;
        Ok(self.gate.answer(question, &block).await?)
    }
}

#[derive(Serialize)]
struct RetrieveHit<'a> {
    rank: usize,
    score: f32,
    source: &'a str,
    domain: &'a str,
    page: u32,
    chunk_index: u32,
    text: &'a str,
}

/// `gqa retrieve`: ranked chunks without generation.
pub async fn run_retrieve(
    config: &Config,
    index_dir: &Path,
    query: &str,
    k: Option<usize>,
    format: &str,
) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let retriever = Retriever::open(index_dir, embedder)
        .with_context(|| format!("Failed to open index at {}", index_dir.display()))?;
    let hits = retriever
        .retrieve(query, k.unwrap_or(config.retrieval.top_k))
        .await?;

    match format {
        "json" => {
            let rows: Vec<RetrieveHit> = hits
                .iter()
                .enumerate()
                .map(|(i, h)| RetrieveHit {
                    rank: i + 1,
                    score: h.score,
                    source: &h.chunk.metadata.source,
                    domain: &h.chunk.metadata.domain,
                    page: h.chunk.metadata.page,
                    chunk_index: h.chunk.chunk_index,
                    text: &h.chunk.text,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            if hits.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, h) in hits.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, h.score, h.chunk.metadata);
                println!("    {}", preview(&h.chunk.text, 200));
                println!();
            }
        }
    }
    Ok(())
}

/// `gqa query`: answer a question and list the sources consulted.
pub async fn run_query(
    config: &Config,
    index_dir: &Path,
    question: &str,
    k: Option<usize>,
    format: &str,
) -> Result<()> {
    let engine = QueryEngine::open(config, index_dir)
        .with_context(|| format!("Failed to open index at {}", index_dir.display()))?;
    let answer = engine.ask(question, k).await?;

    match format {
        "json" => {
            let sources: Vec<String> = answer.citations.iter().map(|c| c.to_string()).collect();
            let out = serde_json::json!({
                "answer": answer.text,
                "refused": answer.refused,
                "sources": sources,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => {
            println!("{}", answer.text);
            println!();
            println!("Sources:");
            if answer.citations.is_empty() {
                println!("  (none)");
            }
            for citation in &answer.citations {
                println!("  - {}", citation);
            }
        }
    }
    Ok(())
}

fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
