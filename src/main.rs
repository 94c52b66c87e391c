//! # Grounded QA CLI (`gqa`)
//!
//! The `gqa` binary builds a vector index from a corpus of domain PDFs and
//! answers questions against it.
//!
//! ## Usage
//!
//! ```bash
//! gqa --config ./config/gqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gqa build` | Rebuild the index from the corpus |
//! | `gqa retrieve "<query>"` | Show the top-k chunks for a query |
//! | `gqa query "<question>"` | Answer a question with citations |
//! | `gqa stats` | Summarize the persisted index |
//!
//! ## Examples
//!
//! ```bash
//! # Build from ./Data into ./vector_store/index
//! gqa build
//!
//! # Inspect retrieval without a generator
//! gqa retrieve "volatility clustering" -k 5
//!
//! # Ask a question, machine-readable output
//! gqa query "How is momentum measured?" --format json
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use grounded_qa::progress::ProgressMode;
use grounded_qa::{build, config, logging, query, stats};

/// Grounded QA CLI: retrieval-augmented answers over a private PDF corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "gqa",
    about = "Grounded question answering over a local corpus of domain PDFs",
    version,
    long_about = "Grounded QA extracts, cleans, and chunks a corpus of domain PDFs, embeds the \
    chunks into a persisted vector index, and answers questions using only retrieved evidence, \
    refusing when the evidence is insufficient."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gqa.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector index from the corpus.
    ///
    /// Extracts every document under the corpus root, normalizes and chunks
    /// the pages, embeds the chunks, and atomically replaces the index.
    Build {
        /// Corpus root (one subdirectory per domain). Overrides `[corpus].root`.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Index output directory. Overrides `[index].dir`.
        #[arg(long)]
        index: Option<PathBuf>,

        /// Progress on stderr: `human`, `json`, or `off`. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Show the chunks most similar to a query, without generation.
    Retrieve {
        query: String,

        /// Number of chunks to return. Overrides `[retrieval].top_k`.
        #[arg(short, long)]
        k: Option<usize>,

        /// Output format: `text` or `json`.
        #[arg(long, default_value = "text")]
        format: String,

        /// Index directory. Overrides `[index].dir`.
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Answer a question from the indexed evidence.
    Query {
        question: String,

        /// Number of chunks to retrieve. Overrides `[retrieval].top_k`.
        #[arg(short, long)]
        k: Option<usize>,

        /// Output format: `text` or `json`.
        #[arg(long, default_value = "text")]
        format: String,

        /// Index directory. Overrides `[index].dir`.
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Summarize the persisted index.
    Stats {
        /// Index directory. Overrides `[index].dir`.
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn check_format(format: &str) -> Result<()> {
    match format {
        "text" | "json" => Ok(()),
        other => Err(anyhow!("invalid format '{}': use text or json", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging, cli.verbose);

    match cli.command {
        Commands::Build {
            corpus,
            index,
            progress,
        } => {
            let mode = ProgressMode::parse(progress.as_deref()).map_err(|e| anyhow!(e))?;
            build::run_build(&cfg, corpus, index, mode).await?;
        }
        Commands::Retrieve {
            query: text,
            k,
            format,
            index,
        } => {
            check_format(&format)?;
            let dir = index.unwrap_or_else(|| cfg.index.dir.clone());
            query::run_retrieve(&cfg, &dir, &text, k, &format).await?;
        }
        Commands::Query {
            question,
            k,
            format,
            index,
        } => {
            check_format(&format)?;
            let dir = index.unwrap_or_else(|| cfg.index.dir.clone());
            query::run_query(&cfg, &dir, &question, k, &format).await?;
        }
        Commands::Stats { index } => {
            let dir = index.unwrap_or_else(|| cfg.index.dir.clone());
            stats::run_stats(&dir)?;
        }
    }

    Ok(())
}
