//! # Grounded QA
//!
//! Question answering over a private corpus of domain PDFs, constrained to
//! the evidence actually retrieved.
//!
//! Two batch paths share one persisted index:
//!
//! ```text
//!  build:  Data/<domain>/*.pdf
//!            │ extract ─▶ normalize ─▶ chunk ─▶ embed
//!            ▼
//!          vector_store/index  (manifest.json, vectors.bin, chunks.jsonl)
//!            │
//!  query:    └─▶ retrieve ─▶ context ─▶ answer gate ─▶ Answer + citations
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gqa build                                  # index ./Data
//! gqa retrieve "realized variance" -k 5      # inspect retrieval
//! gqa query "How is momentum measured?"      # grounded answer
//! gqa stats                                  # index overview
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Pages, chunks, context, answers |
//! | [`error`] | Typed errors at library boundaries |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`progress`] | Build progress on stderr |
//! | [`extract`] | Fault-tolerant corpus extraction |
//! | [`normalize`] | Page text cleaning |
//! | [`chunk`] | Recursive overlapping chunker |
//! | [`embedding`] | Embedding services and vector utilities |
//! | [`index`] | Persisted vector index |
//! | [`retrieve`] | Top-k retrieval |
//! | [`context`] | Budgeted evidence assembly |
//! | [`generate`] | Generation backends |
//! | [`answer`] | Prompting and the refusal policy |
//! | [`build`] | Build orchestration |
//! | [`query`] | Query orchestration |
//! | [`stats`] | Index statistics |

pub mod answer;
pub mod build;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod query;
pub mod retrieve;
pub mod stats;
