//! # studytex
//!
//! Turn long documents into compilable LaTeX study summaries using LLMs.
//!
//! ## Why this crate?
//!
//! Feeding a 300-page statute commentary to a model in one request either
//! exceeds the context window or quietly loses the middle of the document.
//! This crate splits the document into overlapping page windows, summarizes
//! each window separately, then merges the partial summaries into one
//! coherent LaTeX document — surviving per-key rate limits along the way by
//! rotating across an API key pool with cooldowns and bounded retries.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / text / image
//!  │
//!  ├─ 1. Extract   per-page text (pdf-extract, spawn_blocking)
//!  ├─ 2. Analyze   title, table of contents, terms (regex, local)
//!  ├─ 3. Chunk     overlapping page windows
//!  ├─ 4. Map       one summary call per chunk, sequential, key rotation
//!  ├─ 5. Reduce    merge call + optional enhance pass
//!  ├─ 6. Polish    fence stripping, document-shell completion
//!  └─ 7. Output    .tex + JSON sidecars, optional pdflatex/tectonic PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studytex::{summarize_to_dir, SummaryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SummaryConfig::builder()
//!         .api_keys(vec![std::env::var("GEMINI_API_KEY")?])
//!         .build()?;
//!     let output = summarize_to_dir("lectures.pdf", "out", &config).await?;
//!     eprintln!(
//!         "{} chunks, {} API calls, {:.1}s",
//!         output.stats.total_chunks,
//!         output.stats.api_calls,
//!         output.stats.elapsed_seconds
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Strategies
//!
//! | Strategy | Calls | When |
//! |----------|-------|------|
//! | `map-reduce` | chunks + merge + enhance | long documents (default) |
//! | `single-shot` | summary + LaTeX conversion | short documents; falls back to map-reduce past the token budget |
//! | `hybrid` | sections + synthesis | study material where term coverage matters |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `studytex` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! studytex = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod keys;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod summarize;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Strategy, SummaryConfig, SummaryConfigBuilder};
pub use error::StudytexError;
pub use llm::{GeminiModel, ImagePart, ModelError, ModelRequest, TextModel};
pub use output::{ChunkSummary, CoverageReport, RunArtifacts, RunOutput, RunStats};
pub use progress::{NoopProgress, Progress, ProgressSink};
pub use prompts::PromptSet;
pub use summarize::{summarize, summarize_sync, summarize_to_dir};
