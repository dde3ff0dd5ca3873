//! CLI binary for studytex.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `SummaryConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use studytex::{summarize_to_dir, NoopProgress, Progress, Strategy, SummaryConfig};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarize a PDF into ./out (map-reduce, default)
  studytex lectures.pdf -o out

  # Several keys: rotation survives per-key rate limits
  studytex --api-keys KEY1,KEY2,KEY3 thick-textbook.pdf -o out

  # Short document in a single call (auto-falls back when too large)
  studytex --strategy single-shot paper.pdf -o out

  # Hybrid: regex term scan + per-section summaries + coverage report
  studytex --strategy hybrid civil-law-notes.pdf -o out

  # Compile the result to PDF (needs pdflatex or tectonic on PATH)
  studytex lectures.pdf -o out --pdf

  # Force the output language
  studytex --language Italian dispense.pdf -o out

ARTIFACTS (written to the output directory):
  {stem}_summary.tex    final LaTeX study summary
  {stem}_chunks.json    per-chunk records (key points, definitions, law refs)
  {stem}_stats.json     pages, chunks, API calls, characters, elapsed time
  {stem}_analysis.json  term/section analysis (hybrid strategy only)
  {stem}.pdf            compiled PDF (--pdf only)

STRATEGIES:
  map-reduce   one summary call per page window, then a merge call (default)
  single-shot  whole document in one call; falls back to map-reduce when the
               estimated token count exceeds the model budget
  hybrid       local term/section analysis, per-section calls, synthesis,
               plus a term-coverage report
  Accepted aliases: chunked (map-reduce), stuff (single-shot), smart (hybrid)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY       single API key
  GEMINI_API_KEYS      comma-separated list of keys, rotated on rate limits
  STUDYTEX_MODEL       model ID (default: gemini-2.5-flash)

SETUP:
  1. Set API key:     export GEMINI_API_KEY=...
  2. Summarize:       studytex document.pdf -o out
"#;

/// Summarize documents into LaTeX study notes using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "studytex",
    version,
    about = "Summarize long documents into compilable LaTeX study notes",
    long_about = "Summarize long documents (PDF, plain text, Markdown, or a page image) into \
a compilable LaTeX study summary. Long documents are split into overlapping page windows, \
summarized window by window, and merged; API keys are rotated automatically on rate limits.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input document: .pdf, .txt, .md, .png, .jpg or .jpeg.
    input: PathBuf,

    /// Directory for the .tex, JSON sidecars and optional PDF.
    #[arg(short = 'o', long, env = "STUDYTEX_OUTPUT_DIR", default_value = "out")]
    output_dir: PathBuf,

    /// Summarization strategy: map-reduce, single-shot or hybrid
    /// (aliases: chunked, stuff, smart).
    #[arg(
        long,
        env = "STUDYTEX_STRATEGY",
        default_value = "map-reduce",
        value_parser = parse_strategy
    )]
    strategy: Strategy,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Additional API keys, comma-separated; rotated on rate limits.
    #[arg(long, env = "GEMINI_API_KEYS", hide_env_values = true, value_delimiter = ',')]
    api_keys: Vec<String>,

    /// Model ID.
    #[arg(long, env = "STUDYTEX_MODEL", default_value = "gemini-2.5-flash")]
    model: String,

    /// Pages per chunk in the map phase.
    #[arg(long, env = "STUDYTEX_CHUNK_SIZE", default_value_t = 15)]
    chunk_size: usize,

    /// Pages shared between consecutive chunks.
    #[arg(long, env = "STUDYTEX_OVERLAP", default_value_t = 2)]
    overlap: usize,

    /// Retry attempts per key before a call is abandoned.
    #[arg(long, env = "STUDYTEX_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Courtesy pause between consecutive chunk calls, in milliseconds.
    #[arg(long, env = "STUDYTEX_CHUNK_PAUSE_MS", default_value_t = 2000)]
    chunk_pause_ms: u64,

    /// LLM temperature (0.0-2.0).
    #[arg(long, env = "STUDYTEX_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "STUDYTEX_MAX_OUTPUT_TOKENS", default_value_t = 65536)]
    max_output_tokens: u32,

    /// Per-API-call timeout in seconds.
    #[arg(long, env = "STUDYTEX_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Output language (e.g. "Italian"); defaults to the document's own.
    #[arg(long, env = "STUDYTEX_LANGUAGE")]
    language: Option<String>,

    /// Document title; derived from the file name if not set.
    #[arg(long)]
    title: Option<String>,

    /// Skip the enhancement pass after merging.
    #[arg(long, env = "STUDYTEX_NO_ENHANCE")]
    no_enhance: bool,

    /// Compile the summary to PDF with pdflatex or tectonic.
    #[arg(long, alias = "compile", env = "STUDYTEX_PDF")]
    pdf: bool,

    /// Compile attempts; each failure triggers an LLM auto-fix.
    #[arg(long, env = "STUDYTEX_COMPILE_ATTEMPTS", default_value_t = 3)]
    compile_attempts: u32,

    /// Wall-clock timeout per typesetter pass, in seconds.
    #[arg(long, env = "STUDYTEX_COMPILE_TIMEOUT", default_value_t = 180)]
    compile_timeout: u64,

    /// Print the run summary as JSON instead of the human-readable report.
    #[arg(long, env = "STUDYTEX_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "STUDYTEX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "STUDYTEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "STUDYTEX_QUIET")]
    quiet: bool,
}

/// Strategy names as the library accepts them, aliases included.
fn parse_strategy(s: &str) -> Result<Strategy, String> {
    Strategy::parse(s).ok_or_else(|| {
        format!("unknown strategy '{s}' (expected map-reduce, single-shot or hybrid)")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Collect API keys ─────────────────────────────────────────────────
    let mut keys: Vec<String> = Vec::new();
    if let Some(ref k) = cli.api_key {
        keys.push(k.clone());
    }
    keys.extend(cli.api_keys.iter().cloned());
    keys.retain(|k| !k.trim().is_empty());
    let mut seen = HashSet::new();
    keys.retain(|k| seen.insert(k.clone()));
    if keys.is_empty() {
        anyhow::bail!(
            "no API key configured\n\
             Set GEMINI_API_KEY (or GEMINI_API_KEYS for several) or pass --api-key."
        );
    }

    // ── Progress bar ─────────────────────────────────────────────────────
    let bar = show_progress.then(make_bar);
    let progress: Progress = match &bar {
        Some(b) => {
            let b = b.clone();
            Arc::new(move |message: &str, percent: i32| {
                if percent < 0 {
                    b.println(dim(message));
                } else {
                    b.set_position(percent as u64);
                    b.set_message(message.to_string());
                }
            })
        }
        None => Arc::new(NoopProgress),
    };

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = SummaryConfig::builder()
        .strategy(cli.strategy)
        .api_keys(keys)
        .model(&cli.model)
        .progress(progress)
        .chunk_size(cli.chunk_size)
        .overlap(cli.overlap)
        .max_retries(cli.max_retries)
        .chunk_pause_ms(cli.chunk_pause_ms)
        .temperature(cli.temperature)
        .max_output_tokens(cli.max_output_tokens)
        .api_timeout_secs(cli.api_timeout)
        .enhance(!cli.no_enhance)
        .compile_pdf(cli.pdf)
        .compile_max_attempts(cli.compile_attempts)
        .compile_timeout_secs(cli.compile_timeout);
    if let Some(ref lang) = cli.language {
        builder = builder.language(lang.clone());
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = summarize_to_dir(&cli.input, &cli.output_dir, &config).await;
    if let Some(b) = bar {
        b.finish_and_clear();
    }
    let output = result.context("Summarization failed")?;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let artifacts = output.artifacts.as_ref();
        let json = serde_json::json!({
            "strategy": output.strategy_used.to_string(),
            "toc_detected": output.toc_detected,
            "stats": output.stats,
            "coverage": output.coverage,
            "artifacts": {
                "tex": artifacts.map(|a| a.tex.display().to_string()),
                "chunks": artifacts.map(|a| a.chunks.display().to_string()),
                "stats": artifacts.map(|a| a.stats.display().to_string()),
                "analysis": artifacts.and_then(|a| a.analysis.as_ref()).map(|p| p.display().to_string()),
                "pdf": artifacts.and_then(|a| a.pdf.as_ref()).map(|p| p.display().to_string()),
            },
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise run summary")?
        );
        return Ok(());
    }

    if !cli.quiet {
        if let Some(ref arts) = output.artifacts {
            eprintln!(
                "{} {}  →  {}",
                green("✔"),
                bold(&format!(
                    "{} page(s), {} chunk(s), {} API call(s) in {:.1}s",
                    output.stats.total_pages,
                    output.stats.total_chunks,
                    output.stats.api_calls,
                    output.stats.elapsed_seconds
                )),
                bold(&arts.tex.display().to_string()),
            );
            if let Some(ref pdf) = arts.pdf {
                eprintln!("   {} {}", cyan("◆"), pdf.display());
            }
        }
        if let Some(ref cov) = output.coverage {
            let line = format!(
                "term coverage {:.0}% ({}/{})",
                cov.coverage_pct, cov.covered_terms, cov.total_terms
            );
            if cov.missing.is_empty() {
                eprintln!("   {}", dim(&line));
            } else {
                eprintln!(
                    "   {} {}  missing: {}",
                    yellow("⚠"),
                    line,
                    dim(&cov.missing.join(", "))
                );
            }
        }
    }

    Ok(())
}

/// Percent-driven progress bar; `-1` events print above it instead.
fn make_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} [{bar:42.green/238}] {pos:>3}%  {wide_msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
    bar.set_style(style);
    bar.set_message("Starting…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn strategy_flag_accepts_canonical_names() {
        let cli = Cli::try_parse_from(["studytex", "--strategy", "single-shot", "doc.pdf"]).unwrap();
        assert_eq!(cli.strategy, Strategy::SingleShot);
        let cli = Cli::try_parse_from(["studytex", "--strategy", "hybrid", "doc.pdf"]).unwrap();
        assert_eq!(cli.strategy, Strategy::Hybrid);
    }

    #[test]
    fn strategy_flag_accepts_the_original_aliases() {
        let cli = Cli::try_parse_from(["studytex", "--strategy", "chunked", "doc.pdf"]).unwrap();
        assert_eq!(cli.strategy, Strategy::MapReduce);
        let cli = Cli::try_parse_from(["studytex", "--strategy", "stuff", "doc.pdf"]).unwrap();
        assert_eq!(cli.strategy, Strategy::SingleShot);
        let cli = Cli::try_parse_from(["studytex", "--strategy", "smart", "doc.pdf"]).unwrap();
        assert_eq!(cli.strategy, Strategy::Hybrid);
    }

    #[test]
    fn unknown_strategy_is_rejected_with_a_hint() {
        let err = Cli::try_parse_from(["studytex", "--strategy", "refine", "doc.pdf"]).unwrap_err();
        assert!(err.to_string().contains("unknown strategy 'refine'"));
    }
}
