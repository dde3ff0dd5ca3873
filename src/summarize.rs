//! Summarization entry points.
//!
//! One orchestrator runs every strategy: the [`Strategy`] value only decides
//! which model calls happen between extraction and the shared
//! postprocess/persist tail, so progress reporting, statistics, artifact
//! layout and error handling behave identically across strategies.
//!
//! Use [`summarize`] for an in-memory result, [`summarize_to_dir`] to also
//! write the `.tex` and JSON sidecars (and optionally compile a PDF), and
//! [`summarize_sync`] from non-async embedders.

use crate::config::{Strategy, SummaryConfig};
use crate::error::StudytexError;
use crate::keys::KeyPool;
use crate::llm::{GeminiModel, ModelRequest, TextModel};
use crate::output::{ChunkRecord, ChunkSummary, CoverageReport, RunArtifacts, RunOutput, RunStats};
use crate::pipeline::caller::ResilientCaller;
use crate::pipeline::extract::ExtractedDocument;
use crate::pipeline::{analyze, chunk, compile, coverage, extract, postprocess};
use crate::progress::Progress;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Summarize a document into a LaTeX study summary, in memory.
///
/// This is the primary entry point for the library. Accepts `.pdf`, `.txt`,
/// `.md` and common image formats.
///
/// # Errors
/// Fails on unreadable or unsupported input, invalid chunk geometry, and
/// when the retry budget is exhausted against the model API. An empty
/// document is not an error: the run completes with zero chunks and a
/// placeholder document.
pub async fn summarize(
    input: impl AsRef<Path>,
    config: &SummaryConfig,
) -> Result<RunOutput, StudytexError> {
    run(input.as_ref(), None, config).await
}

/// Summarize a document and persist the artifacts under `out_dir`.
///
/// Writes `{stem}_summary.tex`, `{stem}_chunks.json` and `{stem}_stats.json`
/// (plus `{stem}_analysis.json` for the hybrid strategy), each atomically
/// via a temp file and rename. With [`SummaryConfig::compile_pdf`] set, the
/// summary is also typeset to `{stem}.pdf`; a compilation failure leaves
/// the persisted `.tex` in place.
pub async fn summarize_to_dir(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &SummaryConfig,
) -> Result<RunOutput, StudytexError> {
    run(input.as_ref(), Some(out_dir.as_ref()), config).await
}

/// Synchronous wrapper around [`summarize_to_dir`].
///
/// Creates a temporary current-thread tokio runtime internally.
pub fn summarize_sync(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &SummaryConfig,
) -> Result<RunOutput, StudytexError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| StudytexError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(summarize_to_dir(input, out_dir, config))
}

async fn run(
    input: &Path,
    out_dir: Option<&Path>,
    config: &SummaryConfig,
) -> Result<RunOutput, StudytexError> {
    let total_start = Instant::now();
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| input.display().to_string());
    let mut progress = PhaseProgress::new(Arc::clone(&config.progress));
    info!("Starting summarization: {}", input.display());

    // ── Step 1: Extract pages ────────────────────────────────────────────
    progress.report(&format!("Reading {file_name}"), 5);
    let document = extract::extract(input).await?;
    let total_pages = document.pages.len();
    let characters_in = document.char_count();
    progress.report(&format!("Extracted {total_pages} page(s)"), 10);

    // ── Step 2: Title and table of contents ──────────────────────────────
    let title = config
        .title
        .clone()
        .or_else(|| analyze::detect_title(&document.pages))
        .unwrap_or_else(|| analyze::title_from_path(input));
    let toc_pages = analyze::detect_toc(&document.pages, config.toc_scan_pages);
    let toc_detected = !toc_pages.is_empty();
    if toc_detected {
        progress.report(
            &format!("Table of contents detected on page {}", toc_pages[0]),
            12,
        );
    }
    debug!(title = %title, toc_detected, "document analysed");

    // ── Step 3: Model client and caller ──────────────────────────────────
    let model = resolve_model(config)?;
    let pool = KeyPool::new(config.api_keys.clone())?;
    let mut caller = ResilientCaller::new(model, pool, config);

    // ── Step 4: Strategy dispatch ────────────────────────────────────────
    let mut strategy_used = config.strategy;
    if strategy_used == Strategy::SingleShot {
        let estimated = characters_in / config.chars_per_token.max(1);
        if estimated > config.single_shot_token_limit {
            warn!(
                estimated_tokens = estimated,
                limit = config.single_shot_token_limit,
                "document too large for single-shot, falling back to map-reduce"
            );
            progress.report(
                &format!("Document too large for single-shot (~{estimated} tokens), using map-reduce"),
                -1,
            );
            strategy_used = Strategy::MapReduce;
        }
    }
    progress.report(&format!("Strategy: {strategy_used}"), 15);

    let outcome = if document.pages.is_empty() {
        progress.report("No text content found, producing an empty summary", 70);
        StrategyOutcome {
            latex: empty_document_body(),
            chunks: Vec::new(),
            analysis: None,
        }
    } else {
        match strategy_used {
            Strategy::MapReduce => {
                map_reduce(&document, &title, &mut caller, config, &mut progress).await?
            }
            Strategy::SingleShot => {
                single_shot(&document, &title, &mut caller, config, &mut progress).await?
            }
            Strategy::Hybrid => {
                hybrid(&document, &title, &mut caller, config, &mut progress).await?
            }
        }
    };
    let StrategyOutcome {
        latex: raw_latex,
        chunks,
        analysis,
    } = outcome;

    // ── Step 5: Post-process ─────────────────────────────────────────────
    progress.report("Cleaning LaTeX output", 95);
    let cleaned = postprocess::clean_output(&raw_latex);
    let mut latex = postprocess::ensure_document(&cleaned, &title, &config.prompts);

    // ── Step 6: Coverage check (hybrid) ──────────────────────────────────
    let coverage_report = analysis
        .as_ref()
        .map(|a| coverage::check_coverage(&a.terms, &latex));
    if let Some(ref report) = coverage_report {
        progress.report(
            &format!(
                "Term coverage: {:.0}% ({}/{} terms)",
                report.coverage_pct, report.covered_terms, report.total_terms
            ),
            -1,
        );
    }

    // ── Step 7: Persist artifacts ────────────────────────────────────────
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let mut artifacts = match out_dir {
        Some(dir) => {
            let arts = persist_artifacts(dir, &stem, &latex, &chunks, analysis.as_ref()).await?;
            progress.report(&format!("Saved {}", arts.tex.display()), 98);
            Some(arts)
        }
        None => None,
    };

    // ── Step 8: Compile to PDF (optional) ────────────────────────────────
    if config.compile_pdf {
        match (out_dir, artifacts.as_mut()) {
            (Some(dir), Some(arts)) => {
                progress.report("Compiling LaTeX to PDF", -1);
                let pdf_path = dir.join(format!("{stem}.pdf"));
                let typesetter =
                    compile::TexEngine::new(Duration::from_secs(config.compile_timeout_secs));
                let compiled = compile::compile_with_autofix(
                    &latex,
                    &pdf_path,
                    &typesetter,
                    &mut caller,
                    &config.prompts,
                    config.compile_max_attempts,
                    config.temperature,
                    config.max_output_tokens,
                    &config.progress,
                )
                .await?;
                if compiled != latex {
                    // The model rewrote the source to make it compile; the
                    // persisted .tex follows what actually produced the PDF.
                    write_atomic(&arts.tex, compiled.as_bytes()).await?;
                    latex = compiled;
                }
                arts.pdf = Some(pdf_path);
                progress.report("PDF compiled", -1);
            }
            _ => warn!("compile_pdf set but no output directory given; skipping compilation"),
        }
    }

    // ── Step 9: Statistics ───────────────────────────────────────────────
    let stats = RunStats {
        total_pages,
        total_chunks: chunks.len(),
        api_calls: caller.api_calls(),
        characters_in,
        characters_out: latex.chars().count(),
        elapsed_seconds: total_start.elapsed().as_secs_f64(),
    };
    if let Some(ref arts) = artifacts {
        let stats_file = StatsFile {
            stats: &stats,
            strategy: strategy_used.to_string(),
            toc_detected,
            coverage: coverage_report.as_ref(),
        };
        write_json(&arts.stats, &stats_file).await?;
    }

    progress.report(
        &format!(
            "Done in {:.1}s ({} API call(s))",
            stats.elapsed_seconds, stats.api_calls
        ),
        100,
    );
    info!(
        "Summarization complete: {} chunk(s), {} API call(s), {:.1}s",
        chunks.len(),
        stats.api_calls,
        stats.elapsed_seconds
    );

    Ok(RunOutput {
        latex,
        chunks,
        stats,
        strategy_used,
        toc_detected,
        coverage: coverage_report,
        artifacts,
    })
}

// ── Strategies ───────────────────────────────────────────────────────────

/// What a strategy hands back to the shared tail of the run.
struct StrategyOutcome {
    /// Raw model LaTeX, not yet cleaned or shell-wrapped.
    latex: String,
    chunks: Vec<ChunkSummary>,
    /// Present for the hybrid strategy only.
    analysis: Option<HybridAnalysis>,
}

#[derive(Serialize)]
struct HybridAnalysis {
    terms: Vec<analyze::ExtractedTerm>,
    sections: Vec<SectionInfo>,
}

#[derive(Serialize)]
struct SectionInfo {
    title: String,
    start_page: u32,
    end_page: u32,
    chars: usize,
}

/// Chunked map-reduce: summarize page windows, merge, optionally enhance.
async fn map_reduce(
    document: &ExtractedDocument,
    title: &str,
    caller: &mut ResilientCaller,
    config: &SummaryConfig,
    progress: &mut PhaseProgress,
) -> Result<StrategyOutcome, StudytexError> {
    let chunks = chunk::create_chunks(&document.pages, config.chunk_size, config.overlap)?;
    let total = chunks.len();
    progress.report(&format!("Split into {total} chunk(s)"), 20);

    let system = config.prompts.render_system(config.language.as_deref());
    let mut summaries: Vec<ChunkSummary> = Vec::with_capacity(total);
    for (i, c) in chunks.iter().enumerate() {
        let percent = 20 + (i as i32 * 50) / total as i32;
        progress.report(
            &format!("Summarizing chunk {}/{}: {}", i + 1, total, c.title),
            percent,
        );

        let content = prefix_chars(&c.text, config.chunk_char_cap);
        if content.len() < c.text.len() {
            debug!(
                chunk = c.id,
                cap = config.chunk_char_cap,
                "chunk text truncated before prompting"
            );
        }
        let request = document_request(
            Some(system.clone()),
            config.prompts.render_chunk_summary(&c.title, content),
            document,
            config,
        );
        let reply = caller.call(&request).await?;
        summaries.push(scrape_summary(c.id, &c.title, c.start_page, c.end_page, &reply));

        if i + 1 < total {
            sleep(Duration::from_millis(config.chunk_pause_ms)).await;
        }
    }

    progress.report(&format!("Merging {total} chunk summaries"), 75);
    let merge_input = summaries
        .iter()
        .map(|s| format!("%% {}\n{}", s.title, s.summary))
        .collect::<Vec<_>>()
        .join("\n\n");
    let merge_request = ModelRequest::text(
        Some(system.clone()),
        config.prompts.render_merge(title, &merge_input),
        config.temperature,
        config.max_output_tokens,
    );
    let mut latex = caller.call(&merge_request).await?;

    if config.enhance {
        progress.report("Enhancing document structure", 90);
        let enhance_request = ModelRequest::text(
            Some(system),
            config
                .prompts
                .render_enhance(&postprocess::clean_output(&latex)),
            config.temperature,
            config.max_output_tokens,
        );
        latex = caller.call(&enhance_request).await?;
    }

    Ok(StrategyOutcome {
        latex,
        chunks: summaries,
        analysis: None,
    })
}

/// Whole-document summary in one call, then a LaTeX conversion call.
///
/// The caller has already verified the token estimate fits; past the limit
/// the run falls back to [`map_reduce`] before ever reaching here.
async fn single_shot(
    document: &ExtractedDocument,
    title: &str,
    caller: &mut ResilientCaller,
    config: &SummaryConfig,
    progress: &mut PhaseProgress,
) -> Result<StrategyOutcome, StudytexError> {
    // One clipped window spanning every page gives the same page markers
    // the map phase uses.
    let whole = chunk::create_chunks(&document.pages, document.pages.len(), 0)?
        .pop()
        .ok_or_else(|| StudytexError::Internal("no chunk for non-empty document".into()))?;

    let system = config.prompts.render_system(config.language.as_deref());
    progress.report("Summarizing the whole document in one call", 30);
    let request = document_request(
        Some(system.clone()),
        config.prompts.render_single_shot(title, &whole.text),
        document,
        config,
    );
    let summary = caller.call(&request).await?;

    progress.report("Converting summary to LaTeX", 75);
    let convert_request = ModelRequest::text(
        Some(system),
        config.prompts.render_latex_convert(&summary),
        config.temperature,
        config.max_output_tokens,
    );
    let latex = caller.call(&convert_request).await?;

    let chunks = vec![scrape_summary(
        0,
        "Full document",
        whole.start_page,
        whole.end_page,
        &summary,
    )];
    Ok(StrategyOutcome {
        latex,
        chunks,
        analysis: None,
    })
}

/// Local term/section analysis, per-section summaries, then a synthesis
/// call; the coverage check runs on the final text in the shared tail.
async fn hybrid(
    document: &ExtractedDocument,
    title: &str,
    caller: &mut ResilientCaller,
    config: &SummaryConfig,
    progress: &mut PhaseProgress,
) -> Result<StrategyOutcome, StudytexError> {
    let terms = analyze::scan_terms(&document.pages);
    let sections = analyze::split_sections(&document.pages);
    let total = sections.len();
    progress.report(
        &format!("Local analysis: {} term(s), {} section(s)", terms.len(), total),
        20,
    );

    let system = config.prompts.render_system(config.language.as_deref());
    let mut summaries: Vec<ChunkSummary> = Vec::with_capacity(total);
    for (i, section) in sections.iter().enumerate() {
        let percent = 20 + (i as i32 * 50) / total as i32;
        progress.report(
            &format!("Summarizing section {}/{}: {}", i + 1, total, section.title),
            percent,
        );

        // Terms are anchored to the section where they first appear.
        let section_terms: Vec<analyze::ExtractedTerm> = terms
            .iter()
            .filter(|t| t.page >= section.start_page && t.page <= section.end_page)
            .cloned()
            .collect();
        let block = if section_terms.is_empty() {
            "- (none found by local analysis)".to_string()
        } else {
            analyze::terms_block(&section_terms)
        };
        let content = prefix_chars(&section.text, config.chunk_char_cap);
        let request = document_request(
            Some(system.clone()),
            config.prompts.render_section(&section.title, &block, content),
            document,
            config,
        );
        let reply = caller.call(&request).await?;
        summaries.push(scrape_summary(
            i,
            &section.title,
            section.start_page,
            section.end_page,
            &reply,
        ));

        if i + 1 < total {
            sleep(Duration::from_millis(config.chunk_pause_ms)).await;
        }
    }

    progress.report(&format!("Synthesizing {total} section summaries"), 75);
    let synthesis_input = summaries
        .iter()
        .map(|s| format!("%% {}\n{}", s.title, s.summary))
        .collect::<Vec<_>>()
        .join("\n\n");
    let synthesis_request = ModelRequest::text(
        Some(system),
        config.prompts.render_synthesis(title, &synthesis_input),
        config.temperature,
        config.max_output_tokens,
    );
    let latex = caller.call(&synthesis_request).await?;

    let analysis = HybridAnalysis {
        sections: sections
            .iter()
            .map(|s| SectionInfo {
                title: s.title.clone(),
                start_page: s.start_page,
                end_page: s.end_page,
                chars: s.text.chars().count(),
            })
            .collect(),
        terms,
    };
    Ok(StrategyOutcome {
        latex,
        chunks: summaries,
        analysis: Some(analysis),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Clamps phase percents so the reported sequence never moves backwards.
/// The −1 log-only sentinel passes through untouched.
struct PhaseProgress {
    sink: Progress,
    high_water: i32,
}

impl PhaseProgress {
    fn new(sink: Progress) -> Self {
        Self {
            sink,
            high_water: 0,
        }
    }

    fn report(&mut self, message: &str, percent: i32) {
        if percent < 0 {
            self.sink.report(message, -1);
            return;
        }
        let clamped = percent.min(100).max(self.high_water);
        self.high_water = clamped;
        self.sink.report(message, clamped);
    }
}

/// Use the injected client when present, else build the Gemini client.
fn resolve_model(config: &SummaryConfig) -> Result<Arc<dyn TextModel>, StudytexError> {
    if let Some(ref client) = config.model_client {
        return Ok(Arc::clone(client));
    }
    let gemini = GeminiModel::new(
        config.model.clone(),
        Duration::from_secs(config.api_timeout_secs),
    )
    .map_err(|e| StudytexError::Internal(format!("failed to build HTTP client: {e}")))?;
    Ok(Arc::new(gemini))
}

/// Build a model request, attaching the source image for image inputs.
fn document_request(
    system: Option<String>,
    prompt: String,
    document: &ExtractedDocument,
    config: &SummaryConfig,
) -> ModelRequest {
    let mut request =
        ModelRequest::text(system, prompt, config.temperature, config.max_output_tokens);
    if let Some(ref image) = document.image {
        request.images.push(image.clone());
    }
    request
}

/// Wrap a model reply with its chunk geometry and the scraped markers.
fn scrape_summary(
    chunk_id: usize,
    title: &str,
    start_page: u32,
    end_page: u32,
    reply: &str,
) -> ChunkSummary {
    ChunkSummary {
        chunk_id,
        title: title.to_string(),
        start_page,
        end_page,
        key_points: analyze::extract_key_points(reply),
        definitions: analyze::extract_definitions(reply),
        law_refs: analyze::extract_law_refs(reply),
        summary: reply.to_string(),
    }
}

fn empty_document_body() -> String {
    "\\section*{Empty document}\nNo text content could be extracted from the input.".to_string()
}

/// First `cap` characters of `s`, on a char boundary.
fn prefix_chars(s: &str, cap: usize) -> &str {
    match s.char_indices().nth(cap) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Serialize)]
struct StatsFile<'a> {
    #[serde(flatten)]
    stats: &'a RunStats,
    strategy: String,
    toc_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    coverage: Option<&'a CoverageReport>,
}

async fn persist_artifacts(
    dir: &Path,
    stem: &str,
    latex: &str,
    chunks: &[ChunkSummary],
    analysis: Option<&HybridAnalysis>,
) -> Result<RunArtifacts, StudytexError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StudytexError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let tex = dir.join(format!("{stem}_summary.tex"));
    write_atomic(&tex, latex.as_bytes()).await?;

    let records: Vec<ChunkRecord> = chunks.iter().map(ChunkRecord::from_summary).collect();
    let chunks_path = dir.join(format!("{stem}_chunks.json"));
    write_json(&chunks_path, &records).await?;

    let analysis_path = match analysis {
        Some(a) => {
            let path = dir.join(format!("{stem}_analysis.json"));
            write_json(&path, a).await?;
            Some(path)
        }
        None => None,
    };

    Ok(RunArtifacts {
        stats: dir.join(format!("{stem}_stats.json")),
        tex,
        chunks: chunks_path,
        analysis: analysis_path,
        pdf: None,
    })
}

/// Atomic write: temp file in the same directory, then rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StudytexError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| StudytexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StudytexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StudytexError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StudytexError::Internal(format!("serialize {}: {e}", path.display())))?;
    write_atomic(path, json.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_respects_char_boundaries() {
        assert_eq!(prefix_chars("abcdef", 3), "abc");
        assert_eq!(prefix_chars("ab", 10), "ab");
        assert_eq!(prefix_chars("", 5), "");
        assert_eq!(prefix_chars("héllo wörld", 5), "héllo");
    }
}
