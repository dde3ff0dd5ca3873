//! LaTeX typesetting with model-assisted error recovery.
//!
//! Typesetting is the one step with a deterministic external verifier: the
//! engine either produces a PDF or a log explaining why not. That makes a
//! closed feedback loop possible — on failure the log tail and the current
//! source go back to the model as a fix prompt, and the corrected source is
//! compiled again. Termination comes from the attempt budget alone; there
//! is no guarantee the model converges on a compilable document.
//!
//! The engine itself sits behind [`Typesetter`] so the recovery loop can be
//! driven in tests without a TeX installation.

use crate::error::StudytexError;
use crate::llm::ModelRequest;
use crate::pipeline::caller::ResilientCaller;
use crate::pipeline::postprocess;
use crate::progress::Progress;
use crate::prompts::PromptSet;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Log tail fed into the fix prompt. Engines bury the actual error near the
/// end of a long log, so the tail is the useful part.
const FIX_LOG_TAIL_CHARS: usize = 3_000;
/// Log tail carried in the terminal error.
const FINAL_LOG_TAIL_CHARS: usize = 1_000;

/// Outcome of one typesetting run.
#[derive(Debug)]
pub struct TypesetRun {
    /// True when the PDF was produced and copied to the target path.
    pub success: bool,
    /// Engine log (or combined stdout/stderr when no log file exists).
    pub log: String,
}

/// One invocation of an external typesetting engine.
#[async_trait]
pub trait Typesetter: Send + Sync {
    /// Compile `source` in a scratch directory and, on success, place the
    /// produced PDF at `pdf_target`.
    async fn typeset(&self, source: &str, pdf_target: &Path) -> Result<TypesetRun, StudytexError>;
}

// ── External engines ─────────────────────────────────────────────────────

struct EngineSpec {
    program: &'static str,
    args: &'static [&'static str],
    /// pdflatex needs a second pass to resolve the table of contents.
    passes: u32,
}

const ENGINES: &[EngineSpec] = &[
    EngineSpec {
        program: "pdflatex",
        args: &["-interaction=nonstopmode", "-halt-on-error"],
        passes: 2,
    },
    EngineSpec {
        program: "tectonic",
        args: &["--keep-logs"],
        passes: 1,
    },
];

const JOB_NAME: &str = "studytex";

/// Runs `pdflatex` (or `tectonic` when pdflatex is not installed) in a
/// scratch directory with a wall-clock timeout per pass.
pub struct TexEngine {
    timeout: Duration,
    engines: &'static [EngineSpec],
}

impl TexEngine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            engines: ENGINES,
        }
    }

    #[cfg(test)]
    fn with_engines(timeout: Duration, engines: &'static [EngineSpec]) -> Self {
        Self { timeout, engines }
    }

    /// Run every pass of one engine. `Ok(None)` means the program is not
    /// installed and the next engine should be tried.
    async fn run_engine(
        &self,
        engine: &EngineSpec,
        dir: &Path,
    ) -> Result<Option<String>, StudytexError> {
        let mut combined = String::new();
        for pass in 1..=engine.passes {
            let spawned = Command::new(engine.program)
                .args(engine.args)
                .arg(format!("{JOB_NAME}.tex"))
                .current_dir(dir)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();

            let child = match spawned {
                Ok(child) => child,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => {
                    return Err(StudytexError::Internal(format!(
                        "failed to spawn {}: {e}",
                        engine.program
                    )))
                }
            };

            debug!(engine = engine.program, pass, "typesetting pass");
            let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(StudytexError::Internal(format!(
                        "{} did not run to completion: {e}",
                        engine.program
                    )))
                }
                Err(_) => {
                    warn!(engine = engine.program, timeout_secs = self.timeout.as_secs(), "typesetting timed out");
                    return Ok(Some(format!(
                        "{} timed out after {}s",
                        engine.program,
                        self.timeout.as_secs()
                    )));
                }
            };

            combined.push_str(&String::from_utf8_lossy(&output.stdout));
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            if !output.status.success() {
                break;
            }
        }
        Ok(Some(combined))
    }
}

#[async_trait]
impl Typesetter for TexEngine {
    async fn typeset(&self, source: &str, pdf_target: &Path) -> Result<TypesetRun, StudytexError> {
        let scratch = tempfile::tempdir()
            .map_err(|e| StudytexError::Internal(format!("scratch dir: {e}")))?;
        let dir = scratch.path();
        tokio::fs::write(dir.join(format!("{JOB_NAME}.tex")), source)
            .await
            .map_err(|e| StudytexError::Internal(format!("scratch write: {e}")))?;

        let mut console_log = None;
        for engine in self.engines {
            match self.run_engine(engine, dir).await? {
                Some(log) => {
                    console_log = Some(log);
                    break;
                }
                None => {
                    debug!(engine = engine.program, "engine not installed, trying next");
                    continue;
                }
            }
        }
        let console_log = console_log.ok_or(StudytexError::NoTypesetter)?;

        let produced = dir.join(format!("{JOB_NAME}.pdf"));
        if produced.exists() {
            tokio::fs::copy(&produced, pdf_target)
                .await
                .map_err(|e| StudytexError::OutputWriteFailed {
                    path: pdf_target.to_path_buf(),
                    source: e,
                })?;
            return Ok(TypesetRun {
                success: true,
                log: String::new(),
            });
        }

        // The log file usually carries more detail than the console output.
        let log_path = dir.join(format!("{JOB_NAME}.log"));
        let log = match tokio::fs::read_to_string(&log_path).await {
            Ok(contents) => contents,
            Err(_) => console_log,
        };
        Ok(TypesetRun {
            success: false,
            log,
        })
    }
}

// ── Recovery loop ────────────────────────────────────────────────────────

/// Compile `latex`, feeding failures back to the model for correction.
///
/// Returns the source text that actually compiled (the model may have
/// rewritten it along the way); the PDF is at `pdf_target`. On exhaustion
/// the error carries the tail of the last engine log. The caller keeps its
/// own persisted `.tex` regardless of the outcome here.
pub async fn compile_with_autofix(
    latex: &str,
    pdf_target: &Path,
    typesetter: &dyn Typesetter,
    caller: &mut ResilientCaller,
    prompts: &PromptSet,
    max_attempts: u32,
    temperature: f32,
    max_output_tokens: u32,
    progress: &Progress,
) -> Result<String, StudytexError> {
    let max_attempts = max_attempts.max(1);
    let mut current = latex.to_string();
    let mut last_log = String::new();

    for attempt in 1..=max_attempts {
        let run = typesetter.typeset(&current, pdf_target).await?;
        if run.success {
            info!(attempt, "typesetting succeeded");
            return Ok(current);
        }
        last_log = run.log;

        if attempt < max_attempts {
            progress.report(
                &format!(
                    "Compilation failed (attempt {attempt}/{max_attempts}), asking the model for a fix"
                ),
                -1,
            );
            let prompt =
                prompts.render_fix_latex(tail_chars(&last_log, FIX_LOG_TAIL_CHARS), &current);
            let request = ModelRequest::text(None, prompt, temperature, max_output_tokens);
            let reply = caller.call(&request).await?;
            current = postprocess::clean_output(&reply);
        }
    }

    Err(StudytexError::CompilationFailed {
        attempts: max_attempts,
        log: tail_chars(&last_log, FINAL_LOG_TAIL_CHARS).to_string(),
    })
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
