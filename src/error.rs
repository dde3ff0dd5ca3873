//! Error types for the studytex library.
//!
//! One fatal taxonomy, [`StudytexError`], covers every way a run can stop:
//! configuration mistakes are caught before the first network call, retry
//! exhaustion is the only way an LLM failure surfaces, and typesetting
//! failure is kept distinct from LLM failure so callers can still ship the
//! `.tex` artifact when only the PDF step went wrong.
//!
//! Rate limiting deliberately has no variant here. It is an internal state
//! of the retry machinery in [`crate::pipeline::caller`]: keys cool down,
//! the pool rotates, and either a later attempt succeeds or the run ends in
//! [`StudytexError::ExhaustedRetries`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the studytex library.
#[derive(Debug, Error)]
pub enum StudytexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input extension is not one the pipeline knows how to read.
    #[error("Unsupported input type '{path}'\nSupported: .pdf, .txt, .md, .png, .jpg, .jpeg")]
    UnsupportedInput { path: PathBuf },

    /// The file exists and was read, but its contents do not match its extension.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Text or image extraction failed for the whole document.
    #[error("Could not extract content from '{path}': {detail}")]
    ExtractionFailed { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// Every retry across every credential failed; the run cannot continue.
    #[error(
        "LLM call failed after {attempts} attempts across {keys} key(s).\n\
Last error: {last_error}\n\
If this is persistent throttling, add more keys or raise --max-retries."
    )]
    ExhaustedRetries {
        attempts: u32,
        keys: usize,
        last_error: String,
    },

    // ── Typesetting errors ────────────────────────────────────────────────
    /// The LaTeX source never compiled, even after auto-fix attempts.
    ///
    /// The `.tex` artifact is still on disk; only the PDF step failed.
    #[error("LaTeX compilation failed after {attempts} attempt(s).\nLog tail:\n{log}")]
    CompilationFailed { attempts: u32, log: String },

    /// Neither pdflatex nor tectonic could be spawned.
    #[error(
        "No LaTeX engine found.\n\
Install TeX Live (pdflatex) or tectonic, or drop --compile to keep the .tex only."
    )]
    NoTypesetter,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed (bad chunk geometry, empty key pool, …).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_retries_display() {
        let e = StudytexError::ExhaustedRetries {
            attempts: 10,
            keys: 2,
            last_error: "quota exceeded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("10 attempts"), "got: {msg}");
        assert!(msg.contains("2 key(s)"), "got: {msg}");
        assert!(msg.contains("quota exceeded"), "got: {msg}");
    }

    #[test]
    fn compilation_failed_display() {
        let e = StudytexError::CompilationFailed {
            attempts: 3,
            log: "! Undefined control sequence.".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.contains("Undefined control sequence"));
    }

    #[test]
    fn invalid_config_display() {
        let e = StudytexError::InvalidConfig("overlap (15) must be smaller than chunk_size (15)".into());
        assert!(e.to_string().contains("overlap (15)"));
    }

    #[test]
    fn not_a_pdf_display() {
        let e = StudytexError::NotAPdf {
            path: PathBuf::from("notes.pdf"),
            magic: *b"PK\x03\x04",
        };
        assert!(e.to_string().contains("notes.pdf"));
    }
}
