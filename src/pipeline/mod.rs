//! Pipeline stages for document-to-LaTeX summarization.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different typesetting engine) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ analyze ──▶ chunk ──▶ caller ──▶ postprocess ──▶ compile
//! (pages)     (terms,     (page    (LLM with   (fence strip,   (pdflatex +
//!             headings)   windows)  rotation)   doc shell)      autofix)
//!                                      │
//!                                   coverage
//!                                   (term check)
//! ```
//!
//! 1. [`extract`] — pull ordered page text out of a PDF, plain-text or
//!    image file; decoding runs in `spawn_blocking`
//! 2. [`analyze`] — local regex scan for domain terms, section headings and
//!    a table of contents; no network I/O
//! 3. [`chunk`] — slide an overlapping page window over the document; pure
//! 4. [`caller`] — drive every model call with key rotation, cooldowns and
//!    a bounded retry budget; the only stage with network I/O
//! 5. [`postprocess`] — deterministic cleanup of model LaTeX (code fences,
//!    chatter around the preamble, line-ending noise)
//! 6. [`compile`] — typeset the result, feeding engine logs back to the
//!    model for a bounded number of fix attempts
//! 7. [`coverage`] — string-match scanned terms against the final text and
//!    report what went missing
//!
//! The orchestration of these stages lives in [`crate::summarize`].

pub mod analyze;
pub mod caller;
pub mod chunk;
pub mod compile;
pub mod coverage;
pub mod extract;
pub mod postprocess;
