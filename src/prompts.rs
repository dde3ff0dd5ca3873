//! Prompt templates for every LLM call the pipeline makes.
//!
//! Centralising every template here serves two purposes:
//!
//! 1. **Single source of truth** — changing how chunks are summarized or how
//!    fix requests are phrased requires editing exactly one place.
//!
//! 2. **Swappability** — the orchestrator never hard-codes wording. It renders
//!    whatever [`PromptSet`] the config carries, so embedders can localise or
//!    re-tune prompts without touching pipeline code.
//!
//! Templates use `{name}` placeholders filled by the render methods below.
//! The sentinel markers `[KEY: …]`, `[DEF: …]` and `[LAW: …]` are contract,
//! not wording: [`crate::pipeline::analyze`] scrapes them out of responses,
//! so custom prompt sets must keep instructing the model to emit them.

/// System prompt establishing the summarizer persona for all calls.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert academic assistant producing rigorous study summaries of long documents.

Follow these rules precisely:

1. FAITHFULNESS
   - Never invent facts, figures, article numbers or citations
   - Preserve the document's own terminology and definitions
   - Keep the original meaning when condensing

2. STRUCTURE
   - Organise output by the document's own sections and themes
   - Prefer short paragraphs and itemized lists over walls of text

3. OUTPUT FORMAT
   - Output ONLY the requested content
   - Do NOT add commentary about the task itself"#;

/// Map-phase template: one chunk of pages to a tagged summary.
pub const CHUNK_SUMMARY_PROMPT: &str = r#"Summarize the following portion of a longer document for exam preparation.

Portion: {title}
{content}

Requirements:
- Write a thorough summary of this portion, keeping the document's structure.
- Mark the most important statements inline as [KEY: statement].
- Mark every definition inline as [DEF: term - meaning].
- Mark every reference to a statute, article or regulation as [LAW: reference].
- Plain text only, no code fences, no LaTeX yet."#;

/// Reduce-phase template: all chunk summaries to one LaTeX document.
pub const MERGE_PROMPT: &str = r#"Merge the following partial summaries of "{title}" into one complete LaTeX study document.

{summaries}

Requirements:
- Produce a single coherent document, removing repetition from overlapping portions.
- Use \section and \subsection mirroring the document's structure.
- Render definitions in a description environment; keep key points as itemized lists.
- Output a COMPLETE compilable LaTeX document starting with \documentclass.
- Output ONLY LaTeX, no code fences, no commentary."#;

/// Optional second pass over the merged document.
pub const ENHANCE_PROMPT: &str = r#"Improve the following LaTeX study document without changing its substance.

{latex}

Requirements:
- Fix inconsistent heading levels and terminology between sections.
- Add cross-references where one section builds on another.
- Keep every fact, definition and reference exactly as given.
- Output the COMPLETE revised LaTeX document only, no code fences."#;

/// Single-shot template: the whole document in one call.
pub const SINGLE_SHOT_PROMPT: &str = r#"Produce a complete study summary of the following document: "{title}".

{content}

Requirements:
- Cover every section; do not stop early.
- Mark key statements as [KEY: statement], definitions as [DEF: term - meaning],
  statute references as [LAW: reference].
- Plain text only."#;

/// Converts a plain-text summary into a LaTeX body (single-shot tail call).
pub const LATEX_CONVERT_PROMPT: &str = r#"Convert the following study summary into a complete LaTeX document.

{summary}

Requirements:
- Use \section and \subsection for the existing structure.
- Turn [KEY: …] markers into emphasised statements, [DEF: …] into a description
  environment, [LAW: …] into \textbf references. Remove the raw markers.
- Output a COMPLETE compilable LaTeX document starting with \documentclass.
- Output ONLY LaTeX, no code fences."#;

/// Hybrid per-section template with pre-extracted terms to anchor coverage.
pub const SECTION_PROMPT: &str = r#"Summarize this section of a study document.

Section: {title}
{content}

The following terms were found in this section and MUST all appear in your summary:
{terms}

Requirements:
- Thorough summary keeping the section's structure.
- Mark key statements as [KEY: …], definitions as [DEF: …], statute references as [LAW: …].
- Plain text only."#;

/// Hybrid synthesis template: section summaries to one LaTeX document.
pub const SYNTHESIS_PROMPT: &str = r#"Combine the following section summaries of "{title}" into one complete LaTeX study document.

{sections}

Requirements:
- One \section per summarized section, in order.
- Preserve every term, definition and reference that appears in the inputs.
- Output a COMPLETE compilable LaTeX document starting with \documentclass.
- Output ONLY LaTeX, no code fences."#;

/// Repair template for the compile-with-autofix loop.
pub const FIX_LATEX_PROMPT: &str = r#"The following LaTeX document fails to compile.

Compiler log (tail):
{error_log}

Document:
{source}

Fix the errors shown in the log. Change as little as possible.
Output the COMPLETE corrected LaTeX document only, no code fences, no commentary."#;

/// Fallback document shell used when a model reply lacks a preamble.
///
/// `%TITLE%` and `%CONTENT%` are substituted verbatim.
pub const LATEX_SHELL: &str = r#"\documentclass[11pt,a4paper]{article}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage{geometry}
\geometry{margin=2.5cm}
\usepackage{enumitem}
\usepackage{hyperref}

\title{%TITLE%}
\date{\today}

\begin{document}
\maketitle
\tableofcontents
\newpage

%CONTENT%

\end{document}
"#;

/// The full template set used for a run.
///
/// Every field defaults to the matching constant above; swap individual
/// templates via struct update syntax or a custom construction.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub system: String,
    pub chunk_summary: String,
    pub merge: String,
    pub enhance: String,
    pub single_shot: String,
    pub latex_convert: String,
    pub section: String,
    pub synthesis: String,
    pub fix_latex: String,
    pub latex_shell: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            chunk_summary: CHUNK_SUMMARY_PROMPT.to_string(),
            merge: MERGE_PROMPT.to_string(),
            enhance: ENHANCE_PROMPT.to_string(),
            single_shot: SINGLE_SHOT_PROMPT.to_string(),
            latex_convert: LATEX_CONVERT_PROMPT.to_string(),
            section: SECTION_PROMPT.to_string(),
            synthesis: SYNTHESIS_PROMPT.to_string(),
            fix_latex: FIX_LATEX_PROMPT.to_string(),
            latex_shell: LATEX_SHELL.to_string(),
        }
    }
}

impl PromptSet {
    /// System prompt with the optional output-language instruction appended.
    pub fn render_system(&self, language: Option<&str>) -> String {
        match language {
            Some(lang) => format!("{}\n\n4. LANGUAGE\n   - Write all output in {lang}.", self.system),
            None => self.system.clone(),
        }
    }

    pub fn render_chunk_summary(&self, title: &str, content: &str) -> String {
        self.chunk_summary
            .replace("{title}", title)
            .replace("{content}", content)
    }

    pub fn render_merge(&self, title: &str, summaries: &str) -> String {
        self.merge
            .replace("{title}", title)
            .replace("{summaries}", summaries)
    }

    pub fn render_enhance(&self, latex: &str) -> String {
        self.enhance.replace("{latex}", latex)
    }

    pub fn render_single_shot(&self, title: &str, content: &str) -> String {
        self.single_shot
            .replace("{title}", title)
            .replace("{content}", content)
    }

    pub fn render_latex_convert(&self, summary: &str) -> String {
        self.latex_convert.replace("{summary}", summary)
    }

    pub fn render_section(&self, title: &str, terms: &str, content: &str) -> String {
        self.section
            .replace("{title}", title)
            .replace("{terms}", terms)
            .replace("{content}", content)
    }

    pub fn render_synthesis(&self, title: &str, sections: &str) -> String {
        self.synthesis
            .replace("{title}", title)
            .replace("{sections}", sections)
    }

    pub fn render_fix_latex(&self, error_log: &str, source: &str) -> String {
        self.fix_latex
            .replace("{error_log}", error_log)
            .replace("{source}", source)
    }

    /// Wrap a bare LaTeX body in the document shell.
    pub fn render_shell(&self, title: &str, content: &str) -> String {
        self.latex_shell
            .replace("%TITLE%", title)
            .replace("%CONTENT%", content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_prompt_substitutes_both_slots() {
        let p = PromptSet::default();
        let rendered = p.render_chunk_summary("Section 1 (pp. 1-15)", "[Page 1]\nbody text");
        assert!(rendered.contains("Section 1 (pp. 1-15)"));
        assert!(rendered.contains("[Page 1]\nbody text"));
        assert!(!rendered.contains("{title}"));
        assert!(!rendered.contains("{content}"));
    }

    #[test]
    fn shell_wraps_title_and_content() {
        let p = PromptSet::default();
        let doc = p.render_shell("Company Law", "\\section{Intro}");
        assert!(doc.starts_with("\\documentclass"));
        assert!(doc.contains("\\title{Company Law}"));
        assert!(doc.contains("\\section{Intro}"));
        assert!(doc.contains("\\end{document}"));
    }

    #[test]
    fn system_prompt_carries_language_hint() {
        let p = PromptSet::default();
        assert!(p.render_system(Some("Italian")).contains("in Italian"));
        assert!(!p.render_system(None).contains("LANGUAGE"));
    }
}
