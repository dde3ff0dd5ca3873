//! Post-processing: deterministic cleanup of model-generated LaTeX.
//!
//! ## Why is post-processing necessary?
//!
//! Even well-prompted models occasionally wrap output in ` ```latex … ``` `
//! fences despite the prompt saying not to, prepend a "Here is the
//! document:" line before `\documentclass`, or emit CRLF line endings and
//! zero-width characters that upset diff tools. These are cheap to fix
//! deterministically, and fixing them here keeps the prompts focused on
//! *what to write*, not on formatting edge cases.
//!
//! Fence stripping is idempotent: running any of these functions on their
//! own output changes nothing, so a response that arrives unfenced (or
//! double-fenced) takes the same path as every other.

use crate::prompts::PromptSet;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply the textual cleanup passes to raw model output.
///
/// Used on every reply, chunk summaries included. Rules (in order):
/// 1. Strip outer code fences (```latex, ```tex, ```markdown or bare)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Ensure the text ends with exactly one newline
pub fn clean_output(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:latex|tex|markdown)?[ \t]*\n(.*)\n```\s*$").unwrap());

/// Remove outer code fences, repeatedly, until none remain.
///
/// The loop makes idempotence trivial: output never starts with a fence, so
/// a second application is a no-op even for double-fenced replies.
pub fn strip_code_fences(input: &str) -> String {
    let mut current = input.trim().to_string();
    while let Some(caps) = RE_OUTER_FENCES.captures(&current) {
        current = caps[1].trim().to_string();
    }
    current
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    // In LaTeX one blank line is a paragraph break; more is noise.
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Ensure file ends with single newline ─────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Document completion ──────────────────────────────────────────────────

static RE_EMBEDDED_DOC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:latex|tex)?[ \t]*\n(.*?)\n```").unwrap());

/// Guarantee the result is a complete LaTeX document.
///
/// Three cases, in order of preference:
/// * The text already contains `\documentclass`: slice from there to the
///   end of `\end{document}`, dropping any conversational chatter around
///   the document, and append a missing `\end{document}`.
/// * A fenced block somewhere in the text contains a full document: use it.
/// * Otherwise the text is treated as a body and wrapped in the configured
///   document shell with the (escaped) title.
pub fn ensure_document(latex: &str, title: &str, prompts: &PromptSet) -> String {
    if let Some(start) = latex.find("\\documentclass") {
        let end = latex
            .rfind("\\end{document}")
            .map(|i| i + "\\end{document}".len())
            .filter(|&i| i > start)
            .unwrap_or(latex.len());
        let mut doc = latex[start..end].trim_end().to_string();
        if !doc.contains("\\end{document}") {
            doc.push_str("\n\\end{document}");
        }
        doc.push('\n');
        return doc;
    }

    for caps in RE_EMBEDDED_DOC.captures_iter(latex) {
        if caps[1].contains("\\documentclass") {
            return ensure_document(caps[1].trim(), title, prompts);
        }
    }

    prompts.render_shell(&escape_latex(title), latex.trim())
}

/// Escape text destined for LaTeX argument position (titles, headings).
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' => out.push_str("\\&"),
            '%' => out.push_str("\\%"),
            '$' => out.push_str("\\$"),
            '#' => out.push_str("\\#"),
            '_' => out.push_str("\\_"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            other => out.push(other),
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_latex_fences() {
        let input = "```latex\n\\section{A}\nbody\n```";
        assert_eq!(strip_code_fences(input), "\\section{A}\nbody");
    }

    #[test]
    fn strips_bare_and_tex_fences() {
        assert_eq!(strip_code_fences("```\ntext\n```"), "text");
        assert_eq!(strip_code_fences("```tex\ntext\n```"), "text");
        assert_eq!(strip_code_fences("```markdown\ntext\n```"), "text");
    }

    #[test]
    fn unfenced_input_passes_through() {
        assert_eq!(strip_code_fences("\\section{A}"), "\\section{A}");
    }

    #[test]
    fn fence_stripping_is_idempotent() {
        let cases = [
            "```latex\n\\section{A}\nbody\n```",
            "```\n```latex\ninner\n```\n```",
            "plain text with ``` inline",
            "\\documentclass{article}",
        ];
        for input in cases {
            let once = strip_code_fences(input);
            let twice = strip_code_fences(&once);
            assert_eq!(once, twice, "not idempotent for: {input}");
        }
    }

    #[test]
    fn double_fenced_reply_is_fully_unwrapped() {
        let input = "```\n```latex\n\\section{A}\n```\n```";
        assert_eq!(strip_code_fences(input), "\\section{A}");
    }

    #[test]
    fn clean_output_normalises_endings_and_blanks() {
        let input = "```latex\nline one   \r\n\r\n\r\n\r\nline two\u{200B}\n```";
        assert_eq!(clean_output(input), "line one\n\nline two\n");
    }

    #[test]
    fn clean_output_of_empty_reply_is_single_newline() {
        assert_eq!(clean_output("```\n\n```"), "\n");
    }

    #[test]
    fn ensure_document_slices_off_chatter() {
        let p = PromptSet::default();
        let input = "Sure, here is the document:\n\\documentclass{article}\n\\begin{document}\nhi\n\\end{document}\nHope this helps!";
        let doc = ensure_document(input, "T", &p);
        assert!(doc.starts_with("\\documentclass"));
        assert!(doc.trim_end().ends_with("\\end{document}"));
        assert!(!doc.contains("Hope this helps"));
    }

    #[test]
    fn ensure_document_appends_missing_end() {
        let p = PromptSet::default();
        let input = "\\documentclass{article}\n\\begin{document}\ntruncated";
        let doc = ensure_document(input, "T", &p);
        assert!(doc.trim_end().ends_with("\\end{document}"));
    }

    #[test]
    fn ensure_document_uses_embedded_fenced_document() {
        let p = PromptSet::default();
        let input = "Explanation first.\n```latex\n\\documentclass{article}\n\\begin{document}\nbody\n\\end{document}\n```\nTrailing notes.";
        let doc = ensure_document(input, "T", &p);
        assert!(doc.starts_with("\\documentclass"));
        assert!(!doc.contains("Explanation"));
        assert!(!doc.contains("Trailing"));
    }

    #[test]
    fn ensure_document_wraps_bare_body_in_shell() {
        let p = PromptSet::default();
        let doc = ensure_document("\\section{Only a body}", "Notes & Cases", &p);
        assert!(doc.starts_with("\\documentclass"));
        assert!(doc.contains("\\title{Notes \\& Cases}"));
        assert!(doc.contains("\\section{Only a body}"));
        assert!(doc.contains("\\end{document}"));
    }

    #[test]
    fn latex_escaping_covers_specials() {
        assert_eq!(escape_latex("50% & $3 #1_a"), "50\\% \\& \\$3 \\#1\\_a");
        assert_eq!(escape_latex("a~b^c"), "a\\textasciitilde{}b\\textasciicircum{}c");
        assert_eq!(escape_latex("back\\slash"), "back\\textbackslash{}slash");
    }
}
