//! Local document analysis: no API calls, just regex heuristics.
//!
//! Three consumers:
//!
//! * the orchestrator logs a best-effort table-of-contents detection and
//!   derives a document title;
//! * the hybrid strategy extracts legal/technical terms and splits the
//!   document into sections before any prompt is built, so the coverage
//!   validator later has ground truth to check the summary against;
//! * the map phase scrapes `[KEY: …]` / `[DEF: …]` / `[LAW: …]` sentinel
//!   markers out of model replies.
//!
//! All heuristics are advisory. A missed heading or an unmatched statute
//! costs a little summary quality, never a failed run, so the patterns aim
//! for precision over recall.

use crate::pipeline::extract::PageText;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

// ── Sentinel markers ─────────────────────────────────────────────────────

static RE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[KEY:\s*([^\]]+)\]").unwrap());
static RE_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[DEF:\s*([^\]]+)\]").unwrap());
static RE_LAW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[LAW:\s*([^\]]+)\]").unwrap());

/// Scrape `[KEY: …]` markers from a model reply.
pub fn extract_key_points(text: &str) -> Vec<String> {
    collect_tag(&RE_KEY, text)
}

/// Scrape `[DEF: …]` markers from a model reply.
pub fn extract_definitions(text: &str) -> Vec<String> {
    collect_tag(&RE_DEF, text)
}

/// Scrape `[LAW: …]` markers from a model reply.
pub fn extract_law_refs(text: &str) -> Vec<String> {
    collect_tag(&RE_LAW, text)
}

fn collect_tag(re: &Regex, text: &str) -> Vec<String> {
    re.captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Term extraction (hybrid strategy) ────────────────────────────────────

/// What kind of thing a scanned term is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Law,
    Definition,
    Concept,
}

/// A term found by the regex scan, with where it first appeared.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedTerm {
    pub term: String,
    pub kind: TermKind,
    /// Snippet of surrounding text from the first occurrence.
    pub context: String,
    /// Page of the first occurrence.
    pub page: u32,
    /// Occurrences across the whole document, case-insensitive.
    pub frequency: usize,
}

static LAW_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bArt(?:icle)?\.?\s*\d+(?:\s*(?:bis|ter|quater))?",
        r"(?i)\bLaw\s+(?:No\.?\s*)?\d+/\d{2,4}",
        r"(?i)\bLegislative\s+Decree\s+(?:No\.?\s*)?\d+/\d{2,4}",
        r"(?i)\bDecree\s+(?:No\.?\s*)?\d+/\d{2,4}",
        r"(?i)\bDirective\s+(?:\(EU\)\s+)?\d+/\d+",
        r"(?i)\bRegulation\s+\(EU\)\s+(?:No\.?\s*)?\d+/\d+",
        r"§\s*\d+[a-z]?",
        r"(?i)\bGDPR\b",
        r"(?i)\b(?:Civil|Penal|Criminal|Commercial)\s+Code\b",
        r"(?i)\bthe\s+Constitution\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DEFINITION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#""([^"]{2,60})"\s+(?:means|shall mean)\b"#,
        r#"(?i)\bthe term\s+["']([^"']{2,60})["']"#,
        r"(?i)\b([A-Z][A-Za-z\s-]{2,50}?)\s+is defined as\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static CONCEPT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:principle|doctrine)\s+of\s+(\w+(?:\s+\w+){0,3})",
        r"(?i)\b(?:right|duty|obligation)\s+(?:to|of)\s+(\w+(?:\s+\w+){0,3})",
        r"(?i)\bliability\s+for\s+(\w+(?:\s+\w+){0,2})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Width of the context snippet stored with each term, in characters.
const CONTEXT_CHARS: usize = 80;

/// Scan every page for law references, definitions and named concepts.
///
/// Terms are deduplicated case-insensitively per kind; the entry keeps the
/// first occurrence's context and page and counts every repeat.
pub fn scan_terms(pages: &[PageText]) -> Vec<ExtractedTerm> {
    let mut terms: Vec<ExtractedTerm> = Vec::new();
    let mut index: HashMap<(String, TermKind), usize> = HashMap::new();

    for page in pages {
        scan_family(&LAW_PATTERNS, TermKind::Law, false, page, &mut terms, &mut index);
        scan_family(
            &DEFINITION_PATTERNS,
            TermKind::Definition,
            true,
            page,
            &mut terms,
            &mut index,
        );
        scan_family(
            &CONCEPT_PATTERNS,
            TermKind::Concept,
            true,
            page,
            &mut terms,
            &mut index,
        );
    }
    terms
}

fn scan_family(
    patterns: &[Regex],
    kind: TermKind,
    captured: bool,
    page: &PageText,
    terms: &mut Vec<ExtractedTerm>,
    index: &mut HashMap<(String, TermKind), usize>,
) {
    for re in patterns {
        for caps in re.captures_iter(&page.text) {
            let m = if captured {
                match caps.get(1) {
                    Some(g) => g,
                    None => continue,
                }
            } else {
                // The whole match is the term (statute citations).
                match caps.get(0) {
                    Some(g) => g,
                    None => continue,
                }
            };
            let term = normalize_ws(m.as_str());
            if term.len() < 2 || term.len() > 80 {
                continue;
            }

            let key = (term.to_lowercase(), kind);
            if let Some(&i) = index.get(&key) {
                terms[i].frequency += 1;
                continue;
            }
            index.insert(key, terms.len());
            terms.push(ExtractedTerm {
                context: context_around(&page.text, m.start(), m.end()),
                term,
                kind,
                page: page.page_number,
                frequency: 1,
            });
        }
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn context_around(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS / 2)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_CHARS / 2)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    normalize_ws(&text[from..to])
}

/// Render a term list as prompt bullet lines.
pub fn terms_block(terms: &[ExtractedTerm]) -> String {
    terms
        .iter()
        .map(|t| {
            format!(
                "- {} ({})",
                t.term,
                match t.kind {
                    TermKind::Law => "law reference",
                    TermKind::Definition => "definition",
                    TermKind::Concept => "concept",
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Section splitting (hybrid strategy) ──────────────────────────────────

/// A heading-delimited region of the document.
#[derive(Debug, Clone)]
pub struct DocumentSection {
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
    pub text: String,
}

static RE_NUMBERED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}(?:\.\d{1,2})*\.?\s+[A-Z]").unwrap());
static RE_STRUCT_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:chapter|part|section|title|book)\s+(?:[ivxlcdm]+|\d+)\b").unwrap()
});

/// Sections shorter than this merge into their predecessor.
const MIN_SECTION_CHARS: usize = 200;

fn is_heading(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.len() > 80 {
        return false;
    }
    if RE_NUMBERED_HEADING.is_match(line) || RE_STRUCT_HEADING.is_match(line) {
        return true;
    }
    // ALL-CAPS lines with enough letters read as headings in legal texts.
    let alpha: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    alpha.len() >= 6 && alpha.iter().all(|c| c.is_uppercase())
}

/// Split pages into heading-delimited sections.
///
/// Documents without recognisable headings come back as one section so the
/// hybrid strategy degrades to a whole-document summary rather than failing.
pub fn split_sections(pages: &[PageText]) -> Vec<DocumentSection> {
    if pages.is_empty() {
        return Vec::new();
    }
    if !pages.iter().any(|p| p.text.lines().any(is_heading)) {
        return vec![whole_document_section(pages)];
    }

    let mut sections: Vec<DocumentSection> = Vec::new();
    let mut current: Option<DocumentSection> = None;

    for page in pages {
        for line in page.text.lines() {
            if is_heading(line) {
                if let Some(done) = current.take() {
                    sections.push(done);
                }
                current = Some(DocumentSection {
                    title: truncate_title(line.trim()),
                    start_page: page.page_number,
                    end_page: page.page_number,
                    text: String::new(),
                });
            } else {
                let section = current.get_or_insert_with(|| DocumentSection {
                    title: "Opening".to_string(),
                    start_page: page.page_number,
                    end_page: page.page_number,
                    text: String::new(),
                });
                section.text.push_str(line);
                section.text.push('\n');
                section.end_page = page.page_number;
            }
        }
    }
    if let Some(done) = current.take() {
        sections.push(done);
    }

    let sections = merge_small_sections(sections);
    if sections.is_empty() {
        // Headings only, no body text worth splitting.
        return vec![whole_document_section(pages)];
    }
    sections
}

fn merge_small_sections(sections: Vec<DocumentSection>) -> Vec<DocumentSection> {
    let mut merged: Vec<DocumentSection> = Vec::new();
    for section in sections {
        if section.text.trim().len() < MIN_SECTION_CHARS {
            if let Some(prev) = merged.last_mut() {
                prev.text.push_str(&format!("\n{}\n{}", section.title, section.text));
                prev.end_page = prev.end_page.max(section.end_page);
                continue;
            }
        }
        merged.push(section);
    }
    // A lone undersized head section is still worth keeping only if it has text.
    merged.retain(|s| !s.text.trim().is_empty());
    merged
}

fn whole_document_section(pages: &[PageText]) -> DocumentSection {
    DocumentSection {
        title: "Full Document".to_string(),
        start_page: pages[0].page_number,
        end_page: pages[pages.len() - 1].page_number,
        text: pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn truncate_title(line: &str) -> String {
    if line.chars().count() <= 100 {
        line.to_string()
    } else {
        line.chars().take(100).collect()
    }
}

// ── TOC detection and titles ─────────────────────────────────────────────

const TOC_KEYWORDS: [&str; 6] = [
    "table of contents",
    "contents",
    "index",
    "indice",
    "sommario",
    "chapter overview",
];

static RE_TRAILING_PAGE_NUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)\d+\s*$").unwrap());

/// Best-effort scan for table-of-contents pages among the first `scan_pages`.
///
/// A page qualifies when it mentions a TOC keyword and has several lines
/// ending in page numbers. Purely informational.
pub fn detect_toc(pages: &[PageText], scan_pages: usize) -> Vec<u32> {
    pages
        .iter()
        .take(scan_pages)
        .filter(|p| {
            let lower = p.text.to_lowercase();
            TOC_KEYWORDS.iter().any(|k| lower.contains(k))
                && RE_TRAILING_PAGE_NUM.find_iter(&p.text).count() > 5
        })
        .map(|p| p.page_number)
        .collect()
}

/// Pick a plausible title line from the first page.
pub fn detect_title(pages: &[PageText]) -> Option<String> {
    let first = pages.first()?;
    first
        .text
        .lines()
        .map(str::trim)
        .find(|line| {
            let n = line.chars().count();
            (10..=120).contains(&n) && !line.chars().next().is_some_and(|c| c.is_ascii_digit())
        })
        .map(normalize_ws)
}

/// Derive a display title from the input file name.
pub fn title_from_path(path: &std::path::Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Document");
    stem.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
