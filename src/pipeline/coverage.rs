//! Coverage validation: how much of the scanned terminology survived.
//!
//! After the hybrid pipeline merges its section summaries, this module
//! checks which of the terms found during local analysis actually appear in
//! the final text. String matching only, no model calls. The result is a
//! review hint surfaced in the stats, never a gate: a summary is allowed to
//! drop terms, the reader just gets told which ones.

use crate::output::CoverageReport;
use crate::pipeline::analyze::ExtractedTerm;
use tracing::debug;

/// Uncovered terms listed in the report before truncation.
const MISSING_CAP: usize = 20;

/// Words this short ("the", "of", "law") match everywhere and prove nothing.
const SIGNIFICANT_WORD_LEN: usize = 4;

/// Check every extracted term against the final text.
///
/// A term counts as covered when the text contains it verbatim
/// (case-insensitive), or contains at least one of its significant words.
/// An empty term list yields 100%: nothing was asked for, nothing is
/// missing.
pub fn check_coverage(terms: &[ExtractedTerm], final_text: &str) -> CoverageReport {
    let haystack = final_text.to_lowercase();

    let mut covered = 0usize;
    let mut missing: Vec<String> = Vec::new();

    for term in terms {
        let needle = term.term.to_lowercase();
        if haystack.contains(&needle) || partially_covered(&needle, &haystack) {
            covered += 1;
        } else if !missing.iter().any(|m| m.eq_ignore_ascii_case(&term.term)) {
            missing.push(term.term.clone());
        }
    }

    let total = terms.len();
    let coverage_pct = if total == 0 {
        100.0
    } else {
        covered as f64 / total as f64 * 100.0
    };
    debug!(total, covered, coverage_pct, "coverage check complete");

    missing.truncate(MISSING_CAP);
    CoverageReport {
        total_terms: total,
        covered_terms: covered,
        coverage_pct,
        missing,
    }
}

fn partially_covered(needle: &str, haystack: &str) -> bool {
    needle
        .split_whitespace()
        .filter(|w| w.chars().count() > SIGNIFICANT_WORD_LEN)
        .any(|w| haystack.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analyze::TermKind;

    fn term(text: &str) -> ExtractedTerm {
        ExtractedTerm {
            term: text.to_string(),
            kind: TermKind::Concept,
            context: String::new(),
            page: 1,
            frequency: 1,
        }
    }

    #[test]
    fn literal_match_is_covered_case_insensitively() {
        let report = check_coverage(
            &[term("Article 2043")],
            "Liability follows from ARTICLE 2043 of the code.",
        );
        assert_eq!(report.covered_terms, 1);
        assert_eq!(report.coverage_pct, 100.0);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn significant_word_counts_as_partial_match() {
        // "negligence" appears even though the full phrase does not.
        let report = check_coverage(
            &[term("contributory negligence doctrine")],
            "The court weighed the negligence of both parties.",
        );
        assert_eq!(report.covered_terms, 1);
    }

    #[test]
    fn short_words_do_not_count_as_partial_match() {
        // No word of "duty of care" exceeds four chars, so the shared word
        // "care" in the haystack must not count as coverage.
        let report = check_coverage(&[term("duty of care")], "The care due here is unrelated.");
        assert_eq!(report.covered_terms, 0);
        assert_eq!(report.missing, vec!["duty of care".to_string()]);
    }

    #[test]
    fn missing_terms_are_deduplicated_and_counted() {
        let terms = vec![term("good faith"), term("Good Faith"), term("estoppel")];
        let report = check_coverage(&terms, "Nothing relevant here.");
        assert_eq!(report.total_terms, 3);
        assert_eq!(report.covered_terms, 0);
        assert_eq!(report.coverage_pct, 0.0);
        assert_eq!(report.missing.len(), 2);
    }

    #[test]
    fn empty_term_list_is_full_coverage() {
        let report = check_coverage(&[], "any text");
        assert_eq!(report.total_terms, 0);
        assert_eq!(report.coverage_pct, 100.0);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn missing_list_is_capped() {
        let terms: Vec<ExtractedTerm> =
            (0..40).map(|i| term(&format!("unmatched-term-{i}"))).collect();
        let report = check_coverage(&terms, "completely unrelated text");
        assert_eq!(report.total_terms, 40);
        assert_eq!(report.missing.len(), 20);
    }
}
