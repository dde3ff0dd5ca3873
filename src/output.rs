//! Output types: the final summary, per-chunk records and run statistics.
//!
//! A successful run returns a [`RunOutput`]. The LaTeX document is the
//! primary artifact; [`ChunkSummary`] items and [`RunStats`] exist so
//! embedders can render their own views (a GUI chunk list, a cost estimate)
//! without re-parsing anything. Everything here serialises with serde, and
//! the sidecar files written next to the `.tex` are exactly these types in
//! pretty-printed JSON.

use crate::config::Strategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Statistics accumulated over one run.
///
/// Character counts follow the document, not the wire: `characters_in` is
/// the extracted source text, `characters_out` the final LaTeX. `api_calls`
/// counts every external invocation including retried ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_pages: usize,
    pub total_chunks: usize,
    pub api_calls: u64,
    pub characters_in: usize,
    pub characters_out: usize,
    pub elapsed_seconds: f64,
}

/// One summarized chunk from the map phase.
///
/// `key_points`, `definitions` and `law_refs` are scraped from the model
/// reply via the `[KEY: …]` / `[DEF: …]` / `[LAW: …]` sentinel markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub chunk_id: usize,
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
    pub summary: String,
    pub key_points: Vec<String>,
    pub definitions: Vec<String>,
    pub law_refs: Vec<String>,
}

/// Sidecar projection of a [`ChunkSummary`] with a bounded preview.
///
/// The full summaries already live inside the merged document; the sidecar
/// keeps the JSON small enough to eyeball.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: usize,
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
    pub key_points: Vec<String>,
    pub definitions: Vec<String>,
    pub law_refs: Vec<String>,
    pub summary_preview: String,
}

/// Preview cap for [`ChunkRecord::summary_preview`], in characters.
const PREVIEW_CHARS: usize = 500;

impl ChunkRecord {
    /// Project a summary into its sidecar record.
    pub fn from_summary(s: &ChunkSummary) -> Self {
        let mut preview: String = s.summary.chars().take(PREVIEW_CHARS).collect();
        if s.summary.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            chunk_id: s.chunk_id,
            title: s.title.clone(),
            start_page: s.start_page,
            end_page: s.end_page,
            key_points: s.key_points.clone(),
            definitions: s.definitions.clone(),
            law_refs: s.law_refs.clone(),
            summary_preview: preview,
        }
    }
}

/// Advisory report from the coverage validator (hybrid strategy).
///
/// Never gates the pipeline; a low percentage is a review hint, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_terms: usize,
    pub covered_terms: usize,
    pub coverage_pct: f64,
    /// Uncovered terms, capped so the stats file stays readable.
    pub missing: Vec<String>,
}

/// Paths of the artifacts a directory run wrote.
#[derive(Debug, Clone, Default)]
pub struct RunArtifacts {
    pub tex: PathBuf,
    pub chunks: PathBuf,
    pub stats: PathBuf,
    /// Written by the hybrid strategy only.
    pub analysis: Option<PathBuf>,
    /// Present when compilation was requested and succeeded.
    pub pdf: Option<PathBuf>,
}

/// The complete result of a summarization run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Final LaTeX document.
    pub latex: String,
    /// Per-chunk (or per-section) summaries in processing order.
    pub chunks: Vec<ChunkSummary>,
    pub stats: RunStats,
    /// Strategy that actually ran; differs from the configured one when
    /// single-shot fell back to map-reduce.
    pub strategy_used: Strategy,
    pub toc_detected: bool,
    pub coverage: Option<CoverageReport>,
    /// `None` for in-memory runs, populated by `summarize_to_dir`.
    pub artifacts: Option<RunArtifacts>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary(len: usize) -> ChunkSummary {
        ChunkSummary {
            chunk_id: 0,
            title: "Section 1 (pp. 1-15)".into(),
            start_page: 1,
            end_page: 15,
            summary: "x".repeat(len),
            key_points: vec!["point".into()],
            definitions: vec![],
            law_refs: vec!["Art. 2043".into()],
        }
    }

    #[test]
    fn preview_is_capped_with_ellipsis() {
        let record = ChunkRecord::from_summary(&sample_summary(2_000));
        assert_eq!(record.summary_preview.chars().count(), 503);
        assert!(record.summary_preview.ends_with("..."));
    }

    #[test]
    fn short_preview_is_untouched() {
        let record = ChunkRecord::from_summary(&sample_summary(80));
        assert_eq!(record.summary_preview.chars().count(), 80);
        assert!(!record.summary_preview.ends_with("..."));
    }

    #[test]
    fn preview_cap_respects_char_boundaries() {
        let mut s = sample_summary(0);
        s.summary = "è".repeat(600);
        let record = ChunkRecord::from_summary(&s);
        assert!(record.summary_preview.starts_with('è'));
        assert_eq!(record.summary_preview.chars().count(), 503);
    }

    #[test]
    fn stats_serialise_with_snake_case_keys() {
        let stats = RunStats {
            total_pages: 32,
            total_chunks: 3,
            api_calls: 5,
            characters_in: 10_000,
            characters_out: 4_000,
            elapsed_seconds: 12.5,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total_pages\":32"));
        assert!(json.contains("\"api_calls\":5"));
        assert!(json.contains("\"elapsed_seconds\":12.5"));
    }
}
