//! Configuration types for document summarization runs.
//!
//! All run behaviour is controlled through [`SummaryConfig`], built via its
//! [`SummaryConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across threads, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! The library never reads environment variables: API keys, model name and
//! every timing knob are injected here by the embedding application (the
//! bundled CLI maps `GEMINI_API_KEY`/`GEMINI_API_KEYS` into
//! [`SummaryConfigBuilder::api_keys`]).

use crate::error::StudytexError;
use crate::llm::TextModel;
use crate::progress::{NoopProgress, Progress};
use crate::prompts::PromptSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a summarization run.
///
/// Built via [`SummaryConfig::builder()`].
///
/// # Example
/// ```rust
/// use studytex::{Strategy, SummaryConfig};
///
/// let config = SummaryConfig::builder()
///     .api_keys(vec!["key-a".into(), "key-b".into()])
///     .strategy(Strategy::MapReduce)
///     .chunk_size(12)
///     .overlap(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct SummaryConfig {
    /// Which summarization strategy the orchestrator runs. Default: [`Strategy::MapReduce`].
    pub strategy: Strategy,

    /// API keys tried in order, rotated on rate limits. Must not be empty.
    ///
    /// With several keys a 429 on one key costs nothing: the pool rotates to
    /// the next available key and retries immediately. With a single key
    /// every rate limit forces a fixed backoff sleep.
    pub api_keys: Vec<String>,

    /// Model identifier sent to the API. Default: "gemini-2.5-flash".
    pub model: String,

    /// Pre-constructed model client. Takes precedence over `model`; tests
    /// inject mocks here so no network client is ever built.
    pub model_client: Option<Arc<dyn TextModel>>,

    /// Progress sink receiving `(message, percent)` events. Default: no-op.
    pub progress: Progress,

    /// Pages per chunk in the map phase. Default: 15.
    ///
    /// Larger chunks mean fewer API calls but each prompt carries more text;
    /// past ~20 pages the per-chunk summaries start losing detail.
    pub chunk_size: usize,

    /// Pages shared between consecutive chunks. Default: 2.
    ///
    /// The overlap keeps arguments that straddle a chunk boundary visible to
    /// both summaries. Must be smaller than `chunk_size`.
    pub overlap: usize,

    /// Retry attempts per credential before a call is abandoned. Default: 5.
    ///
    /// The total attempt budget for one logical call is
    /// `max_retries × api_keys.len()`, so adding keys buys more attempts as
    /// well as more quota.
    pub max_retries: u32,

    /// Cooldown stamped on a key after a rate-limit response, in seconds. Default: 60.
    pub rate_limit_cooldown_secs: u64,

    /// Sleep when every key is cooling down, in seconds. Default: 30.
    ///
    /// After the sleep all cooldowns are cleared and the pool is retried;
    /// quota windows usually reopen within half a minute.
    pub pool_backoff_secs: u64,

    /// Delay before retrying a transient failure, in milliseconds. Default: 5000.
    pub transient_delay_ms: u64,

    /// Courtesy pause between consecutive map calls, in milliseconds. Default: 2000.
    pub chunk_pause_ms: u64,

    /// Per-chunk character cap applied before prompting. Default: 50 000.
    ///
    /// Oversized chunks are truncated, not split; the overlap of the next
    /// chunk recovers most of what the cap drops.
    pub chunk_char_cap: usize,

    /// Characters-per-token estimate for the single-shot fit check. Default: 4.
    pub chars_per_token: usize,

    /// Token budget above which [`Strategy::SingleShot`] falls back to
    /// map-reduce. Default: 800 000.
    pub single_shot_token_limit: usize,

    /// Sampling temperature for the LLM completion. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 65 536.
    ///
    /// Merge and enhance calls emit whole LaTeX documents; a small budget
    /// silently truncates them mid-environment and the compile step then
    /// fails on an unmatched `\begin`.
    pub max_output_tokens: u32,

    /// Per-API-call timeout in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Run the enhancement pass after the reduce step. Default: true.
    pub enhance: bool,

    /// Compile the final LaTeX to PDF after persisting it. Default: false.
    pub compile_pdf: bool,

    /// Compile attempts (each failure triggers an LLM auto-fix). Default: 3.
    pub compile_max_attempts: u32,

    /// Wall-clock timeout per typesetter pass, in seconds. Default: 180.
    pub compile_timeout_secs: u64,

    /// How many leading pages the TOC heuristic scans. Default: 15.
    pub toc_scan_pages: usize,

    /// Output language hint inserted into prompts. `None` lets the model
    /// follow the document's language.
    pub language: Option<String>,

    /// Document title override. `None` derives one from the file name.
    pub title: Option<String>,

    /// Prompt templates used for every call. Default: [`PromptSet::default()`].
    pub prompts: PromptSet,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            api_keys: Vec::new(),
            model: "gemini-2.5-flash".to_string(),
            model_client: None,
            progress: Arc::new(NoopProgress),
            chunk_size: 15,
            overlap: 2,
            max_retries: 5,
            rate_limit_cooldown_secs: 60,
            pool_backoff_secs: 30,
            transient_delay_ms: 5_000,
            chunk_pause_ms: 2_000,
            chunk_char_cap: 50_000,
            chars_per_token: 4,
            single_shot_token_limit: 800_000,
            temperature: 0.3,
            max_output_tokens: 65_536,
            api_timeout_secs: 300,
            enhance: true,
            compile_pdf: false,
            compile_max_attempts: 3,
            compile_timeout_secs: 180,
            toc_scan_pages: 15,
            language: None,
            title: None,
            prompts: PromptSet::default(),
        }
    }
}

impl fmt::Debug for SummaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryConfig")
            .field("strategy", &self.strategy)
            .field("api_keys", &format!("<{} key(s)>", self.api_keys.len()))
            .field("model", &self.model)
            .field(
                "model_client",
                &self.model_client.as_ref().map(|_| "<dyn TextModel>"),
            )
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .field("max_retries", &self.max_retries)
            .field("rate_limit_cooldown_secs", &self.rate_limit_cooldown_secs)
            .field("pool_backoff_secs", &self.pool_backoff_secs)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("enhance", &self.enhance)
            .field("compile_pdf", &self.compile_pdf)
            .field("language", &self.language)
            .finish()
    }
}

impl SummaryConfig {
    /// Create a new builder for `SummaryConfig`.
    pub fn builder() -> SummaryConfigBuilder {
        SummaryConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SummaryConfig`].
#[derive(Debug)]
pub struct SummaryConfigBuilder {
    config: SummaryConfig,
}

impl SummaryConfigBuilder {
    pub fn strategy(mut self, s: Strategy) -> Self {
        self.config.strategy = s;
        self
    }

    pub fn api_keys(mut self, keys: Vec<String>) -> Self {
        self.config.api_keys = keys;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn model_client(mut self, client: Arc<dyn TextModel>) -> Self {
        self.config.model_client = Some(client);
        self
    }

    pub fn progress(mut self, sink: Progress) -> Self {
        self.config.progress = sink;
        self
    }

    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages;
        self
    }

    pub fn overlap(mut self, pages: usize) -> Self {
        self.config.overlap = pages;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn rate_limit_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.rate_limit_cooldown_secs = secs;
        self
    }

    pub fn pool_backoff_secs(mut self, secs: u64) -> Self {
        self.config.pool_backoff_secs = secs;
        self
    }

    pub fn transient_delay_ms(mut self, ms: u64) -> Self {
        self.config.transient_delay_ms = ms;
        self
    }

    pub fn chunk_pause_ms(mut self, ms: u64) -> Self {
        self.config.chunk_pause_ms = ms;
        self
    }

    pub fn chunk_char_cap(mut self, chars: usize) -> Self {
        self.config.chunk_char_cap = chars.max(1_000);
        self
    }

    pub fn chars_per_token(mut self, chars: usize) -> Self {
        self.config.chars_per_token = chars.max(1);
        self
    }

    pub fn single_shot_token_limit(mut self, tokens: usize) -> Self {
        self.config.single_shot_token_limit = tokens;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn enhance(mut self, v: bool) -> Self {
        self.config.enhance = v;
        self
    }

    pub fn compile_pdf(mut self, v: bool) -> Self {
        self.config.compile_pdf = v;
        self
    }

    pub fn compile_max_attempts(mut self, n: u32) -> Self {
        self.config.compile_max_attempts = n.max(1);
        self
    }

    pub fn compile_timeout_secs(mut self, secs: u64) -> Self {
        self.config.compile_timeout_secs = secs;
        self
    }

    pub fn toc_scan_pages(mut self, pages: usize) -> Self {
        self.config.toc_scan_pages = pages;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = Some(lang.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn prompts(mut self, prompts: PromptSet) -> Self {
        self.config.prompts = prompts;
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Validation happens here, before any file or network I/O, so a bad
    /// chunk geometry or an empty key pool can never burn quota first.
    pub fn build(self) -> Result<SummaryConfig, StudytexError> {
        let c = &self.config;
        if c.api_keys.is_empty() {
            return Err(StudytexError::InvalidConfig(
                "at least one API key is required".into(),
            ));
        }
        if c.chunk_size == 0 {
            return Err(StudytexError::InvalidConfig(
                "chunk_size must be ≥ 1 page".into(),
            ));
        }
        if c.overlap >= c.chunk_size {
            return Err(StudytexError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                c.overlap, c.chunk_size
            )));
        }
        Ok(self.config)
    }
}

// ── Strategy ─────────────────────────────────────────────────────────────

/// Summarization strategy executed by the orchestrator.
///
/// One orchestrator runs all three; the strategy only selects which API
/// calls happen between extraction and the shared postprocess/persist tail:
///
/// | Strategy | API calls | Use case |
/// |----------|-----------|----------|
/// | `MapReduce` | one per chunk + merge + enhance | long documents (default) |
/// | `SingleShot` | whole-document summary + LaTeX conversion | short documents; falls back to `MapReduce` past the token limit |
/// | `Hybrid` | one per detected section + synthesis | study material where term coverage matters |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Chunked map-reduce: summarize page windows, then merge. (default)
    #[default]
    MapReduce,
    /// Single whole-document call while the text fits the token budget.
    SingleShot,
    /// Regex term/section analysis first, then per-section summaries and a
    /// synthesis pass, with a coverage report on the result.
    Hybrid,
}

impl Strategy {
    /// Parse a strategy name as the CLI accepts it, aliases included.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "map-reduce" | "mapreduce" | "chunked" => Some(Strategy::MapReduce),
            "single-shot" | "singleshot" | "stuff" => Some(Strategy::SingleShot),
            "hybrid" | "smart" => Some(Strategy::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::MapReduce => "map-reduce",
            Strategy::SingleShot => "single-shot",
            Strategy::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_empty_key_pool() {
        let err = SummaryConfig::builder().build().unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn build_rejects_overlap_not_smaller_than_chunk_size() {
        let err = SummaryConfig::builder()
            .api_keys(vec!["k".into()])
            .chunk_size(10)
            .overlap(10)
            .build()
            .unwrap_err();
        assert!(matches!(err, StudytexError::InvalidConfig(_)));
        assert!(err.to_string().contains("overlap (10)"));
    }

    #[test]
    fn build_rejects_zero_chunk_size() {
        let err = SummaryConfig::builder()
            .api_keys(vec!["k".into()])
            .chunk_size(0)
            .overlap(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, StudytexError::InvalidConfig(_)));
    }

    #[test]
    fn builder_clamps_and_defaults() {
        let config = SummaryConfig::builder()
            .api_keys(vec!["k".into()])
            .max_retries(0)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.strategy, Strategy::MapReduce);
        assert_eq!(config.chunk_size, 15);
        assert_eq!(config.overlap, 2);
    }

    #[test]
    fn strategy_parse_aliases() {
        assert_eq!(Strategy::parse("map-reduce"), Some(Strategy::MapReduce));
        assert_eq!(Strategy::parse("STUFF"), Some(Strategy::SingleShot));
        assert_eq!(Strategy::parse("hybrid"), Some(Strategy::Hybrid));
        assert_eq!(Strategy::parse("refine"), None);
    }
}
