//! Resilient LLM invocation: one logical call, many physical attempts.
//!
//! Every prompt in the pipeline goes through [`ResilientCaller::call`],
//! which is the only place retry policy lives. A call moves through a small
//! state machine:
//!
//! ```text
//!            ┌──────────── retry (immediately) ────────────┐
//!            │                                             │
//! ATTEMPTING ├─ success ──────────────────────▶ SUCCEEDED  │
//!            ├─ rate limit ─▶ cooldown + rotate ── ok ─────┘
//!            │                    │ all keys cooling
//!            │                    ▼
//!            │               fixed backoff, clear cooldowns, retry
//!            ├─ transient ─▶ short delay, retry
//!            └─ budget exhausted ─▶ ExhaustedRetries
//! ```
//!
//! Rotation beats waiting: a 429 on one key costs nothing while another key
//! is available, so the backoff sleep only happens when the whole pool is
//! cooling down. Rate-limited attempts still count against the attempt
//! budget (`max_retries × key count`), which guarantees termination under
//! persistent throttling.
//!
//! Rate limiting never escapes this module. Callers see either the
//! response text or [`StudytexError::ExhaustedRetries`].

use crate::config::SummaryConfig;
use crate::error::StudytexError;
use crate::keys::KeyPool;
use crate::llm::{ModelRequest, TextModel};
use crate::progress::Progress;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Drives every model call through rotation, cooldown and retry.
pub struct ResilientCaller {
    model: Arc<dyn TextModel>,
    pool: KeyPool,
    max_retries_per_key: u32,
    rate_limit_cooldown: Duration,
    pool_backoff: Duration,
    transient_delay: Duration,
    progress: Progress,
    api_calls: u64,
}

impl ResilientCaller {
    pub fn new(model: Arc<dyn TextModel>, pool: KeyPool, config: &SummaryConfig) -> Self {
        Self {
            model,
            pool,
            max_retries_per_key: config.max_retries.max(1),
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
            pool_backoff: Duration::from_secs(config.pool_backoff_secs),
            transient_delay: Duration::from_millis(config.transient_delay_ms),
            progress: Arc::clone(&config.progress),
            api_calls: 0,
        }
    }

    /// External invocations made so far, retries included.
    pub fn api_calls(&self) -> u64 {
        self.api_calls
    }

    pub fn key_count(&self) -> usize {
        self.pool.len()
    }

    /// Perform one logical call, retrying across the key pool as needed.
    pub async fn call(&mut self, request: &ModelRequest) -> Result<String, StudytexError> {
        let budget = self
            .max_retries_per_key
            .saturating_mul(self.pool.len() as u32)
            .max(1);
        let mut attempts: u32 = 0;
        let mut last_error = String::from("no attempts made");

        while attempts < budget {
            attempts += 1;
            self.api_calls += 1;
            debug!(
                attempt = attempts,
                budget,
                key = self.pool.current_index(),
                "attempting model call"
            );

            match self.model.complete(self.pool.current(), request).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(chars = text.len(), attempts, "model call succeeded");
                    return Ok(text);
                }
                Ok(_) => {
                    // A blank reply is indistinguishable from a dropped one.
                    last_error = "model returned an empty response".into();
                    warn!(attempt = attempts, "empty response, treating as transient");
                    if attempts < budget {
                        sleep(self.transient_delay).await;
                    }
                }
                Err(e) if e.is_rate_limit() => {
                    last_error = e.to_string();
                    warn!(
                        key = self.pool.current_index(),
                        attempt = attempts,
                        "rate limited"
                    );
                    self.pool.mark_rate_limited(self.rate_limit_cooldown);
                    if self.pool.rotate_next_available() {
                        self.progress.report(
                            &format!(
                                "Rate limit hit, switching to key {}/{}",
                                self.pool.current_index() + 1,
                                self.pool.len()
                            ),
                            -1,
                        );
                    } else if attempts < budget {
                        self.progress.report(
                            &format!(
                                "All {} key(s) cooling down, waiting {}s",
                                self.pool.len(),
                                self.pool_backoff.as_secs()
                            ),
                            -1,
                        );
                        sleep(self.pool_backoff).await;
                        self.pool.reset_all_cooldowns();
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        attempt = attempts,
                        error = %last_error,
                        "transient model failure"
                    );
                    if attempts < budget {
                        sleep(self.transient_delay).await;
                    }
                }
            }
        }

        Err(StudytexError::ExhaustedRetries {
            attempts,
            keys: self.pool.len(),
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: AtomicU32,
        keys_seen: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
                keys_seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn complete(
            &self,
            api_key: &str,
            _request: &ModelRequest,
        ) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keys_seen.lock().unwrap().push(api_key.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("fallback".into()))
        }
    }

    fn rate_limit() -> ModelError {
        ModelError::Api {
            status: 429,
            body: "quota exceeded".into(),
        }
    }

    fn make_caller(
        model: Arc<ScriptedModel>,
        keys: &[&str],
        max_retries: u32,
    ) -> ResilientCaller {
        let keys: Vec<String> = keys.iter().map(|s| s.to_string()).collect();
        let config = SummaryConfig::builder()
            .api_keys(keys.clone())
            .max_retries(max_retries)
            .build()
            .unwrap();
        let pool = KeyPool::new(keys).unwrap();
        ResilientCaller::new(model, pool, &config)
    }

    fn request() -> ModelRequest {
        ModelRequest::text(None, "prompt".into(), 0.3, 1024)
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_makes_one_call() {
        let model = ScriptedModel::new(vec![Ok("summary".into())]);
        let mut caller = make_caller(Arc::clone(&model), &["k1"], 5);

        let text = caller.call(&request()).await.unwrap();
        assert_eq!(text, "summary");
        assert_eq!(caller.api_calls(), 1);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_key_rate_limited_twice_then_succeeds() {
        let model = ScriptedModel::new(vec![
            Err(rate_limit()),
            Err(ModelError::Api {
                status: 400,
                body: "RESOURCE_EXHAUSTED".into(),
            }),
            Ok("made it".into()),
        ]);
        let mut caller = make_caller(Arc::clone(&model), &["only"], 5);

        let start = Instant::now();
        let text = caller.call(&request()).await.unwrap();

        assert_eq!(text, "made it");
        assert_eq!(caller.api_calls(), 3);
        // Two full-pool backoff cycles of 30 s, nothing else.
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_retries_immediately_without_sleeping() {
        let model = ScriptedModel::new(vec![Err(rate_limit()), Ok("from second key".into())]);
        let mut caller = make_caller(Arc::clone(&model), &["key-a", "key-b"], 5);

        let start = Instant::now();
        let text = caller.call(&request()).await.unwrap();

        assert_eq!(text, "from second key");
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(
            *model.keys_seen.lock().unwrap(),
            vec!["key-a".to_string(), "key-b".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_budget_bounds_invocations() {
        let failures: Vec<Result<String, ModelError>> = (0..10)
            .map(|_| Err(ModelError::Parse("bad payload".into())))
            .collect();
        let model = ScriptedModel::new(failures);
        let mut caller = make_caller(Arc::clone(&model), &["a", "b"], 3);

        let err = caller.call(&request()).await.unwrap_err();
        match err {
            StudytexError::ExhaustedRetries {
                attempts,
                keys,
                last_error,
            } => {
                assert_eq!(attempts, 6);
                assert_eq!(keys, 2);
                assert!(last_error.contains("bad payload"));
            }
            other => panic!("expected ExhaustedRetries, got: {other}"),
        }
        assert_eq!(model.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_throttling_still_terminates() {
        let model = ScriptedModel::new(vec![Err(rate_limit()), Err(rate_limit())]);
        let mut caller = make_caller(Arc::clone(&model), &["only"], 2);

        let err = caller.call(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            StudytexError::ExhaustedRetries { attempts: 2, .. }
        ));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_response_is_retried_as_transient() {
        let model = ScriptedModel::new(vec![Ok("   ".into()), Ok("real content".into())]);
        let mut caller = make_caller(Arc::clone(&model), &["k"], 5);

        let text = caller.call(&request()).await.unwrap();
        assert_eq!(text, "real content");
        assert_eq!(caller.api_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_waits_are_reported_as_log_only_events() {
        let events: Arc<Mutex<Vec<(String, i32)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: Progress = {
            let events = Arc::clone(&events);
            Arc::new(move |m: &str, p: i32| events.lock().unwrap().push((m.to_string(), p)))
        };

        let keys = vec!["only".to_string()];
        let config = SummaryConfig::builder()
            .api_keys(keys.clone())
            .max_retries(5)
            .progress(sink)
            .build()
            .unwrap();
        let pool = KeyPool::new(keys).unwrap();
        let model = ScriptedModel::new(vec![Err(rate_limit()), Ok("done".into())]);
        let mut caller = ResilientCaller::new(model, pool, &config);

        caller.call(&request()).await.unwrap();

        let events = events.lock().unwrap();
        assert!(!events.is_empty());
        assert!(events.iter().all(|(_, p)| *p == -1));
        assert!(events.iter().any(|(m, _)| m.contains("cooling down")));
    }
}
