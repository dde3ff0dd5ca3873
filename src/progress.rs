//! Progress-reporting trait for pipeline phase events.
//!
//! Inject an [`Arc<dyn ProgressSink>`] via
//! [`crate::config::SummaryConfigBuilder::progress`] to receive real-time
//! `(message, percent)` events as the pipeline moves through its phases.
//!
//! # Why callbacks instead of channels?
//!
//! A sink trait keeps the library agnostic about the embedder's event
//! plumbing: the same `(message, percent)` stream can feed a terminal bar,
//! a broadcast channel or a job-status row in a database. Events are
//! fire-and-forget; the pipeline never blocks on the sink.
//!
//! # Event contract
//!
//! * `percent` is in `0..=100`, or `-1` for log-only chatter (rate-limit
//!   waits, key rotations) that should not move a progress bar.
//! * Non-negative percents never decrease over the lifetime of a run; the
//!   orchestrator clamps them, so a sink can drive a bar directly.
//!
//! # Example
//!
//! ```rust
//! use studytex::{ProgressSink, SummaryConfig};
//! use std::sync::{Arc, Mutex};
//!
//! let events: Arc<Mutex<Vec<(String, i32)>>> = Arc::new(Mutex::new(Vec::new()));
//! let sink: Arc<dyn ProgressSink> = {
//!     let events = Arc::clone(&events);
//!     Arc::new(move |message: &str, percent: i32| {
//!         events.lock().unwrap().push((message.to_string(), percent));
//!     })
//! };
//!
//! let config = SummaryConfig::builder()
//!     .api_keys(vec!["test-key".into()])
//!     .progress(sink)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Receives `(message, percent)` events as the pipeline runs.
///
/// Implementations must be `Send + Sync`; the sink may be called from a
/// spawned runtime thread when the blocking wrapper is used. `report` has
/// no default body on purpose: a sink that ignores events should be
/// [`NoopProgress`], not an accidental empty impl.
pub trait ProgressSink: Send + Sync {
    /// Called for every phase transition and noteworthy event.
    ///
    /// # Arguments
    /// * `message` — human-readable phase description
    /// * `percent` — `0..=100` overall progress, or `-1` for log-only events
    fn report(&self, message: &str, percent: i32);
}

/// Any `Fn(&str, i32)` closure is a sink. Handy in tests and small embedders.
impl<F> ProgressSink for F
where
    F: Fn(&str, i32) + Send + Sync,
{
    fn report(&self, message: &str, percent: i32) {
        self(message, percent)
    }
}

/// A no-op sink for callers that don't need progress events.
///
/// This is the default when no sink is configured.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _message: &str, _percent: i32) {}
}

/// Convenience alias matching the type stored in [`crate::config::SummaryConfig`].
pub type Progress = Arc<dyn ProgressSink>;
