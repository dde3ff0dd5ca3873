//! API-key pool with per-key rate-limit cooldowns.
//!
//! Free-tier LLM quotas are enforced per key, so a pool of keys multiplies
//! throughput: when one key hits a 429 it is stamped with a cooldown and the
//! pool rotates to the next key that is not cooling down. The pool itself
//! never sleeps; the retry machinery in [`crate::pipeline::caller`] decides
//! what to do when [`KeyPool::rotate_next_available`] reports that every key
//! is cooling.
//!
//! Timestamps use [`tokio::time::Instant`] so paused-clock tests exercise
//! the exact production code path.

use crate::error::StudytexError;
use std::time::Duration;
use tokio::time::Instant;

struct PoolKey {
    secret: String,
    cooldown_until: Option<Instant>,
}

impl PoolKey {
    fn is_available(&self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(until) => now >= until,
            None => true,
        }
    }
}

/// Ordered collection of API credentials with rotation state.
pub struct KeyPool {
    keys: Vec<PoolKey>,
    current: usize,
}

impl KeyPool {
    /// Build a pool from raw key strings.
    ///
    /// Keys are trimmed and blanks dropped; an effectively empty pool is a
    /// configuration error caught before any network call.
    pub fn new(keys: Vec<String>) -> Result<Self, StudytexError> {
        let keys: Vec<PoolKey> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|secret| PoolKey {
                secret,
                cooldown_until: None,
            })
            .collect();
        if keys.is_empty() {
            return Err(StudytexError::InvalidConfig(
                "at least one API key is required".into(),
            ));
        }
        Ok(Self { keys, current: 0 })
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Secret of the active key.
    pub fn current(&self) -> &str {
        &self.keys[self.current].secret
    }

    /// Zero-based index of the active key, for log lines.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Stamp the active key with a cooldown after a rate-limit response.
    pub fn mark_rate_limited(&mut self, cooldown: Duration) {
        self.keys[self.current].cooldown_until = Some(Instant::now() + cooldown);
    }

    /// Advance to the next key whose cooldown is absent or elapsed.
    ///
    /// Scans round-robin starting just after the current key, wrapping the
    /// whole pool. Returns `false` when every key is cooling down; the
    /// current index is left unchanged in that case.
    pub fn rotate_next_available(&mut self) -> bool {
        let now = Instant::now();
        for offset in 1..=self.keys.len() {
            let idx = (self.current + offset) % self.keys.len();
            if self.keys[idx].is_available(now) {
                self.current = idx;
                return true;
            }
        }
        false
    }

    /// Clear every cooldown stamp.
    ///
    /// Called after a full-pool backoff sleep: the quota windows that caused
    /// the stamps have had time to reopen, so the pool starts fresh.
    pub fn reset_all_cooldowns(&mut self) {
        for key in &mut self.keys {
            key.cooldown_until = None;
        }
    }

    /// Number of keys currently cooling down, for log lines.
    pub fn cooling_count(&self) -> usize {
        let now = Instant::now();
        self.keys.iter().filter(|k| !k.is_available(now)).count()
    }
}

impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &self.keys.len())
            .field("current", &self.current)
            .field("cooling", &self.cooling_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_is_rejected() {
        assert!(KeyPool::new(vec![]).is_err());
        assert!(KeyPool::new(vec!["  ".into(), "".into()]).is_err());
    }

    #[test]
    fn blank_keys_are_dropped() {
        let pool = KeyPool::new(vec!["a".into(), " ".into(), "b".into()]).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.current(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_skips_cooling_keys() {
        let mut pool = KeyPool::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        pool.mark_rate_limited(Duration::from_secs(60));
        assert!(pool.rotate_next_available());
        assert_eq!(pool.current(), "b");

        pool.mark_rate_limited(Duration::from_secs(60));
        assert!(pool.rotate_next_available());
        assert_eq!(pool.current(), "c");
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_fails_when_all_cooling() {
        let mut pool = KeyPool::new(vec!["a".into(), "b".into()]).unwrap();
        pool.mark_rate_limited(Duration::from_secs(60));
        assert!(pool.rotate_next_available());
        pool.mark_rate_limited(Duration::from_secs(60));
        assert!(!pool.rotate_next_available());
        // Failed rotation leaves the index where it was.
        assert_eq!(pool.current(), "b");
        assert_eq!(pool.cooling_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_recovers_after_cooldowns_elapse() {
        let mut pool = KeyPool::new(vec!["a".into(), "b".into()]).unwrap();
        pool.mark_rate_limited(Duration::from_secs(60));
        assert!(pool.rotate_next_available());
        pool.mark_rate_limited(Duration::from_secs(60));
        assert!(!pool.rotate_next_available());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(pool.rotate_next_available());
        assert_eq!(pool.cooling_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_all_stamps() {
        let mut pool = KeyPool::new(vec!["a".into(), "b".into()]).unwrap();
        pool.mark_rate_limited(Duration::from_secs(600));
        pool.rotate_next_available();
        pool.mark_rate_limited(Duration::from_secs(600));
        assert!(!pool.rotate_next_available());

        pool.reset_all_cooldowns();
        assert!(pool.rotate_next_available());
        assert_eq!(pool.current(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn single_key_pool_has_no_rotation_escape() {
        let mut pool = KeyPool::new(vec!["only".into()]).unwrap();
        pool.mark_rate_limited(Duration::from_secs(60));
        assert!(!pool.rotate_next_available());
        assert_eq!(pool.current(), "only");
    }
}
