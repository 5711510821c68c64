use crate::clock::{deadline, Clock};
use crate::config::RateLimitConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-caller state for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub tracked_callers: usize,
    pub window_secs: u64,
    pub max_requests: u32,
}

/// Fixed-window request counter keyed by caller.
pub struct RateLimiter {
    records: Mutex<HashMap<String, RateLimitRecord>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Count one request for `caller_key` and report whether it is within budget.
    pub fn allow(&self, caller_key: &str) -> bool {
        let now = self.clock.now();
        let window = self.config.window();
        let mut records = self.records.lock();

        let record = records
            .entry(caller_key.to_string())
            .or_insert_with(|| RateLimitRecord {
                count: 0,
                window_reset_at: deadline(now, window),
            });

        if now > record.window_reset_at {
            record.count = 1;
            record.window_reset_at = deadline(now, window);
        } else {
            record.count = record.count.saturating_add(1);
        }

        let allowed = record.count <= self.config.max_requests;
        if !allowed {
            log::debug!(
                "rate limit exceeded for {} ({} > {})",
                caller_key,
                record.count,
                self.config.max_requests
            );
        }
        allowed
    }

    pub fn record(&self, caller_key: &str) -> Option<RateLimitRecord> {
        self.records.lock().get(caller_key).copied()
    }

    /// Forget callers whose window has already closed. Their next request
    /// starts a fresh window either way.
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| now <= r.window_reset_at);
        let removed = before - records.len();
        if removed > 0 {
            log::debug!("rate limiter cleanup: forgot {} callers", removed);
        }
        removed
    }

    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            tracked_callers: self.records.lock().len(),
            window_secs: self.config.window_secs,
            max_requests: self.config.max_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn limiter(max: u32, window_secs: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = RateLimitConfig::new()
            .with_max_requests(max)
            .with_window(Duration::from_secs(window_secs));
        (RateLimiter::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_exactly_n_allowed_per_window() {
        let (rl, _) = limiter(3, 60);
        assert!(rl.allow("10.0.0.1"));
        assert!(rl.allow("10.0.0.1"));
        assert!(rl.allow("10.0.0.1"));
        assert!(!rl.allow("10.0.0.1"));
        assert!(!rl.allow("10.0.0.1"));
    }

    #[test]
    fn test_window_reset_restarts_count_at_one() {
        let (rl, clock) = limiter(2, 60);
        let start = clock.now();
        assert!(rl.allow("k"));
        assert!(rl.allow("k"));
        assert!(!rl.allow("k"));

        clock.advance(Duration::from_secs(61));
        assert!(rl.allow("k"));

        let record = rl.record("k").unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(
            record.window_reset_at,
            start + chrono::Duration::seconds(61 + 60)
        );
    }

    #[test]
    fn test_boundary_is_still_inside_window() {
        let (rl, clock) = limiter(1, 60);
        assert!(rl.allow("k"));
        clock.advance(Duration::from_secs(60));
        assert!(!rl.allow("k"), "now == window_reset_at does not roll over");
    }

    #[test]
    fn test_callers_are_independent() {
        let (rl, _) = limiter(1, 60);
        assert!(rl.allow("a"));
        assert!(rl.allow("b"));
        assert!(!rl.allow("a"));
    }

    #[test]
    fn test_purge_stale() {
        let (rl, clock) = limiter(5, 60);
        rl.allow("old");
        clock.advance(Duration::from_secs(30));
        rl.allow("fresh");
        clock.advance(Duration::from_secs(31));

        assert_eq!(rl.purge_stale(), 1);
        assert!(rl.record("old").is_none());
        assert!(rl.record("fresh").is_some());
        assert_eq!(rl.stats().tracked_callers, 1);
    }

    #[test]
    fn test_concurrent_callers_never_over_admit() {
        let (rl, _) = limiter(50, 60);
        let rl = Arc::new(rl);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || (0..25).filter(|_| rl.allow("shared")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
