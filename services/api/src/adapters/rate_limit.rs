//! services/api/src/adapters/rate_limit.rs
//!
//! Fixed-window request counters held in process memory. Approximate under
//! concurrency; good enough to blunt credential stuffing on one instance.

use dashmap::DashMap;
use enclave_core::ports::{RateDecision, RateLimitStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    length: Duration,
    count: u32,
}

impl Window {
    fn open(now: Instant, length: Duration) -> Self {
        Self {
            started: now,
            length,
            count: 0,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    windows: DashMap<String, Window>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl RateLimitStore for InMemoryRateLimiter {
    fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window::open(now, window));
        if entry.expired(now) {
            *entry = Window::open(now, window);
        }

        if entry.count >= limit {
            let elapsed = now.duration_since(entry.started);
            return RateDecision::Limited {
                retry_after: entry.length.saturating_sub(elapsed),
            };
        }
        entry.count += 1;
        RateDecision::Allowed {
            remaining: limit - entry.count,
        }
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.expired(now));
        before.saturating_sub(self.windows.len())
    }
}

/// Sweeps expired windows every `every` until `shutdown` is cancelled.
pub fn spawn_sweeper(
    store: Arc<dyn RateLimitStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = store.sweep();
                    if removed > 0 {
                        debug!(removed, "Swept expired rate-limit windows");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_within_window() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        assert_eq!(
            limiter.check("auth:1.2.3.4", 2, window),
            RateDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check("auth:1.2.3.4", 2, window),
            RateDecision::Allowed { remaining: 0 }
        );
        match limiter.check("auth:1.2.3.4", 2, window) {
            RateDecision::Limited { retry_after } => assert!(retry_after <= window),
            other => panic!("expected a rejection, got {:?}", other),
        }
        assert!(matches!(
            limiter.check("auth:5.6.7.8", 2, window),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn expired_windows_reset_and_are_swept() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_millis(0);
        limiter.check("api:a", 1, window);
        assert!(matches!(limiter.check("api:a", 1, window), RateDecision::Allowed { .. }));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let token = CancellationToken::new();
        let handle = spawn_sweeper(
            Arc::new(InMemoryRateLimiter::new()),
            Duration::from_millis(10),
            token.clone(),
        );
        token.cancel();
        handle.await.unwrap();
    }
}
