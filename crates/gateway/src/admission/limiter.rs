//! Fixed-window request limiter keyed by client address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Requests admitted per source per window by default.
pub const DEFAULT_RATE_LIMIT: u32 = 10;

/// Default window length.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Default period of the sweeper task.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    start: Instant,
}

/// Admits at most `limit` requests per source within each `window`.
///
/// A source's window opens on its first request and is replaced by a fresh
/// one on the first request after it has elapsed.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    sources: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            sources: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a request from `source`. Returns false when over the limit.
    pub fn check(&self, source: &str) -> bool {
        let now = Instant::now();
        let mut sources = self.sources.lock();

        let Some(window) = sources.get_mut(source) else {
            sources.insert(
                source.to_string(),
                Window {
                    count: 1,
                    start: now,
                },
            );
            return true;
        };

        if now.duration_since(window.start) > self.window {
            *window = Window {
                count: 1,
                start: now,
            };
            return true;
        }

        if window.count >= self.limit {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drops every source whose window has elapsed. Returns how many.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut sources = self.sources.lock();
        let before = sources.len();
        sources.retain(|_, w| now.duration_since(w.start) <= self.window);
        before - sources.len()
    }

    /// Number of sources currently tracked.
    pub fn tracked(&self) -> usize {
        self.sources.lock().len()
    }

    /// Starts a background task that sweeps every `interval` until `token`
    /// is cancelled.
    pub fn start_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let swept = limiter.sweep();
                        tracing::trace!(swept, tracked = limiter.tracked(), "Rate limiter sweep");
                    }
                }
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW)
    }
}
