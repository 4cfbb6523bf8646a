//! Upstream provider rate limiter
//!
//! Spaces calls so the quote provider never sees two requests closer
//! together than `60 / calls_per_minute` seconds. One shared instance per
//! provider; every caller, single or bulk, routes through it.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Minimum-interval rate limiter.
///
/// The last-call timestamp lives behind an async mutex that is held across
/// the wait, so concurrent callers queue and each granted call is spaced a
/// full interval from the previous one. `acquire` never errors; it only
/// delays.
pub struct RateLimiter {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(calls_per_minute: u32) -> Self {
        let calls_per_minute = calls_per_minute.max(1);
        Self {
            interval: Duration::from_secs_f64(60.0 / calls_per_minute as f64),
            last_call: Mutex::new(None),
        }
    }

    /// Seconds enforced between consecutive granted calls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a call is allowed, then record it and return.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!("rate limiter: waiting {:?} before next provider call", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}
