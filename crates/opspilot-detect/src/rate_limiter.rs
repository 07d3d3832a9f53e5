// crates/opspilot-detect/src/rate_limiter.rs
// ============================================================================
// Module: Sliding-Window Rate Limiter
// Description: Fixed window length and request cap, optionally keyed, with
// idle-key cleanup.
// Purpose: Give the threshold detector (and any other module) a shared
// per-minute admission cap, and give callers who need independent windows
// per tenant/key a way to get one.
// Dependencies: opspilot-core::Clock, tokio::sync::Mutex
// ============================================================================

//! ## Overview
//! [`SlidingWindowRateLimiter`] tracks, per key, the timestamps of admitted
//! requests still inside the window; `try_acquire` prunes expired timestamps
//! before deciding. `key = None` is the global (unkeyed) admission counter
//! the threshold detector consults. [`SlidingWindowRateLimiter::cleanup_idle`]
//! drops keys whose window is currently empty, meant to be called
//! periodically by the owning module's own scheduled task.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use opspilot_core::Clock;
use tokio::sync::Mutex;

/// Result of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitOutcome {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// Requests still available in the current window after this call.
    pub remaining: u64,
    /// Unix milliseconds at which the oldest counted request falls out of
    /// the window.
    pub reset_at: i64,
    /// The configured cap, echoed for convenience.
    pub limit: u64,
}

/// Sliding-window admission control, immutable after construction.
pub struct SlidingWindowRateLimiter {
    window_ms: i64,
    max_requests: u64,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<Option<String>, VecDeque<i64>>>,
}

impl SlidingWindowRateLimiter {
    /// Creates a limiter admitting at most `max_requests` per `window`.
    #[must_use]
    pub fn new(window: Duration, max_requests: u64, clock: Arc<dyn Clock>) -> Self {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        Self {
            window_ms,
            max_requests,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to admit one request under `key` (or the global counter when
    /// `key` is `None`), pruning expired entries first.
    pub async fn try_acquire(&self, key: Option<&str>) -> RateLimitOutcome {
        let now = self.clock.now_millis();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.map(ToString::to_string)).or_default();
        while let Some(&oldest) = entry.front() {
            if now - oldest >= self.window_ms {
                entry.pop_front();
            } else {
                break;
            }
        }
        let reset_at = entry.front().copied().unwrap_or(now) + self.window_ms;
        let used = entry.len() as u64;
        if used < self.max_requests {
            entry.push_back(now);
            RateLimitOutcome {
                allowed: true,
                remaining: self.max_requests - used - 1,
                reset_at,
                limit: self.max_requests,
            }
        } else {
            RateLimitOutcome {
                allowed: false,
                remaining: 0,
                reset_at,
                limit: self.max_requests,
            }
        }
    }

    /// Drops every key whose window is currently empty. Intended to be
    /// driven by a periodic scheduled task on the owning module.
    pub async fn cleanup_idle(&self) {
        self.windows.lock().await.retain(|_, entries| !entries.is_empty());
    }
}
