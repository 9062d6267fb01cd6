use actix_web::HttpRequest;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Above this many tracked callers, expired windows are pruned on the next check.
const PRUNE_THRESHOLD: usize = 10_000;

/// Per-caller fixed-window admission control for block appends.
/// A `max` of zero disables limiting.
#[derive(Debug)]
pub struct RateLimiter {
    max: u32,
    window_ms: i64,
    windows: Mutex<HashMap<String, Window>>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_ms: i64,
}

/// Result of one admission check. `reset_ms` is a Unix timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_ms: i64,
}

impl RateDecision {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now_ms: i64) -> i64 {
        let left = (self.reset_ms - now_ms).max(0);
        (left + 999) / 1000
    }
}

impl RateLimiter {
    pub fn new(max: u32, window_secs: u64) -> Self {
        Self {
            max,
            window_ms: (window_secs as i64).saturating_mul(1000),
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, caller: &str) -> RateDecision {
        self.check_at(caller, Utc::now().timestamp_millis())
    }

    pub fn check_at(&self, caller: &str, now_ms: i64) -> RateDecision {
        if self.max == 0 {
            return RateDecision {
                allowed: true,
                limit: 0,
                remaining: 0,
                reset_ms: now_ms,
            };
        }

        // counters only; a poisoned map is still consistent enough to use
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| w.reset_ms >= now_ms);
        }

        let window = windows
            .entry(caller.to_string())
            .and_modify(|w| {
                if now_ms > w.reset_ms {
                    *w = Window {
                        count: 0,
                        reset_ms: now_ms + self.window_ms,
                    };
                }
            })
            .or_insert(Window {
                count: 0,
                reset_ms: now_ms + self.window_ms,
            });

        if window.count >= self.max {
            return RateDecision {
                allowed: false,
                limit: self.max,
                remaining: 0,
                reset_ms: window.reset_ms,
            };
        }

        window.count += 1;
        RateDecision {
            allowed: true,
            limit: self.max,
            remaining: self.max - window.count,
            reset_ms: window.reset_ms,
        }
    }
}

/// Caller identity: first `X-Forwarded-For` entry, else the peer address.
pub fn caller_identity(req: &HttpRequest) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
