use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    /// `retry_after` is how long until the oldest request in the window ages out.
    Deny { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }
}

/// Per-client sliding window limiter.
///
/// Each client keeps the instants of its recent requests. A request made
/// exactly `window` ago still counts against the client.
pub struct RateLimiter {
    logs: DashMap<String, VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            logs: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, client_id: &str) -> RateDecision {
        self.check_at(client_id, Instant::now())
    }

    pub fn check_at(&self, client_id: &str, now: Instant) -> RateDecision {
        // the entry guard holds the shard lock for the whole read-modify-write
        let mut log = self.logs.entry(client_id.to_string()).or_default();

        while let Some(&oldest) = log.front() {
            if now.saturating_duration_since(oldest) > self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.max_requests as usize {
            let retry_after = log
                .front()
                .and_then(|oldest| oldest.checked_add(self.window))
                .map_or(self.window, |leaves_at| leaves_at.saturating_duration_since(now));
            return RateDecision::Deny { retry_after };
        }

        log.push_back(now);
        RateDecision::Allow
    }

    /// Drop clients whose whole log has aged out of the window.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let before = self.logs.len();
        self.logs.retain(|_, log| {
            log.back()
                .is_some_and(|last| now.saturating_duration_since(*last) <= self.window)
        });
        before - self.logs.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.logs.len()
    }
}
