use std::sync::Arc;
use std::time::Instant;
use tokio::time::{Duration, interval};
use crate::cache::QueryCache;
use crate::metrics::CACHE_SIZE;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_entries: usize,
    pub idle_clients: usize,
}

pub fn sweep(cache: &dyn QueryCache, rate_limiter: &RateLimiter) -> SweepReport {
    sweep_at(cache, rate_limiter, Instant::now())
}

pub fn sweep_at(cache: &dyn QueryCache, rate_limiter: &RateLimiter, now: Instant) -> SweepReport {
    let report = SweepReport {
        expired_entries: cache.purge_expired_at(now),
        idle_clients: rate_limiter.purge_idle_at(now),
    };
    CACHE_SIZE.set(cache.len() as f64);
    report
}

// Background sweep of expired cache entries and idle rate limit logs
pub async fn maintenance_loop(
    cache: Arc<dyn QueryCache>,
    rate_limiter: Arc<RateLimiter>,
    every: Duration,
) {
    let mut interval = interval(every);

    tracing::info!(interval = ?every, "maintenance task started");

    loop {
        interval.tick().await;

        let report = sweep(cache.as_ref(), &rate_limiter);
        if report != SweepReport::default() {
            tracing::debug!(
                expired_entries = report.expired_entries,
                idle_clients = report.idle_clients,
                "maintenance sweep"
            );
        }
    }
}
