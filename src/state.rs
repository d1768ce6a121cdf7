use std::sync::Arc;
use std::time::Instant;
use crate::cache::QueryCache;
use crate::executor::QueryExecutor;
use crate::generation_log::GenerationLog;
use crate::generator::SqlGenerator;
use crate::pipeline::{PipelineLimits, RequestPipeline};
use crate::rate_limit::RateLimiter;

// app's shared state
pub struct AppState {
    pub pipeline: RequestPipeline,
    pub cache: Arc<dyn QueryCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub executor: Arc<dyn QueryExecutor>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<dyn QueryCache>,
        generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn QueryExecutor>,
        limits: PipelineLimits,
        generation_log: Option<Arc<GenerationLog>>,
    ) -> Self {
        let mut pipeline = RequestPipeline::new(
            Arc::clone(&rate_limiter),
            Arc::clone(&cache),
            generator,
            Arc::clone(&executor),
        )
        .with_limits(limits);
        if let Some(log) = generation_log {
            pipeline = pipeline.with_generation_log(log);
        }

        Self {
            pipeline,
            cache,
            rate_limiter,
            executor,
            started_at: Instant::now(),
        }
    }
}
