//! Request pipeline: validate, rate limit, cache lookup, generate,
//! optionally execute, cache, respond.
//!
//! Each collaborator is called at most once per request. Only execution
//! failures are downgraded to a field on a successful response; every other
//! failure ends the request with an [`AppError`].

use std::sync::Arc;
use std::time::{Duration, Instant};
use crate::cache::{CacheEntry, QueryCache};
use crate::error::{AppError, ExecutionError, GeneratorError};
use crate::executor::QueryExecutor;
use crate::generation_log::GenerationLog;
use crate::generator::SqlGenerator;
use crate::metrics::{
    CACHE_HITS, CACHE_MISSES, CACHE_SIZE, EXECUTION_FAILURES, GENERATION_FAILURES, RATE_LIMITED,
    REQUEST_LATENCY, REQUEST_TOTAL,
};
use crate::models::{GenerateSqlRequest, GenerateSqlResponse, Row};
use crate::rate_limit::{RateDecision, RateLimiter};

pub const DEFAULT_MAX_QUESTION_CHARS: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct PipelineLimits {
    pub max_question_chars: usize,
    /// Bounds schema description plus the LLM call
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_question_chars: DEFAULT_MAX_QUESTION_CHARS,
            generation_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(30),
        }
    }
}

pub struct RequestPipeline {
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<dyn QueryCache>,
    generator: Arc<dyn SqlGenerator>,
    executor: Arc<dyn QueryExecutor>,
    generation_log: Option<Arc<GenerationLog>>,
    limits: PipelineLimits,
}

impl RequestPipeline {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<dyn QueryCache>,
        generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            rate_limiter,
            cache,
            generator,
            executor,
            generation_log: None,
            limits: PipelineLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PipelineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_generation_log(mut self, log: Arc<GenerationLog>) -> Self {
        self.generation_log = Some(log);
        self
    }

    pub fn limits(&self) -> PipelineLimits {
        self.limits
    }

    pub fn validate(&self, req: &GenerateSqlRequest) -> Result<(), AppError> {
        let chars = req.question.chars().count();
        if chars == 0 {
            return Err(AppError::Validation(
                "question: must contain at least 1 character".into(),
            ));
        }
        if chars > self.limits.max_question_chars {
            return Err(AppError::Validation(format!(
                "question: must contain at most {} characters",
                self.limits.max_question_chars
            )));
        }
        Ok(())
    }

    pub async fn handle(
        &self,
        client_id: &str,
        req: GenerateSqlRequest,
    ) -> Result<GenerateSqlResponse, AppError> {
        let start = Instant::now();
        REQUEST_TOTAL.inc();

        self.validate(&req)?;

        if let RateDecision::Deny { retry_after } = self.rate_limiter.check(client_id) {
            RATE_LIMITED.inc();
            return Err(AppError::RateLimited {
                limit: self.rate_limiter.max_requests(),
                window: self.rate_limiter.window(),
                retry_after,
            });
        }

        tracing::info!(
            client = %client_id,
            execute_query = req.execute_query,
            use_cache = req.use_cache,
            "SQL generation request"
        );
        tracing::debug!(question = %req.question);

        if req.use_cache {
            if let Some(entry) = self.cache.get(&req.question) {
                CACHE_HITS.inc();
                tracing::info!(client = %client_id, "cache hit");
                let elapsed = start.elapsed();
                REQUEST_LATENCY.observe(elapsed.as_secs_f64());
                return Ok(GenerateSqlResponse {
                    sql: entry.sql,
                    execution_time: elapsed.as_secs_f64(),
                    cached: true,
                    result: entry.result,
                    error: None,
                });
            }
            CACHE_MISSES.inc();
        }

        let sql = match self.generate(&req.question).await {
            Ok(sql) => sql,
            Err(cause) => {
                GENERATION_FAILURES.inc();
                return Err(AppError::GenerationFailed(cause));
            }
        };

        if let Some(log) = &self.generation_log {
            if let Err(e) = log.append(&req.question, &sql).await {
                tracing::warn!(error = %e, path = %log.path().display(), "failed to write generation log");
            }
        }

        let mut result = None;
        let mut error = None;
        if req.execute_query {
            match self.execute(&sql).await {
                Ok(rows) => {
                    tracing::info!(rows = rows.len(), "SQL executed successfully");
                    result = Some(rows);
                }
                Err(e) => {
                    EXECUTION_FAILURES.inc();
                    tracing::error!(error = %e, sql = %sql, "SQL execution failed");
                    error = Some(e.to_string());
                }
            }
        }

        if req.use_cache {
            match self.cache.put(&req.question, CacheEntry::new(sql.clone(), result.clone())) {
                Ok(()) => CACHE_SIZE.set(self.cache.len() as f64),
                Err(e) => tracing::warn!(error = %e, "failed to cache result"),
            }
        }

        let elapsed = start.elapsed();
        REQUEST_LATENCY.observe(elapsed.as_secs_f64());
        tracing::info!(
            client = %client_id,
            cached = false,
            elapsed_ms = elapsed.as_millis() as u64,
            "SQL generated"
        );

        Ok(GenerateSqlResponse {
            sql,
            execution_time: elapsed.as_secs_f64(),
            cached: false,
            result,
            error,
        })
    }

    // Err carries the cause for the logs, never the caller
    async fn generate(&self, question: &str) -> Result<String, String> {
        let timeout = self.limits.generation_timeout;
        let work = async {
            let schema = self
                .executor
                .describe_schema()
                .await
                .map_err(|e| format!("schema description failed: {}", e))?;
            self.generator
                .generate(question, &schema)
                .await
                .map_err(|e| e.to_string())
        };

        let sql = tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| GeneratorError::Timeout(timeout).to_string())??;

        if sql.trim().is_empty() {
            return Err("LLM returned no SQL".into());
        }
        Ok(sql)
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
        let timeout = self.limits.execution_timeout;
        tokio::time::timeout(timeout, self.executor.run(sql))
            .await
            .map_err(|_| ExecutionError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachePolicy, MemoryCache};
    use crate::error::CacheError;
    use crate::models::SchemaContext;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockGenerator {
        sql: String,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl MockGenerator {
        fn returning(sql: &str) -> Arc<Self> {
            Arc::new(Self { sql: sql.to_string(), calls: AtomicUsize::new(0), delay: Duration::ZERO })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SqlGenerator for MockGenerator {
        async fn generate(&self, _q: &str, _s: &SchemaContext) -> Result<String, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.sql.clone())
        }
    }

    struct MockExecutor {
        fail: bool,
        runs: AtomicUsize,
        delay: Duration,
    }

    impl MockExecutor {
        fn ok() -> Arc<Self> {
            Arc::new(Self { fail: false, runs: AtomicUsize::new(0), delay: Duration::ZERO })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { fail: true, runs: AtomicUsize::new(0), delay: Duration::ZERO })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryExecutor for MockExecutor {
        async fn run(&self, _sql: &str) -> Result<Vec<Row>, ExecutionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(ExecutionError::Other("relation \"users\" does not exist".into()));
            }
            let mut row = Row::new();
            row.insert("id".into(), json!(1));
            row.insert("name".into(), json!("John"));
            Ok(vec![row])
        }

        async fn describe_schema(&self) -> Result<SchemaContext, ExecutionError> {
            Ok(SchemaContext::default())
        }

        async fn is_connected(&self) -> bool {
            true
        }
    }

    struct FailingCache;

    impl QueryCache for FailingCache {
        fn get(&self, _q: &str) -> Option<CacheEntry> {
            None
        }
        fn put(&self, _q: &str, _e: CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("store offline".into()))
        }
        fn len(&self) -> usize {
            0
        }
        fn clear(&self) -> usize {
            0
        }
        fn purge_expired_at(&self, _now: Instant) -> usize {
            0
        }
    }

    struct Fixture {
        pipeline: RequestPipeline,
        generator: Arc<MockGenerator>,
        executor: Arc<MockExecutor>,
        cache: Arc<MemoryCache>,
    }

    fn fixture(generator: Arc<MockGenerator>, executor: Arc<MockExecutor>, limit: u32) -> Fixture {
        let cache = Arc::new(MemoryCache::new(CachePolicy::default()));
        let pipeline = RequestPipeline::new(
            Arc::new(RateLimiter::new(limit, Duration::from_secs(60))),
            cache.clone(),
            generator.clone(),
            executor.clone(),
        );
        Fixture { pipeline, generator, executor, cache }
    }

    fn request(question: &str) -> GenerateSqlRequest {
        GenerateSqlRequest { question: question.into(), execute_query: false, use_cache: true }
    }

    #[tokio::test]
    async fn test_second_identical_question_is_cached() {
        let f = fixture(MockGenerator::returning("SELECT * FROM users"), MockExecutor::ok(), 10);

        let first = f.pipeline.handle("c", request("Show me all users")).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.sql, "SELECT * FROM users");

        let second = f.pipeline.handle("c", request("Show me all users")).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.sql, first.sql);
        assert_eq!(f.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_normalized_cache_matches_differently_cased_question() {
        let generator = MockGenerator::returning("SELECT * FROM users");
        let cache = Arc::new(MemoryCache::new(CachePolicy { normalize: true, ..Default::default() }));
        let pipeline = RequestPipeline::new(
            Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
            cache.clone(),
            generator.clone(),
            MockExecutor::ok(),
        );

        pipeline.handle("c", request("Show me all users")).await.unwrap();
        let again = pipeline.handle("c", request("show me ALL  users ")).await.unwrap();

        assert!(again.cached);
        assert_eq!(again.sql, "SELECT * FROM users");
        assert_eq!(generator.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_cache() {
        let f = fixture(MockGenerator::returning("SELECT 1"), MockExecutor::ok(), 10);
        let mut req = request("q");
        req.use_cache = false;

        f.pipeline.handle("c", req.clone()).await.unwrap();
        let again = f.pipeline.handle("c", req).await.unwrap();

        assert!(!again.cached);
        assert_eq!(f.generator.calls(), 2);
        assert_eq!(f.cache.len(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_denies_after_limit() {
        let f = fixture(MockGenerator::returning("SELECT 1"), MockExecutor::ok(), 10);

        for i in 0..10 {
            let res = f.pipeline.handle("10.0.0.1", request(&format!("Test query {}", i))).await;
            assert!(res.is_ok(), "request {} should pass", i);
        }
        let denied = f.pipeline.handle("10.0.0.1", request("Test query 10")).await;
        assert!(matches!(denied, Err(AppError::RateLimited { limit: 10, .. })));
        assert_eq!(f.generator.calls(), 10);

        // other clients are unaffected
        assert!(f.pipeline.handle("10.0.0.2", request("x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_question_touches_nothing() {
        let f = fixture(MockGenerator::returning("SELECT 1"), MockExecutor::ok(), 1);
        let mut req = request("");
        req.execute_query = true;

        let err = f.pipeline.handle("c", req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(f.generator.calls(), 0);
        assert_eq!(f.executor.runs(), 0);
        assert_eq!(f.cache.len(), 0);
        // the rejected request did not consume the client's only slot
        assert!(f.pipeline.handle("c", request("q")).await.is_ok());
    }

    #[tokio::test]
    async fn test_question_length_limit_counts_chars() {
        let f = fixture(MockGenerator::returning("SELECT 1"), MockExecutor::ok(), 10);

        assert!(f.pipeline.handle("c", request(&"é".repeat(500))).await.is_ok());
        let err = f.pipeline.handle("c", request(&"a".repeat(501))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_generation_fails_and_is_not_cached() {
        let f = fixture(MockGenerator::returning("  \n"), MockExecutor::ok(), 10);

        let err = f.pipeline.handle("c", request("Show me all users")).await.unwrap_err();
        assert!(matches!(err, AppError::GenerationFailed(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(f.cache.len(), 0);
        assert!(f.cache.get("Show me all users").is_none());
    }

    #[tokio::test]
    async fn test_execution_failure_is_partial_success() {
        let f = fixture(MockGenerator::returning("SELECT * FROM users"), MockExecutor::failing(), 10);
        let mut req = request("Show me all users");
        req.execute_query = true;

        let res = f.pipeline.handle("c", req).await.unwrap();
        assert_eq!(res.sql, "SELECT * FROM users");
        assert!(res.error.as_deref().is_some_and(|e| !e.is_empty()));
        assert!(res.result.is_none());
        // still cached even though execution failed
        assert_eq!(f.cache.get("Show me all users").unwrap().sql, "SELECT * FROM users");
    }

    #[tokio::test]
    async fn test_execution_result_is_returned_and_cached() {
        let f = fixture(MockGenerator::returning("SELECT * FROM users"), MockExecutor::ok(), 10);
        let mut req = request("Show me all users");
        req.execute_query = true;

        let first = f.pipeline.handle("c", req.clone()).await.unwrap();
        assert_eq!(first.result.as_ref().unwrap()[0]["name"], json!("John"));

        let second = f.pipeline.handle("c", req).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.result, first.result);
        assert_eq!(f.executor.runs(), 1);
    }

    #[tokio::test]
    async fn test_cache_store_failure_does_not_fail_request() {
        let generator = MockGenerator::returning("SELECT 1");
        let pipeline = RequestPipeline::new(
            Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
            Arc::new(FailingCache),
            generator.clone(),
            MockExecutor::ok(),
        );

        let res = pipeline.handle("c", request("q")).await.unwrap();
        assert_eq!(res.sql, "SELECT 1");
        assert!(!res.cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_is_generation_failure() {
        let generator = Arc::new(MockGenerator {
            sql: "SELECT 1".into(),
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(120),
        });
        let f = fixture(generator, MockExecutor::ok(), 10);
        let pipeline = f.pipeline.with_limits(PipelineLimits {
            generation_timeout: Duration::from_secs(5),
            ..Default::default()
        });

        let err = pipeline.handle("c", request("q")).await.unwrap_err();
        assert!(matches!(err, AppError::GenerationFailed(ref cause) if cause.contains("timed out")));
        assert_eq!(f.cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_timeout_is_embedded_error() {
        let executor = Arc::new(MockExecutor {
            fail: false,
            runs: AtomicUsize::new(0),
            delay: Duration::from_secs(120),
        });
        let f = fixture(MockGenerator::returning("SELECT 1"), executor, 10);
        let pipeline = f.pipeline.with_limits(PipelineLimits {
            execution_timeout: Duration::from_secs(5),
            ..Default::default()
        });
        let mut req = request("q");
        req.execute_query = true;

        let res = pipeline.handle("c", req).await.unwrap();
        assert_eq!(res.sql, "SELECT 1");
        assert!(res.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_generation_log_records_pairs() {
        let path = std::env::temp_dir().join(format!("text2sql-pipeline-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let f = fixture(MockGenerator::returning("SELECT * FROM users"), MockExecutor::ok(), 10);
        let pipeline = f.pipeline.with_generation_log(Arc::new(GenerationLog::new(&path)));
        pipeline.handle("c", request("Show me all users")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Show me all users"));
        assert!(contents.contains("SELECT * FROM users"));
        let _ = std::fs::remove_file(&path);
    }
}
