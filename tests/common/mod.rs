#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use text2sql_gateway::cache::{CachePolicy, MemoryCache, QueryCache};
use text2sql_gateway::error::{ExecutionError, GeneratorError};
use text2sql_gateway::executor::QueryExecutor;
use text2sql_gateway::generator::SqlGenerator;
use text2sql_gateway::models::{ColumnInfo, Row, SchemaContext, TableSchema};
use text2sql_gateway::pipeline::PipelineLimits;
use text2sql_gateway::rate_limit::RateLimiter;
use text2sql_gateway::state::AppState;
use tower::ServiceExt;

/// Generator returning a fixed string and counting calls.
pub struct StubGenerator {
    pub sql: String,
    pub calls: AtomicUsize,
    pub panics: bool,
}

impl StubGenerator {
    pub fn new(sql: &str) -> Arc<Self> {
        Arc::new(Self {
            sql: sql.to_string(),
            calls: AtomicUsize::new(0),
            panics: false,
        })
    }

    /// Generator with a bug: every call panics.
    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            sql: String::new(),
            calls: AtomicUsize::new(0),
            panics: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlGenerator for StubGenerator {
    async fn generate(&self, _question: &str, _schema: &SchemaContext) -> Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("generator bug");
        }
        Ok(self.sql.clone())
    }
}

/// Warehouse double with a single `users` table.
pub struct StubWarehouse {
    pub fail_queries: bool,
    pub fail_schema: bool,
    pub connected: bool,
    pub runs: AtomicUsize,
}

impl StubWarehouse {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            fail_queries: false,
            fail_schema: false,
            connected: true,
            runs: AtomicUsize::new(0),
        })
    }

    /// Schema is readable but every query fails.
    pub fn broken_queries() -> Arc<Self> {
        Arc::new(Self {
            fail_queries: true,
            fail_schema: false,
            connected: true,
            runs: AtomicUsize::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            fail_queries: true,
            fail_schema: true,
            connected: false,
            runs: AtomicUsize::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for StubWarehouse {
    async fn run(&self, _sql: &str) -> Result<Vec<Row>, ExecutionError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(ExecutionError::Other("connection to warehouse lost".into()));
        }
        let mut row = Row::new();
        row.insert("id".into(), json!(1));
        row.insert("name".into(), json!("John"));
        row.insert("email".into(), json!("john@example.com"));
        Ok(vec![row])
    }

    async fn describe_schema(&self) -> Result<SchemaContext, ExecutionError> {
        if self.fail_schema {
            return Err(ExecutionError::Other("connection to warehouse lost".into()));
        }
        Ok(SchemaContext {
            tables: vec![TableSchema {
                name: "users".into(),
                columns: ["id", "name", "email"]
                    .iter()
                    .map(|c| ColumnInfo {
                        name: c.to_string(),
                        data_type: "text".into(),
                    })
                    .collect(),
            }],
        })
    }

    async fn is_connected(&self) -> bool {
        self.connected
    }
}

pub struct TestApp {
    pub router: Router,
    pub generator: Arc<StubGenerator>,
    pub warehouse: Arc<StubWarehouse>,
    pub cache: Arc<MemoryCache>,
}

pub fn test_app(generator: Arc<StubGenerator>, warehouse: Arc<StubWarehouse>, rate_limit: u32) -> TestApp {
    build_app(generator, warehouse, rate_limit, CachePolicy::default())
}

pub fn test_app_with_policy(
    generator: Arc<StubGenerator>,
    warehouse: Arc<StubWarehouse>,
    policy: CachePolicy,
) -> TestApp {
    build_app(generator, warehouse, 10, policy)
}

fn build_app(
    generator: Arc<StubGenerator>,
    warehouse: Arc<StubWarehouse>,
    rate_limit: u32,
    policy: CachePolicy,
) -> TestApp {
    let cache = Arc::new(MemoryCache::new(policy));
    let state = AppState::new(
        Arc::new(RateLimiter::new(rate_limit, Duration::from_secs(60))),
        cache.clone() as Arc<dyn QueryCache>,
        generator.clone(),
        warehouse.clone(),
        PipelineLimits::default(),
        None,
    );
    TestApp {
        router: text2sql_gateway::router(Arc::new(state)),
        generator,
        warehouse,
        cache,
    }
}

pub async fn send(router: &Router, req: Request<Body>) -> Response<Body> {
    router.clone().oneshot(req).await.unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
