use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("text2sql_requests_total", "Total number of SQL generation requests").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("text2sql_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("text2sql_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("text2sql_cache_misses_total", "Total cache misses").unwrap();
    pub static ref GENERATION_FAILURES: Counter =
        register_counter!("text2sql_generation_failures_total", "LLM calls that produced no SQL").unwrap();
    pub static ref EXECUTION_FAILURES: Counter =
        register_counter!("text2sql_execution_failures_total", "Warehouse queries that failed").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "text2sql_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("text2sql_cache_size", "Current number of items in cache").unwrap();
}
