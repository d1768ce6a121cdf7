use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "text2sql-gateway")]
#[command(about = "Natural-language to SQL gateway with rate limiting and result caching")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT_REQUESTS", default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    // Cache TTL in seconds, 0 keeps entries until flushed
    #[arg(short, long, env = "CACHE_TTL", default_value_t = 3600)]
    pub cache_ttl: u64,

    // Max cached questions, 0 means unbounded
    #[arg(long, env = "CACHE_MAX_ENTRIES", default_value_t = 1000)]
    pub cache_max_entries: usize,

    // Trim, collapse whitespace and lowercase questions before hashing
    #[arg(long, env = "NORMALIZE_QUESTIONS", default_value_t = false)]
    pub normalize_questions: bool,

    #[arg(long, env = "MAX_QUESTION_CHARS", default_value_t = 500)]
    pub max_question_chars: usize,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: String,

    #[arg(long, env = "LLM_MODEL", default_value = "gemini-1.5-flash")]
    pub llm_model: String,

    #[arg(
        long,
        env = "LLM_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    pub llm_base_url: String,

    // LLM call timeout in seconds
    #[arg(long, env = "LLM_TIMEOUT", default_value_t = 30)]
    pub llm_timeout: u64,

    // Warehouse DSN, e.g. "host=... port=5439 user=... dbname=..." or a postgres:// URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    // Schema described to the model
    #[arg(long, env = "DB_SCHEMA", default_value = "public")]
    pub db_schema: String,

    // Warehouse query timeout in seconds
    #[arg(long, env = "QUERY_TIMEOUT", default_value_t = 30)]
    pub query_timeout: u64,

    // Append every generated (question, sql) pair to this file
    #[arg(long, env = "GENERATION_LOG")]
    pub generation_log: Option<PathBuf>,

    // Cache / rate limit sweep interval in seconds
    #[arg(long, env = "MAINTENANCE_INTERVAL", default_value_t = 60)]
    pub maintenance_interval: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    // None when entries never expire
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl > 0).then(|| Duration::from_secs(self.cache_ttl))
    }

    pub fn cache_capacity(&self) -> Option<usize> {
        (self.cache_max_entries > 0).then_some(self.cache_max_entries)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval.max(1))
    }
}
