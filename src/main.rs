use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use text2sql_gateway::cache::{CachePolicy, MemoryCache};
use text2sql_gateway::config::{Args, LogFormat};
use text2sql_gateway::executor::PostgresExecutor;
use text2sql_gateway::generation_log::GenerationLog;
use text2sql_gateway::generator::GeminiGenerator;
use text2sql_gateway::maintenance::maintenance_loop;
use text2sql_gateway::pipeline::PipelineLimits;
use text2sql_gateway::rate_limit::RateLimiter;
use text2sql_gateway::state::AppState;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(args.log_format);

    tracing::info!("starting text2sql gateway");

    let executor = Arc::new(PostgresExecutor::new(&args.database_url, &args.db_schema));
    executor
        .connect()
        .await
        .context("failed to connect to the warehouse")?;

    let generator = Arc::new(GeminiGenerator::new(
        reqwest::Client::new(),
        &args.llm_base_url,
        &args.llm_model,
        &args.google_api_key,
    ));
    tracing::info!(model = %args.llm_model, "LLM initialized");

    let cache = Arc::new(MemoryCache::new(CachePolicy {
        ttl: args.cache_ttl(),
        max_entries: args.cache_capacity(),
        normalize: args.normalize_questions,
    }));
    let rate_limiter = Arc::new(RateLimiter::new(args.rate_limit, args.rate_window()));
    let generation_log = args.generation_log.clone().map(|p| Arc::new(GenerationLog::new(p)));

    let limits = PipelineLimits {
        max_question_chars: args.max_question_chars,
        generation_timeout: args.llm_timeout(),
        execution_timeout: args.query_timeout(),
    };

    // creating shared state
    let state = Arc::new(AppState::new(
        rate_limiter.clone(),
        cache.clone(),
        generator,
        executor,
        limits,
        generation_log,
    ));

    // spawn the background sweep
    tokio::spawn(maintenance_loop(cache, rate_limiter, args.maintenance_interval()));

    let app = text2sql_gateway::router(state);

    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(addr = %addr, "gateway listening");
    tracing::info!(
        ttl_seconds = args.cache_ttl,
        max_entries = args.cache_max_entries,
        normalize = args.normalize_questions,
        "cache configured"
    );
    tracing::info!(
        "Rate limit: {} requests per {} seconds",
        args.rate_limit, args.rate_window
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
