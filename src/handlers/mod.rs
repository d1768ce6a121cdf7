mod cache;
mod client;
mod generate;
mod health;
mod metrics;
mod panic;
mod tables;

pub use cache::flush_cache_handler;
pub use client::{ClientId, UNKNOWN_CLIENT};
pub use generate::generate_handler;
pub use health::{detailed_health_handler, health_handler};
pub use metrics::metrics_handler;
pub use panic::catch_panic;
pub use tables::tables_handler;
