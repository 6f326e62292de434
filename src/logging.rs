//! Tracing setup for the sidecar.
//!
//! Stdout carries the JSON protocol, so logs always go to stderr. The filter
//! comes from `ROTAREQD_LOG`, then `RUST_LOG`, then defaults to `warn`.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "ROTAREQD_LOG";

fn build_env_filter() -> EnvFilter {
    // An unparseable project filter falls through instead of failing startup.
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new("warn")
}

pub fn init() {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .without_time()
        .compact();
    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(fmt_layer)
        .try_init();
}
