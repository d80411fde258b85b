//! Structured logging setup for the device binary.
//!
//! `RUST_LOG` controls filtering (defaults to `info`); set
//! `CROFTOS_LOG_FORMAT=json` to emit newline-delimited JSON suitable for
//! log aggregators.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_level));

    if std::env::var("CROFTOS_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
