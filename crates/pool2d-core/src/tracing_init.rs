//! Shared tracing/logging initialization.
//!
//! The daemon's long-running scheduler and its one-shot admin subcommands use
//! the same `tracing_subscriber` setup: an env-filter plus optional JSON
//! output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"pool2d_daemon=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Default filter string for a crate at the given level.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!("{crate_name}={level},pool2d_core={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_core() {
        assert_eq!(
            default_filter("pool2d_daemon", "debug"),
            "pool2d_daemon=debug,pool2d_core=debug"
        );
    }
}
