//! JSON logging for the Lambda runtimes.
//!
//! CloudWatch captures stdout, so every event is emitted as one JSON line.
//! `RUST_LOG` overrides the default `info` filter.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_LEVEL: &str = "info";

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_current_span(false)
                .with_filter(filter),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_structured_logging();
        init_structured_logging();
        tracing::info!(component = "logging_test", "logging_ready");
    }
}
