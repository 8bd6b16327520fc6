//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Pick the log level from the environment, CLI verbosity or config
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` always wins over configuration
//! - Logs never share stdout with command output

use tracing::Subscriber;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Directive for the crate given CLI verbosity, falling back to the config level.
pub fn filter_directive(config: &ObservabilityConfig, verbosity: u8) -> String {
    let level = match verbosity {
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    format!("resilient_fetch={level},warn")
}

/// Build the subscriber, writing every format through `writer`.
pub fn build_subscriber<W>(
    config: &ObservabilityConfig,
    verbosity: u8,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbosity)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => Box::new(
            registry.with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(writer),
            ),
        ),
        LogFormat::Pretty => Box::new(registry.with(fmt::layer().with_writer(writer))),
    }
}

/// Install the global subscriber, logging to stderr.
///
/// Returns `false` when a subscriber was already installed (tests, embedding apps).
pub fn init_logging(config: &ObservabilityConfig, verbosity: u8) -> bool {
    let subscriber = build_subscriber(config, verbosity, std::io::stderr);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
