//! Tracing subscriber setup with format selection.

use anyhow::{Context, Result};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::{LogFormat, TracingConfig};

/// Guard returned by [`init_tracing`].
///
/// Keep it alive for as long as log output is wanted.
pub struct TracingGuard {
    service_name: String,
}

impl TracingGuard {
    /// Service name the subscriber was installed for.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        tracing::debug!(service = %self.service_name, "Tracing guard dropped");
    }
}

/// Install a global tracing subscriber for the given configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<TracingGuard> {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format() {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_file(config.include_location())
                        .with_line_number(config.include_location())
                        .with_target(config.include_target())
                        .with_thread_names(config.include_thread_names())
                        .with_thread_ids(config.include_thread_ids())
                        .with_span_events(FmtSpan::CLOSE)
                        .flatten_event(true),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .pretty()
                        .with_file(config.include_location())
                        .with_line_number(config.include_location())
                        .with_target(config.include_target())
                        .with_thread_names(config.include_thread_names())
                        .with_thread_ids(config.include_thread_ids()),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_file(config.include_location())
                        .with_line_number(config.include_location())
                        .with_target(config.include_target())
                        .with_thread_names(config.include_thread_names())
                        .with_thread_ids(config.include_thread_ids()),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }

    tracing::info!(service = %config.service_name(), "Tracing initialized");

    Ok(TracingGuard {
        service_name: config.service_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_installs_subscriber_once() {
        let config = TracingConfig::builder()
            .service_name("ge-test")
            .log_format(LogFormat::Json)
            .log_filter("warn")
            .build();

        // The global subscriber may already be installed in this process.
        match init_tracing(config.clone()) {
            Ok(guard) => {
                assert_eq!(guard.service_name(), "ge-test");
                assert!(init_tracing(config).is_err());
            }
            Err(e) => assert!(e.to_string().contains("Failed to initialize")),
        }
    }
}
