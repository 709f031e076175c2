//! Configuration types for logging.

use std::env;
use std::str::FromStr;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON format for structured logging.
    Json,
    /// Human-readable pretty format.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::default(),
        })
    }
}

/// Configuration for log output.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    service_name: String,
    log_format: LogFormat,
    log_filter: String,
    include_location: bool,
    include_target: bool,
    include_thread_names: bool,
    include_thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "ge".to_string(),
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
            include_location: false,
            include_target: true,
            // The run worker is a named thread; show it by default.
            include_thread_names: true,
            include_thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Create a new builder.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GE_LOG_FORMAT`: "json", "pretty", or "compact"
    /// - `GE_LOG_LEVEL` or `RUST_LOG`: Log filter string
    /// - `GE_LOG_LOCATION`: "1" to include file and line
    /// - `GE_LOG_THREAD_IDS`: "1" to include thread ids
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let log_format = env::var("GE_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse::<LogFormat>().ok())
            .unwrap_or(defaults.log_format);

        let log_filter = env::var("GE_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or(defaults.log_filter);

        Self {
            log_format,
            log_filter,
            include_location: env_flag("GE_LOG_LOCATION").unwrap_or(defaults.include_location),
            include_thread_ids: env_flag("GE_LOG_THREAD_IDS")
                .unwrap_or(defaults.include_thread_ids),
            ..defaults
        }
    }

    /// Get the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Get the log format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Get the log filter.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Check if source location should be included.
    pub fn include_location(&self) -> bool {
        self.include_location
    }

    /// Check if target should be included.
    pub fn include_target(&self) -> bool {
        self.include_target
    }

    /// Check if thread names should be included.
    pub fn include_thread_names(&self) -> bool {
        self.include_thread_names
    }

    /// Check if thread IDs should be included.
    pub fn include_thread_ids(&self) -> bool {
        self.include_thread_ids
    }
}

/// Builder for TracingConfig.
#[derive(Debug, Clone, Default)]
pub struct TracingConfigBuilder {
    service_name: Option<String>,
    log_format: Option<LogFormat>,
    log_filter: Option<String>,
    include_location: Option<bool>,
    include_thread_ids: Option<bool>,
}

impl TracingConfigBuilder {
    /// Set the service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the log format.
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    /// Set the log filter.
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Include source location in logs.
    pub fn include_location(mut self, include: bool) -> Self {
        self.include_location = Some(include);
        self
    }

    /// Include thread IDs in logs.
    pub fn include_thread_ids(mut self, include: bool) -> Self {
        self.include_thread_ids = Some(include);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TracingConfig {
        let defaults = TracingConfig::default();
        TracingConfig {
            service_name: self.service_name.unwrap_or(defaults.service_name),
            log_format: self.log_format.unwrap_or(defaults.log_format),
            log_filter: self.log_filter.unwrap_or(defaults.log_filter),
            include_location: self.include_location.unwrap_or(defaults.include_location),
            include_thread_ids: self
                .include_thread_ids
                .unwrap_or(defaults.include_thread_ids),
            ..defaults
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|s| s.eq_ignore_ascii_case("true") || s == "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("whatever".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = TracingConfig::builder()
            .service_name("ge-test")
            .log_format(LogFormat::Json)
            .log_filter("debug,ge_runtime=trace")
            .build();

        assert_eq!(config.service_name(), "ge-test");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), "debug,ge_runtime=trace");
        assert!(config.include_thread_names());
        assert!(!config.include_location());
    }
}
