//! Logging setup for embedders of the graph manager.
//!
//! The manager itself only emits `tracing` events and spans. Applications and
//! test harnesses call [`init_tracing`] once to install a subscriber.
//!
//! Output format is controlled via `GE_LOG_FORMAT`:
//! - `json` - Structured JSON output
//! - `pretty` - Human-readable multi-line output
//! - `compact` - Compact single-line format (default)
//!
//! # Example
//!
//! ```ignore
//! use ge_runtime::observability::{TracingConfig, init_tracing};
//!
//! let _guard = init_tracing(TracingConfig::from_env())?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::{TracingGuard, init_tracing};
