//! # Router Telemetry
//!
//! Structured logging for the component router and its tools.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use router_telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::from_env()).expect("logging");
//! tracing::info!(component = "billing", "ready");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CR_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `CR_JSON_LOGS` | `false` | JSON formatted output |
//! | `CR_CONSOLE_OUTPUT` | `true` | Write logs to the console |
//! | `CR_SERVICE_NAME` | `component-router` | Service name |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::env_filter;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Install logging for the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    logging::init_logging(config)
}
