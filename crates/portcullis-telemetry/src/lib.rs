//! Logging setup for Portcullis services.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and JSON
//! or pretty output:
//!
//! ```rust,ignore
//! use portcullis_telemetry::{init_logging, LogConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging(&LogConfig::development())?;
//!     tracing::debug!("routes registered");
//!     Ok(())
//! }
//! ```
//!
//! [`EnvFilter`]: tracing_subscriber::EnvFilter

#![doc(html_root_url = "https://docs.rs/portcullis-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
