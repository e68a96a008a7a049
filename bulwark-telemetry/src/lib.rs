//! # Bulwark Telemetry
//!
//! Logging setup for bulwark binaries.
//!
//! Library crates in the workspace only emit `tracing` events; this crate
//! decides where they go:
//! - JSON output for log aggregation, pretty output for development
//! - stdout and rolling files, in any combination
//! - `RUST_LOG` overrides the configured level

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Logging configuration and initialization
pub mod logging;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::logging::{
        LogConfig, LogFormat, LogOutput, LoggingError, RotationConfig, init_logging,
    };
}
