//! Structured logging for bulwark.
//!
//! Provides configurable logging with support for:
//! - JSON and pretty-print formats
//! - Multiple output targets (stdout, stderr, file)
//! - Log rotation

mod config;

pub use config::{LogConfig, LogFormat, LogOutput, RotationConfig};

use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::{self, MakeWriter, format::FmtSpan};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Initialize the logging system with the given configuration.
///
/// Returns guards that must be kept alive for the duration of the program
/// so buffered file output is flushed.
///
/// # Example
///
/// ```no_run
/// use bulwark_telemetry::logging::{init_logging, LogConfig};
///
/// let config = LogConfig::default();
/// let _guards = init_logging(&config).expect("Failed to initialize logging");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Vec<WorkerGuard>, LoggingError> {
    if config.outputs.is_empty() {
        return Err(LoggingError::InvalidConfig(
            "at least one output is required".to_string(),
        ));
    }
    let env_filter = build_filter(config)?;

    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer<_>> = Vec::new();

    for output in &config.outputs {
        match output {
            LogOutput::Stdout => layers.push(format_layer(config, std::io::stdout)),
            LogOutput::Stderr => layers.push(format_layer(config, std::io::stderr)),
            LogOutput::File {
                path,
                prefix,
                rotation,
            } => {
                let appender = create_file_appender(path, prefix, *rotation)?;
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                layers.push(format_layer(config, non_blocking));
                guards.push(guard);
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(guards)
}

/// Builds the event filter: `RUST_LOG` when set, otherwise `config.level`.
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| LoggingError::InvalidConfig(format!("level '{}': {e}", config.level)))
}

fn format_layer<S, W>(config: &LogConfig, writer: W) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(config.include_thread_id)
        .with_file(config.include_file_info)
        .with_line_number(config.include_file_info)
        .with_span_events(if config.include_span_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    match config.format {
        LogFormat::Json => base.json().flatten_event(true).boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    }
}

fn create_file_appender(
    path: &str,
    prefix: &str,
    rotation: Option<RotationConfig>,
) -> Result<RollingFileAppender, LoggingError> {
    std::fs::create_dir_all(Path::new(path))?;
    Ok(match rotation.unwrap_or(RotationConfig::Daily) {
        RotationConfig::Hourly => rolling::hourly(path, prefix),
        RotationConfig::Daily => rolling::daily(path, prefix),
        RotationConfig::Never => rolling::never(path, prefix),
    })
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create log directory
    #[error("Failed to create log directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid logging configuration: {0}")]
    InvalidConfig(String),

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}
