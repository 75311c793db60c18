//! Tracing setup for calweave
//!
//! Provides unified logging configuration for the sync pipeline and its
//! callers. Per-record drops are logged at `warn` with structured fields;
//! pipeline progress at `debug`/`info`.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to set global subscriber
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// Failed to parse env filter directive
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Human-readable pretty format (default)
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured log collection
    Json,
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// The default log level when RUST_LOG is not set
    pub default_level: Level,
    /// Output format for log messages
    pub output_format: TracingOutputFormat,
    /// Whether to include target (module path) in logs
    pub include_target: bool,
    /// Custom env filter directive (overrides default_level if set)
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Pretty,
            include_target: true,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Create a config suitable for an unattended sync run (structured JSON).
    #[must_use]
    pub fn sync_run() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            ..Default::default()
        }
    }

    /// Set the default log level
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set the output format
    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set a custom env filter directive
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }
}

/// Initialize tracing with the given configuration.
///
/// Should be called once at startup; `RUST_LOG` overrides the default level.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set or the
/// env filter directive is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = if let Some(ref filter) = config.env_filter {
        EnvFilter::try_new(filter)?
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("calweave={}", config.default_level)))
    };

    match config.output_format {
        TracingOutputFormat::Pretty => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_target(config.include_target));
            tracing::subscriber::set_global_default(subscriber)?;
        }
        TracingOutputFormat::Compact => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_target(config.include_target));
            tracing::subscriber::set_global_default(subscriber)?;
        }
        TracingOutputFormat::Json => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(config.include_target));
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
