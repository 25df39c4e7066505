//! Tracing subscriber setup from the `[logging]` section

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{MediaError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Build the level filter. `RUST_LOG` wins, then `level_override`, then the config.
pub fn build_filter(config: &LoggingConfig, level_override: Option<&str>) -> Result<EnvFilter> {
    let directives = match std::env::var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => level_override.unwrap_or(&config.level).to_string(),
    };

    EnvFilter::try_new(&directives).map_err(|e| {
        MediaError::Config(format!("Invalid log level '{}': {}", directives, e))
    })
}

/// Install the global subscriber: stderr, plus an append-only file if configured
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let filter = build_filter(config, level_override)?;

    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(format_layer(config.format, config.timestamps, Mutex::new(file), false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(
            config.format,
            config.timestamps,
            std::io::stderr,
            config.colored,
        ))
        .with(file_layer)
        .try_init()
        .map_err(|e| MediaError::Other(format!("Failed to initialize logging: {}", e)))
}

fn format_layer<S, W>(
    format: LogFormat,
    timestamps: bool,
    writer: W,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);

    match (format, timestamps) {
        (LogFormat::Compact, true) => layer.compact().with_target(false).boxed(),
        (LogFormat::Compact, false) => layer.compact().with_target(false).without_time().boxed(),
        (LogFormat::Pretty, true) => layer.pretty().boxed(),
        (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
        (LogFormat::Full, true) => layer.boxed(),
        (LogFormat::Full, false) => layer.without_time().boxed(),
    }
}
