use crate::domain::models::config::{LogFormat, LoggingConfig, RotationPolicy};
use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const LOG_FILE_PREFIX: &str = "packsync.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Owns the global tracing subscriber's file writer.
///
/// Console output goes to stderr; stdout carries command output only.
/// Dropping the logger flushes any buffered file output.
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Install the global subscriber. `RUST_LOG` overrides the configured level.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = Level::from_str(&config.level)
            .with_context(|| format!("Invalid log level: {}", config.level))?;
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let mut layers = vec![console_layer(config.format)];
        let guard = config.log_dir.as_deref().map(|dir| {
            let (writer, guard) = tracing_appender::non_blocking(appender(dir, config.rotation));
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true)
                    .boxed(),
            );
            guard
        });

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        tracing::debug!(
            level = %level,
            format = ?config.format,
            log_dir = ?config.log_dir,
            "logging ready"
        );

        Ok(Self { _guard: guard })
    }
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    match format {
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
        LogFormat::Pretty => layer.compact().with_target(false).boxed(),
    }
}

fn appender(dir: &Path, rotation: RotationPolicy) -> RollingFileAppender {
    match rotation {
        RotationPolicy::Daily => rolling::daily(dir, LOG_FILE_PREFIX),
        RotationPolicy::Hourly => rolling::hourly(dir, LOG_FILE_PREFIX),
        RotationPolicy::Never => rolling::never(dir, LOG_FILE_PREFIX),
    }
}
