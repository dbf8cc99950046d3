//! Logging setup for Trellis
//!
//! The framework only emits `tracing` events: container and router internals
//! at `debug`/`trace`, skipped actions and unregistered middleware at `warn`,
//! the route dump at `info`. Where they end up is the application's choice;
//! [`LogConfig`] installs a ready-made subscriber.
//!
//! ```no_run
//! use trellis_core::logging::*;
//!
//! let _guard = LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init()
//!     .expect("logging already initialized");
//!
//! info!("Application started");
//! ```

use std::io;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

pub use tracing::{debug, error, info, trace, warn};

type Filtered = Layered<EnvFilter, Registry>;

/// The subscriber built by [`LogConfig::subscriber`].
pub type LogSubscriber = Layered<Box<dyn Layer<Filtered> + Send + Sync>, Filtered>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    Plain,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Append to a single file
    File(String),
    RollingFile {
        directory: String,
        prefix: String,
        rotation: Rotation,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl From<Rotation> for tracing_appender::rolling::Rotation {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Minutely => Self::MINUTELY,
            Rotation::Hourly => Self::HOURLY,
            Rotation::Daily => Self::DAILY,
            Rotation::Never => Self::NEVER,
        }
    }
}

/// Failure to install the global subscriber.
#[derive(Error, Debug)]
pub enum LogInitError {
    #[error("failed to open log file: {0}")]
    Io(#[from] io::Error),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Where and how framework events are written.
///
/// Defaults to JSON on stdout at `info`. `RUST_LOG` overrides the level
/// unless explicit directives are set.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub ansi: bool,
    pub directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            ansi: false,
            directives: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Colored output for the text formats.
    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.ansi = enable;
        self
    }

    /// Filter directives such as `"trellis_core=debug"`, replacing `level`
    /// and `RUST_LOG`.
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    pub fn filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str());
        match &self.directives {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    /// Build the subscriber over `writer` without installing it.
    pub fn subscriber<W>(&self, writer: W) -> LogSubscriber
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let layer: Box<dyn Layer<Filtered> + Send + Sync> = match self.format {
            LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
            LogFormat::Plain => fmt::layer().with_ansi(self.ansi).with_writer(writer).boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_ansi(self.ansi)
                .with_writer(writer)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_ansi(self.ansi)
                .with_writer(writer)
                .boxed(),
        };
        tracing_subscriber::registry().with(self.filter()).with(layer)
    }

    /// Install the subscriber globally.
    ///
    /// Lines are written on a background thread; keep the returned guard
    /// alive so they are flushed.
    pub fn init(self) -> Result<WorkerGuard, LogInitError> {
        let (writer, guard) = self.writer()?;
        self.subscriber(writer).try_init()?;
        Ok(guard)
    }

    fn writer(&self) -> io::Result<(NonBlocking, WorkerGuard)> {
        Ok(match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
                tracing_appender::non_blocking(file)
            }
            LogOutput::RollingFile {
                directory,
                prefix,
                rotation,
            } => tracing_appender::non_blocking(RollingFileAppender::new(
                (*rotation).into(),
                directory,
                prefix,
            )),
        })
    }
}
