//! Logging setup for hosts embedding the operation.
//!
//! Every configured sink becomes a [`tracing_subscriber`] fmt layer writing through its own
//! non-blocking [`tracing_appender`] worker.

use std::{collections::BTreeMap, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::{
    non_blocking::{NonBlockingBuilder, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self, writer::BoxMakeWriter},
    layer::{Layer, Layered, SubscriberExt},
    registry::{LookupSpan, Registry},
    util::{SubscriberInitExt, TryInitError},
};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Subscriber built from [`LoggingConfig`].
pub type LogRegistry = Layered<Vec<BoxedLayer<Registry>>, Registry>;

/// Error type used in logging setup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoggingError {
    /// Log file could not be opened.
    #[error("Unable to open log file: {0}")]
    File(#[from] io::Error),
    /// Rolling log directory could not be prepared.
    #[error("Unable to prepare log directory: {0}")]
    Directory(#[from] tracing_appender::rolling::InitError),
    /// Global subscriber is already installed.
    #[error("Unable to install global subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps log writer threads alive.
///
/// Buffered lines are flushed when dropped.
#[must_use = "log writers stop when the guard is dropped"]
pub struct LoggingGuard {
    workers: Vec<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("workers", &self.workers.len())
            .finish()
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LoggingConfig {
    /// Log sinks. Nothing is logged if empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscribers: Vec<LogSink>,
}

impl LoggingConfig {
    /// Configuration with a single sink.
    #[must_use]
    pub fn with_sink(sink: LogSink) -> Self {
        Self {
            subscribers: vec![sink],
        }
    }

    /// Build a subscriber with one layer per sink, without installing it.
    ///
    /// # Errors
    ///
    /// Returns `Err` if some log destination cannot be opened.
    pub fn make_registry(&self) -> Result<(LogRegistry, Vec<WorkerGuard>), LoggingError> {
        let mut layers = Vec::with_capacity(self.subscribers.len());
        let mut workers = Vec::with_capacity(self.subscribers.len());
        for sink in &self.subscribers {
            let (layer, worker) = sink.make_layer()?;
            layers.push(layer);
            workers.push(worker);
        }
        Ok((Registry::default().with(layers), workers))
    }

    /// Build a subscriber and install it as the global default.
    ///
    /// # Errors
    ///
    /// Returns `Err` if some log destination cannot be opened, or if another global
    /// subscriber is already installed.
    pub fn init(&self) -> Result<LoggingGuard, LoggingError> {
        let (registry, workers) = self.make_registry()?;
        registry.try_init()?;
        Ok(LoggingGuard { workers })
    }
}

/// Single log sink.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LogSink {
    /// Line format.
    #[serde(default, flatten)]
    pub format: LogFormat,
    /// Minimum severity of written events.
    #[serde(default)]
    pub level: LogLevel,
    /// Per-target severity overrides, e.g. `rasterize_pools: debug`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<String, LogLevel>,
    /// Use ANSI colors.
    #[serde(default)]
    pub color: bool,
    /// Print event targets.
    #[serde(default)]
    pub with_target: bool,
    /// Print names of emitting threads.
    #[serde(default)]
    pub with_thread_names: bool,
    /// Number of lines buffered by the writer thread.
    #[serde(default = "LogSink::default_buffered_lines")]
    pub buffered_lines: usize,
    /// Drop lines when the buffer is full instead of blocking the caller.
    #[serde(default = "crate::util::default_true")]
    pub lossy: bool,
    /// Where lines are written.
    #[serde(default)]
    pub output: LogOutput,
}

impl Default for LogSink {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::default(),
            targets: BTreeMap::new(),
            color: false,
            with_target: false,
            with_thread_names: false,
            buffered_lines: Self::default_buffered_lines(),
            lossy: true,
            output: LogOutput::default(),
        }
    }
}

impl LogSink {
    #[inline]
    fn default_buffered_lines() -> usize {
        128_000
    }

    /// Colored pretty-printed sink on stderr with everything enabled.
    ///
    /// Handy when debugging shaders or backends locally.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: LogLevel::Trace,
            color: true,
            with_target: true,
            with_thread_names: true,
            output: LogOutput::StdErr,
            ..Self::default()
        }
    }

    /// Build layer and writer thread for this sink.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the destination cannot be opened.
    pub fn make_layer<S>(&self) -> Result<(BoxedLayer<S>, WorkerGuard), LoggingError>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        let buffer = NonBlockingBuilder::default()
            .buffered_lines_limit(self.buffered_lines)
            .lossy(self.lossy);
        let (writer, worker) = self.output.open(buffer)?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.color)
            .with_target(self.with_target)
            .with_thread_names(self.with_thread_names);
        let layer = match self.format {
            LogFormat::Full => layer.boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Json { flatten, span_list } => layer
                .json()
                .flatten_event(flatten)
                .with_span_list(span_list)
                .boxed(),
        };
        let filter = Targets::new()
            .with_targets(
                self.targets
                    .iter()
                    .map(|(target, &level)| (target.clone(), LevelFilter::from(level))),
            )
            .with_default(LevelFilter::from(self.level));
        Ok((layer.with_filter(filter).boxed(), worker))
    }
}

/// Line format of a sink.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase", tag = "format")]
pub enum LogFormat {
    /// Single line with span context.
    #[default]
    Full,
    /// Single line without span names.
    Compact,
    /// Multi-line human-oriented output.
    Pretty,
    /// Newline-delimited JSON objects.
    Json {
        /// Put event fields at the top level of the object.
        #[serde(default)]
        flatten: bool,
        /// Include all entered spans.
        #[serde(default)]
        span_list: bool,
    },
}

/// Minimum event severity.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Nothing.
    #[serde(alias = "disabled")]
    Off,
    /// Errors only.
    Error,
    /// Warnings and errors.
    #[serde(alias = "warning")]
    Warn,
    /// Informational events and above.
    #[default]
    Info,
    /// Debug events and above, including pool checkouts and rasterizer creation.
    Debug,
    /// Everything.
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::OFF,
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

/// Destination of a sink.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    StdOut,
    /// Standard error.
    StdErr,
    /// Append to a single file.
    File {
        /// File path.
        path: PathBuf,
    },
    /// Rolling files in a directory.
    #[serde(alias = "dir")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// File name prefix.
        #[serde(default = "LogOutput::default_prefix")]
        prefix: String,
        /// How often a new file is started.
        #[serde(default)]
        rotation: LogRotation,
    },
}

impl LogOutput {
    fn default_prefix() -> String {
        "rasterize".into()
    }

    fn open(&self, buffer: NonBlockingBuilder) -> Result<(BoxMakeWriter, WorkerGuard), LoggingError> {
        let (writer, worker) = match self {
            Self::StdOut => buffer.finish(io::stdout()),
            Self::StdErr => buffer.finish(io::stderr()),
            Self::File { path } => {
                let file = fs::OpenOptions::new().append(true).create(true).open(path)?;
                buffer.finish(file)
            }
            Self::Directory {
                path,
                prefix,
                rotation,
            } => {
                let appender = RollingFileAppender::builder()
                    .rotation((*rotation).into())
                    .filename_prefix(prefix)
                    .filename_suffix("log")
                    .build(path)?;
                buffer.finish(appender)
            }
        };
        Ok((BoxMakeWriter::new(writer), worker))
    }
}

/// Rotation period of rolling log files.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Every hour.
    Hourly,
    /// Every day.
    #[default]
    Daily,
    /// Single file.
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
            LogRotation::Never => Self::NEVER,
        }
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> LoggingConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn no_sinks() {
        let (_registry, workers) = LoggingConfig::default().make_registry().unwrap();
        assert!(workers.is_empty());
        let cfg = LoggingConfig::with_sink(LogSink::default());
        assert_eq!(cfg.make_registry().unwrap().1.len(), 1);
    }

    #[test]
    fn worker_per_sink() {
        let cfg = LoggingConfig {
            subscribers: vec![
                LogSink::default(),
                LogSink {
                    format: LogFormat::Json {
                        flatten: true,
                        span_list: false,
                    },
                    ..LogSink::verbose()
                },
            ],
        };
        let (_registry, workers) = cfg.make_registry().unwrap();
        assert_eq!(workers.len(), 2);
    }

    #[test]
    fn sink_from_yaml() {
        let cfg = parse(
            r#"
subscribers:
  - format: json
    span_list: true
    level: warning
    targets:
      rasterize_pools: debug
    output:
      type: dir
      path: /var/log/rasterize
      rotation: hourly
"#,
        );
        let sink = &cfg.subscribers[0];
        assert_eq!(
            sink.format,
            LogFormat::Json {
                flatten: false,
                span_list: true
            }
        );
        assert_eq!(sink.level, LogLevel::Warn);
        assert_eq!(sink.targets["rasterize_pools"], LogLevel::Debug);
        assert!(sink.lossy);
        assert_eq!(
            sink.output,
            LogOutput::Directory {
                path: "/var/log/rasterize".into(),
                prefix: "rasterize".into(),
                rotation: LogRotation::Hourly,
            }
        );
    }

    #[test]
    fn level_filters() {
        assert_eq!(LevelFilter::from(LogLevel::Off), LevelFilter::OFF);
        assert_eq!(LevelFilter::from(LogLevel::default()), LevelFilter::INFO);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }
}
