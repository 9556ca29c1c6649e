//! Subscriber setup.
//!
//! When the protocol runs over stdio the host owns stdout, so logs default
//! to stderr. File logging goes through a non-blocking appender so a slow
//! disk never stalls an invocation; hold the returned [`LoggingGuard`] until
//! shutdown to flush it.

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading by eye.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event, fields flattened.
    Json,
    /// The `tracing-subscriber` default.
    Full,
}

impl LogFormat {
    /// Name used in config files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Pretty, Self::Compact, Self::Json, Self::Full]
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TelemetryError::ConfigError(format!("unknown log format '{s}'")))
    }
}

/// How often a log file rolls over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileRotation {
    /// A new file each day.
    #[default]
    Daily,
    /// A new file each hour.
    Hourly,
    /// One file forever.
    Never,
}

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Daily => Self::DAILY,
            FileRotation::Hourly => Self::HOURLY,
            FileRotation::Never => Self::NEVER,
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard error.
    #[default]
    Stderr,
    /// Standard output. Only usable when the protocol is not on stdout.
    Stdout,
    /// Rolling files named `<prefix>.<date>` under `directory`.
    RollingFile {
        /// Created on setup if missing.
        directory: PathBuf,
        /// File name prefix.
        prefix: String,
        /// Roll-over period.
        rotation: FileRotation,
    },
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Base filter, e.g. `info` or `funcworker_runtime=debug,warn`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Destination.
    pub target: LogTarget,
    /// Directives layered over `level`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Compact lines to stderr at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directives: Vec::new(),
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the destination.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Write daily-rolled files under `directory`.
    #[must_use]
    pub fn rolling_daily(self, directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.with_target(LogTarget::RollingFile {
            directory: directory.into(),
            prefix: prefix.into(),
            rotation: FileRotation::Daily,
        })
    }

    /// Add a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Build from the `[logging]` section of the worker config.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ConfigError`] for an unknown format.
    #[cfg(feature = "config")]
    pub fn from_section(section: &funcworker_config::LoggingSection) -> TelemetryResult<Self> {
        Ok(Self {
            level: section.level.clone(),
            format: section.format.parse()?,
            target: LogTarget::Stderr,
            directives: section.directives.clone(),
        })
    }

    /// The filter: `level`, then each directive.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ConfigError`] naming the first bad entry.
    pub fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        let base = EnvFilter::try_new(&self.level).map_err(|e| {
            TelemetryError::ConfigError(format!("invalid log level '{}': {e}", self.level))
        })?;
        self.directives.iter().try_fold(base, |filter, directive| {
            directive
                .parse()
                .map(|d| filter.add_directive(d))
                .map_err(|e| {
                    TelemetryError::ConfigError(format!("invalid directive '{directive}': {e}"))
                })
        })
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi);
        match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Json => layer.json().flatten_event(true).boxed(),
            LogFormat::Full => layer.boxed(),
        }
    }
}

/// Keeps the background file writer running.
///
/// Dropping it flushes buffered lines and stops file logging. For stderr
/// and stdout targets it holds nothing.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _writer: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// ANSI colors are used only when the target is a terminal.
///
/// # Errors
///
/// Returns an error for an invalid filter, an uncreatable log directory,
/// or when a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<LoggingGuard> {
    let filter = config.env_filter()?;

    let (layer, writer) = match &config.target {
        LogTarget::Stderr => (
            config.layer(std::io::stderr, std::io::stderr().is_terminal()),
            None,
        ),
        LogTarget::Stdout => (
            config.layer(std::io::stdout, std::io::stdout().is_terminal()),
            None,
        ),
        LogTarget::RollingFile {
            directory,
            prefix,
            rotation,
        } => {
            std::fs::create_dir_all(directory)?;
            let appender = RollingFileAppender::new((*rotation).into(), directory, prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (config.layer(non_blocking, false), Some(guard))
        },
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))?;

    Ok(LoggingGuard { _writer: writer })
}
