//! Diagnostic logging for xcollect.
//!
//! Events go to stderr through `tracing-subscriber`; stdout is reserved for
//! the run summary so `--format json` output stays parseable.
//!
//! ```rust
//! use xcollect::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::info!("Collector started");
//! ```

use std::time::Instant;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// How much to log and how to lay it out.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Prefix events with a timestamp.
    pub timestamps: bool,
    /// Show the emitting module.
    pub target: bool,
    /// Emit span close events (with busy/idle timings).
    pub spans: bool,
    pub colors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading while debugging a run.
    Pretty,
    /// One line per event.
    Compact,
    /// Compact plus thread ids and source locations.
    Full,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            timestamps: true,
            target: false,
            spans: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// What a plain CLI invocation shows: warnings and worse, no timestamps.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            level: LogLevel::Warn,
            timestamps: false,
            ..Self::default()
        }
    }

    /// Errors only, for `-q`.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            ..Self::cli()
        }
    }

    /// Per-page and per-batch detail, for `-v`.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            target: true,
            ..Self::default()
        }
    }

    /// Everything, including span timings, for `-vv`.
    #[must_use]
    pub fn trace() -> Self {
        Self {
            level: LogLevel::Trace,
            format: LogFormat::Full,
            target: true,
            spans: true,
            ..Self::default()
        }
    }

    /// `EnvFilter` directive limited to this crate's events.
    #[must_use]
    pub fn directive(&self) -> String {
        format!("xcollect={}", self.level.as_str())
    }
}

/// Install the global subscriber. Only the first call has any effect.
///
/// A set `RUST_LOG` takes precedence over `config.level`.
pub fn init_logging(config: &LogConfig) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(config.directive()),
    };
    let span_events = if config.spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target)
        .with_span_events(span_events);
    let registry = tracing_subscriber::registry().with(filter);

    // The layer type differs per arm.
    let _ = match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => registry.with(layer.pretty()).try_init(),
        (LogFormat::Pretty, false) => registry.with(layer.pretty().without_time()).try_init(),
        (LogFormat::Compact, true) => registry.with(layer.compact()).try_init(),
        (LogFormat::Compact, false) => registry.with(layer.compact().without_time()).try_init(),
        (LogFormat::Full, _) => registry
            .with(
                layer
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
    };
}

/// Silence logging in tests that exercise code paths which log.
pub fn init_test_logging() {
    init_logging(&LogConfig {
        level: LogLevel::Off,
        ..LogConfig::default()
    });
}

/// Pick a preset from the `-q` flag and the `-v` count.
#[must_use]
pub fn cli_log_config(quiet: bool, verbosity: u8) -> LogConfig {
    match (quiet, verbosity) {
        (true, _) => LogConfig::quiet(),
        (false, 0) => LogConfig::cli(),
        (false, 1) => LogConfig::verbose(),
        (false, _) => LogConfig::trace(),
    }
}

pub fn init_cli_logging(quiet: bool, verbosity: u8) {
    init_logging(&cli_log_config(quiet, verbosity));
}

/// Logs when a run starts and how it ended.
pub struct OperationGuard {
    name: String,
    started: Instant,
}

impl OperationGuard {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(operation = %name, "Run started");
        Self {
            name,
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn complete(self) {
        tracing::info!(
            operation = %self.name,
            elapsed_ms = self.elapsed_ms(),
            "Run completed"
        );
    }

    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::error!(
            operation = %self.name,
            elapsed_ms = self.elapsed_ms(),
            %error,
            "Run failed"
        );
    }
}
