//! Structured logging for actorcache
//!
//! All logs use structured fields so they can be filtered and parsed.
//!
//! # Log Format Conventions
//!
//! - `classpath`: Actor type being constructed or cached
//! - `dir`: Cache directory involved in the operation
//! - `pid`: Process id, on lock acquisition
//! - `fingerprint`: Hex SHA-256 of the actor state
//!
//! # Examples
//!
//! ```rust
//! use tracing::debug;
//!
//! debug!(
//!     classpath = "text.Tokenizer",
//!     dir = "/cache/text.Tokenizer/1/000",
//!     "Using cache directory"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Environment variable selecting the log format
pub const LOG_FORMAT_ENV: &str = "ACTORCACHE_LOG_FORMAT";

/// Formatter that shows "actorcache" instead of the full module path
struct ActorCacheFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for ActorCacheFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(writer, "{}{:5}(actorcache)\x1b[0m: ", level_style, meta.level())?;
        } else {
            write!(writer, "{:5}(actorcache): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    Pretty,
    /// Compact format (for CI)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    /// Format from ACTORCACHE_LOG_FORMAT, falling back to `default`
    pub fn from_env_or(default: Option<Self>) -> Self {
        let from_env = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|v| Self::parse(&v));

        match from_env.or(default) {
            Some(format) => format,
            // Default: pretty for dev, compact for CI
            None if std::env::var("CI").is_ok() => Self::Compact,
            None => Self::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber
///
/// `level` is the filter used when RUST_LOG is unset. Calling this more than
/// once keeps the first subscriber.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "actorcache=trace")
/// - `ACTORCACHE_LOG_FORMAT`: Set format ("pretty", "compact", "json")
/// - `CI`: If set, defaults to compact format
pub fn init(level: &str, format: Option<LogFormat>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match LogFormat::from_env_or(format) {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .event_format(ActorCacheFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .event_format(ActorCacheFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    // A subscriber installed earlier (tests, embedding applications) wins.
    let _ = result;
}
