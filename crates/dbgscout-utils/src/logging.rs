//! # Logging
//!
//! `tracing` subscriber setup for the dbgscout binary.
//!
//! Two entry points exist. [`init_logging`] writes to stderr, so reports on
//! stdout stay clean, and can mirror everything into a daily-rotated file
//! named by `DBGSCOUT_LOG_FILE`. [`init_logging_to_dir`] writes only to a
//! dated file in a directory.
//!
//! ```rust,no_run
//! use dbgscout_utils::{LogLevel, init_logging};
//!
//! init_logging(Some(LogLevel::Debug)).expect("Failed to initialize logging");
//! tracing::debug!("session started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter used when no explicit level is given (e.g. `dbgscout_core::registry=trace`)
//! - `DBGSCOUT_LOG_FORMAT`: `pretty` (default) or `json`
//! - `DBGSCOUT_LOG_FILE`: extra log file for [`init_logging`]

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::{NaiveDate, Utc};
use tracing::Level;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "DBGSCOUT_LOG_FORMAT";

/// Environment variable naming an additional log file
pub const LOG_FILE_ENV: &str = "DBGSCOUT_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Human-readable lines
    Pretty,
    /// One JSON object per event, with span context
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s}. Use 'pretty' or 'json'"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    /// Includes every candidate path the resolver tries
    Trace,
}

impl LogLevel
{
    pub fn as_str(self) -> &'static str
    {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            ))),
        }
    }
}

/// Log to stderr, and to `DBGSCOUT_LOG_FILE` when it is set
///
/// An explicit `level` overrides `RUST_LOG`; without either, `info` applies.
///
/// ## Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: Option<LogLevel>) -> Result<(), LoggingError>
{
    let format = format_from_env();
    let mut layers = vec![format_layer(format, io::stderr, true)];
    if let Some(path) = env::var_os(LOG_FILE_ENV).map(PathBuf::from) {
        let (dir, name) = split_log_path(&path);
        layers.push(format_layer(format, detached(rolling::daily(dir, name)), false));
    }
    install(level_filter(level), layers)
}

/// Log only to `<dir>/YYYY-MM-DD-dbgscout.log`, creating `dir` if needed
///
/// Returns the path of the log file.
///
/// ## Errors
///
/// Fails if `dir` cannot be created or a global subscriber is already
/// installed.
pub fn init_logging_to_dir(dir: impl Into<PathBuf>, level: Option<LogLevel>) -> Result<PathBuf, LoggingError>
{
    let dir = dir.into();
    std::fs::create_dir_all(&dir)?;
    let name = log_file_name(Utc::now().date_naive());
    let layer = format_layer(format_from_env(), detached(rolling::never(&dir, &name)), false);
    install(level_filter(level), vec![layer])?;
    Ok(dir.join(name))
}

fn format_from_env() -> LogFormat
{
    env::var(LOG_FORMAT_ENV)
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty)
}

fn level_filter(level: Option<LogLevel>) -> EnvFilter
{
    match level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LogLevel::Info.as_str())),
    }
}

fn log_file_name(date: NaiveDate) -> String
{
    format!("{}-dbgscout.log", date.format("%Y-%m-%d"))
}

/// Directory and file name of a log path; a bare name lives in `.`.
fn split_log_path(path: &Path) -> (PathBuf, PathBuf)
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("dbgscout.log"));
    (dir, name)
}

/// Non-blocking writer whose flush thread lives until exit.
fn detached(appender: RollingFileAppender) -> NonBlocking
{
    let (writer, guard) = tracing_appender::non_blocking(appender);
    std::mem::forget(guard);
    writer
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());
    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

fn install(filter: EnvFilter, layers: Vec<BoxedLayer>) -> Result<(), LoggingError>
{
    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// A global subscriber was already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
