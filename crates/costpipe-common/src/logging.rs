//! Logging Configuration and Initialization
//!
//! Every Costpipe binary logs through `tracing`. This module builds the global
//! subscriber from a [`LogConfig`] and, for pipeline runs, adds the
//! [`RunLogFile`] sink: a plain-text copy of every event written to a local file
//! that the runner uploads as the audit record of the run.
//!
//! Supported settings:
//!
//! - Multiple output targets (console, file, both)
//! - Multiple log formats (text, JSON)
//! - Configurable log levels and extra filter directives
//! - Daily rotation for the application log file
//! - Environment-based configuration (`LOG_*`)
//!
//! # Conventions
//!
//! 1. **Never use `println!`, `eprintln!`, or `dbg!` in library code**; use
//!    `trace!`, `debug!`, `info!`, `warn!`, `error!`.
//! 2. **Use structured fields**:
//!    ```rust,ignore
//!    info!(object = %name, bytes = size, "Downloaded report");
//!    warn!(error = %err, path = %path.display(), "Failed to remove file");
//!    ```
//! 3. **Instrument collaborator calls** with `#[instrument(skip(self))]`.
//!
//! # Example
//!
//! ```no_run
//! use costpipe_common::logging::{init_logging_with_run_log, LogConfig, RunLogFile};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//!     let run_log = RunLogFile::for_date("./logs", date);
//!     init_logging_with_run_log(&LogConfig::from_env()?, Some(&run_log))?;
//!
//!     info!("Pipeline started");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{Level, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Type-erased layer so console, file and run-log sinks can be combined freely
pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very detailed trace-level logging
    Trace,
    /// Debug-level logging for development
    Debug,
    /// Informational messages
    #[default]
    Info,
    /// Warning messages
    Warn,
    /// Error messages
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(anyhow::anyhow!("Invalid log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_tracing_level().as_str().to_lowercase())
    }
}

/// Output target for logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Output to console only
    #[default]
    Console,
    /// Output to a daily rotated file only
    File,
    /// Output to both console and file
    Both,
}

impl LogOutput {
    fn includes_console(&self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn includes_file(&self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl std::str::FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(anyhow::anyhow!("Invalid log output: {}", s)),
        }
    }
}

impl std::fmt::Display for LogOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogOutput::Console => "console",
            LogOutput::File => "file",
            LogOutput::Both => "both",
        })
    }
}

/// Log format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,

    /// Output target (console, file, or both)
    pub output: LogOutput,

    /// Log format (text or JSON)
    pub format: LogFormat,

    /// Directory for rotated application log files
    pub log_dir: PathBuf,

    /// Log file name prefix (e.g., "costpipe" -> "costpipe.2024-01-18")
    pub log_file_prefix: String,

    /// Additional filter directives (e.g., "reqwest=warn,aws_smithy_runtime=info")
    pub filter_directives: Option<String>,

    /// Whether to include file and line number in logs
    pub include_location: bool,

    /// Whether to include thread IDs in logs
    pub include_thread_ids: bool,

    /// Whether to include target module names in logs
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "costpipe".to_string(),
            filter_directives: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `LOG_LEVEL`: Log level (trace, debug, info, warn, error)
    /// - `LOG_OUTPUT`: Output target (console, file, both)
    /// - `LOG_FORMAT`: Log format (text, json)
    /// - `LOG_DIR`: Directory for rotated log files
    /// - `LOG_FILE_PREFIX`: Prefix for rotated log files
    /// - `LOG_FILTER`: Additional filter directives
    /// - `LOG_INCLUDE_LOCATION`: Include file/line in logs (true/false)
    /// - `LOG_INCLUDE_THREAD_IDS`: Include thread IDs (true/false)
    /// - `LOG_INCLUDE_TARGETS`: Include module targets (true/false)
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay `LOG_*` environment variables on top of this configuration
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.level = level.parse()?;
        }

        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.output = output.parse()?;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.format = format.parse()?;
        }

        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }

        if let Ok(prefix) = std::env::var("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }

        if let Ok(filter) = std::env::var("LOG_FILTER") {
            self.filter_directives = Some(filter);
        }

        if let Ok(val) = std::env::var("LOG_INCLUDE_LOCATION") {
            self.include_location = val.parse().unwrap_or(false);
        }

        if let Ok(val) = std::env::var("LOG_INCLUDE_THREAD_IDS") {
            self.include_thread_ids = val.parse().unwrap_or(false);
        }

        if let Ok(val) = std::env::var("LOG_INCLUDE_TARGETS") {
            self.include_targets = val.parse().unwrap_or(true);
        }

        Ok(self)
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }
}

/// Builder for LogConfig
#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Local audit log of a single pipeline run.
///
/// The file is named after the run's target date, written without ANSI colours
/// and appended to synchronously, so its content is complete on disk at the
/// moment the runner uploads it.
#[derive(Debug, Clone)]
pub struct RunLogFile {
    dir: PathBuf,
    stem: String,
}

impl RunLogFile {
    /// Extension of run log files
    pub const EXTENSION: &'static str = "log";

    /// Run log for `target_date` inside `dir` (`costpipe_2024-03-01.log`)
    pub fn for_date(dir: impl Into<PathBuf>, target_date: NaiveDate) -> Self {
        Self {
            dir: dir.into(),
            stem: format!("costpipe_{}", target_date.format("%Y-%m-%d")),
        }
    }

    /// File name, also used as the remote object basename
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, Self::EXTENSION)
    }

    /// Absolute or relative local path of the log file
    pub fn path(&self) -> PathBuf {
        self.dir.join(self.file_name())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Build the subscriber layer that writes every event to this file.
    pub fn layer<S>(&self) -> Result<BoxedLayer<S>>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create run log directory {}", self.dir.display())
        })?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(&self.stem)
            .filename_suffix(Self::EXTENSION)
            .build(&self.dir)
            .context("Failed to open run log file")?;

        Ok(fmt::layer()
            .with_writer(appender)
            .with_ansi(false)
            .with_target(false)
            .boxed())
    }

    /// Remove the local copy (after it has been uploaded)
    pub fn remove(&self) -> std::io::Result<()> {
        std::fs::remove_file(self.path())
    }
}

/// Initialize logging with the given configuration
///
/// This sets up the global tracing subscriber. It should only be called once
/// at application startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    init_logging_with_run_log(config, None)
}

/// Initialize logging, duplicating every event into `run_log` when given.
pub fn init_logging_with_run_log(config: &LogConfig, run_log: Option<&RunLogFile>) -> Result<()> {
    let filter = build_filter(config)?;

    let mut layers: Vec<BoxedLayer<Registry>> = Vec::new();

    if config.output.includes_console() {
        layers.push(console_layer(config));
    }

    if config.output.includes_file() {
        layers.push(rotating_file_layer(config)?);
    }

    if let Some(run_log) = run_log {
        layers.push(run_log.layer()?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(())
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(config.level.to_tracing_level().into());

    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
            filter = filter.add_directive(
                directive
                    .trim()
                    .parse()
                    .context("Failed to parse filter directive")?,
            );
        }
    }

    Ok(filter)
}

/// Console and rotated-file sinks share everything but the writer.
fn formatted_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer<Registry>
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn console_layer(config: &LogConfig) -> BoxedLayer<Registry> {
    formatted_layer(config, std::io::stdout, true)
}

fn rotating_file_layer(config: &LogConfig) -> Result<BoxedLayer<Registry>> {
    std::fs::create_dir_all(&config.log_dir).with_context(|| {
        format!("Failed to create log directory {}", config.log_dir.display())
    })?;

    let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);

    // The worker guard must outlive the process or buffered lines are dropped
    let (writer, guard) = tracing_appender::non_blocking(appender);
    std::mem::forget(guard);

    Ok(formatted_layer(config, writer, false))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("Info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("ERROR".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("invalid".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_output_from_str() {
        assert_eq!("console".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert_eq!("file".parse::<LogOutput>().unwrap(), LogOutput::File);
        assert_eq!("both".parse::<LogOutput>().unwrap(), LogOutput::Both);
        assert!("invalid".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::File)
            .format(LogFormat::Json)
            .log_dir("/var/log/costpipe")
            .log_file_prefix("test")
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/costpipe"));
        assert_eq!(config.log_file_prefix, "test");
    }

    #[test]
    fn test_run_log_file_naming() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let run_log = RunLogFile::for_date("/tmp/costpipe-logs", date);

        assert_eq!(run_log.file_name(), "costpipe_2024-03-01.log");
        assert_eq!(run_log.path(), PathBuf::from("/tmp/costpipe-logs/costpipe_2024-03-01.log"));
    }

    #[test]
    fn test_run_log_layer_captures_events() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let run_log = RunLogFile::for_date(dir.path(), date);

        let subscriber = tracing_subscriber::registry().with(run_log.layer().unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(object = "a.csv", "Staged report");
        });

        let content = std::fs::read_to_string(run_log.path()).unwrap();
        assert!(content.contains("Staged report"));
        assert!(content.contains("a.csv"));
        // No ANSI escape sequences in the audit file
        assert!(!content.contains('\u{1b}'));
    }
}
