// Copyright 2025 Oxide Computer Company

//! Logger construction for services that embed restbind.
//!
//! Operations log through the `Logger` passed to
//! [`ApiDescription::handle`](crate::ApiDescription::handle).  Each request
//! gets a child of that logger carrying the request id, method, URI and
//! operation id, so every record about one request can be found together.
//! [`ConfigLogging`] builds the root logger from a block of TOML.

use camino::Utf8Path;
use camino::Utf8PathBuf;
use http::Method;
use http::Uri;
use serde::Deserialize;
use serde::Serialize;
use slog::Drain;
use slog::Level;
use slog::Logger;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::LineWriter;
use std::io::Write;

/// Records buffered by the async drain before callers start to block.
const ASYNC_CHANNEL_SIZE: usize = 1024;

/// Where a service's log goes, selected by the `mode` key:
///
/// ```toml
/// [log]
/// mode = "file"
/// level = "info"
/// path = "/var/log/restbind.log"
/// if_exists = "append"
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ConfigLogging {
    /// Human-readable records on stderr, colored when it's a terminal.
    StderrTerminal { level: ConfigLoggingLevel },
    /// One Bunyan JSON record per line, written to `path`.
    File {
        level: ConfigLoggingLevel,
        path: Utf8PathBuf,
        if_exists: ConfigLoggingIfExists,
    },
    /// Drop every record.
    Discard,
}

/// Minimum severity of records that are kept.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl ConfigLoggingLevel {
    fn slog_level(&self) -> Level {
        match self {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

/// What to do when the configured log file is already there.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingIfExists {
    Fail,
    Truncate,
    Append,
}

impl ConfigLoggingIfExists {
    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.write(true);
        match self {
            ConfigLoggingIfExists::Fail => options.create_new(true),
            ConfigLoggingIfExists::Truncate => {
                options.create(true).truncate(true)
            }
            ConfigLoggingIfExists::Append => options.create(true).append(true),
        };
        options
    }
}

impl ConfigLogging {
    /// The configured level, or `None` when records are discarded.
    pub fn level(&self) -> Option<&ConfigLoggingLevel> {
        match self {
            ConfigLogging::StderrTerminal { level }
            | ConfigLogging::File { level, .. } => Some(level),
            ConfigLogging::Discard => None,
        }
    }

    /// Builds the root logger.  `log_name` becomes the Bunyan `name` of
    /// file records and is ignored by the other modes.
    pub fn to_logger<S: AsRef<str>>(
        &self,
        log_name: S,
    ) -> Result<Logger, io::Error> {
        let level = match self.level() {
            Some(level) => level.slog_level(),
            None => return Ok(Logger::root(slog::Discard, o!())),
        };

        match self {
            ConfigLogging::File { path, if_exists, .. } => {
                let drain =
                    bunyan_file_drain(path, if_exists, log_name.as_ref())?;
                let log = leveled_async_logger(level, drain);

                // Tell whoever is watching stderr where to look.
                if let Err(err) =
                    writeln!(io::stderr(), "note: logging to \"{}\"", path)
                {
                    warn!(log, "unable to announce log file on stderr";
                        "err" => %err);
                }
                Ok(log)
            }
            _ => {
                let decorator = slog_term::TermDecorator::new().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                Ok(leveled_async_logger(level, drain))
            }
        }
    }
}

/// Child logger for one request dispatched to `operation_id`.
pub(crate) fn request_logger(
    log: &Logger,
    request_id: &str,
    method: &Method,
    uri: &Uri,
    operation_id: &str,
) -> Logger {
    log.new(o!(
        "req_id" => request_id.to_string(),
        "method" => method.as_str().to_string(),
        "uri" => uri.to_string(),
        "operation_id" => operation_id.to_string(),
    ))
}

fn leveled_async_logger<D>(level: Level, drain: D) -> Logger
where
    D: Drain + Send + 'static,
    D::Err: std::fmt::Debug,
{
    let filtered = slog::LevelFilter::new(drain, level).fuse();
    let drain = slog_async::Async::new(filtered)
        .chan_size(ASYNC_CHANNEL_SIZE)
        .build()
        .fuse();
    Logger::root(drain, o!())
}

fn bunyan_file_drain(
    path: &Utf8Path,
    if_exists: &ConfigLoggingIfExists,
    log_name: &str,
) -> Result<slog::Fuse<slog_json::Json<LineWriter<File>>>, io::Error> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = LineWriter::new(if_exists.open_options().open(path)?);

    // slog_bunyan only takes a `&'static str` name.  Root loggers are built
    // once per process (or per test), so the leak is bounded.
    let name: &'static str = Box::leak(log_name.to_string().into_boxed_str());
    Ok(slog_bunyan::with_name(name, file).build().fuse())
}
