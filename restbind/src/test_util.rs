// Copyright 2025 Oxide Computer Company

//! Automated testing facilities.  These are intended for use both by this
//! crate and dependents of this crate.

use crate::body::Body;
use crate::error::ErrorResponseBody;
use crate::logging::ConfigLogging;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use chrono::DateTime;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use slog::Logger;
use std::fmt::Debug;
use std::path::Path;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

/// A logger for one test.
///
/// A `file` configuration must name the path `"UNUSED"`.  Each test then
/// logs to its own file in the temporary directory, which stays behind
/// unless the test calls [`LogContext::cleanup_successful`].
pub struct LogContext {
    pub log: Logger,
    log_path: Option<Utf8PathBuf>,
}

impl LogContext {
    pub fn new(test_name: &str, config: &ConfigLogging) -> LogContext {
        let config = match config {
            ConfigLogging::File { level, path, if_exists } => {
                assert_eq!(
                    path, "UNUSED",
                    "test log files are chosen per test; configure them with \
                     path = \"UNUSED\""
                );
                ConfigLogging::File {
                    level: level.clone(),
                    path: log_file_for_test(test_name),
                    if_exists: if_exists.clone(),
                }
            }
            other => other.clone(),
        };
        let log_path = match &config {
            ConfigLogging::File { path, .. } => {
                eprintln!("log file: {}", path);
                Some(path.clone())
            }
            _ => None,
        };
        let log = config.to_logger(test_name).unwrap_or_else(|error| {
            panic!("test {}: unable to build logger: {}", test_name, error)
        });
        LogContext { log, log_path }
    }

    /// The file this test logs to, if it logs to one.
    pub fn log_path(&self) -> Option<&Utf8Path> {
        self.log_path.as_deref()
    }

    /// Deletes the log file of a test that passed.
    pub fn cleanup_successful(self) {
        if let Some(path) = self.log_path {
            std::fs::remove_file(&path).unwrap_or_else(|error| {
                panic!("removing {}: {}", path, error)
            });
        }
    }
}

static NEXT_LOG_ID: AtomicU32 = AtomicU32::new(0);

/// A log file path in the temporary directory, unique to this process and
/// call, that names the test binary and `test_name`.
pub fn log_file_for_test(test_name: &str) -> Utf8PathBuf {
    let program = std::env::current_exe()
        .ok()
        .and_then(|exe| {
            exe.file_stem().map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| String::from("restbind"));
    let dir = Utf8PathBuf::try_from(std::env::temp_dir())
        .expect("temporary directory path is not UTF-8");
    let id = NEXT_LOG_ID.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(
        "{}-{}.{}.{}.log",
        program,
        test_name,
        std::process::id(),
        id
    ))
}

/// Parses TOML `contents` as a `T`, echoing the outcome under `label` so a
/// failing config test shows what was read.
pub fn read_config<T: DeserializeOwned + Debug>(
    label: &str,
    contents: &str,
) -> Result<T, toml::de::Error> {
    let parsed = toml::from_str(contents);
    eprintln!("config \"{}\": {:?}", label, parsed);
    parsed
}

/// One line of a Bunyan log.  Key-value pairs beyond the standard fields,
/// such as a request's `req_id`, land in `fields`.
#[derive(Debug, Deserialize)]
pub struct BunyanLogRecord {
    pub time: DateTime<Utc>,
    pub name: String,
    pub hostname: String,
    pub pid: u32,
    pub level: u32,
    pub msg: String,
    pub v: usize,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Reads every record of the Bunyan log at `path`.
pub fn read_bunyan_log<P: AsRef<Path>>(path: P) -> Vec<BunyanLogRecord> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).unwrap_or_else(|error| {
        panic!("reading {}: {}", path.display(), error)
    });
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|error| {
                panic!("bad bunyan record {:?}: {}", line, error)
            })
        })
        .collect()
}

/// Builds a request with no body.
pub fn empty_request(
    method: http::Method,
    uri: &str,
) -> http::Request<Body> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Reads a whole response body.
pub async fn read_body(response: http::Response<Body>) -> bytes::Bytes {
    response.into_body().collect_limited(usize::MAX).await.unwrap()
}

/// Reads a response body as JSON of type `T`.
pub async fn read_json<T: DeserializeOwned>(
    response: http::Response<Body>,
) -> T {
    let body = read_body(response).await;
    serde_json::from_slice(&body).unwrap_or_else(|error| {
        panic!(
            "failed to parse response body as JSON: {}: {:?}",
            error,
            String::from_utf8_lossy(&body)
        )
    })
}

/// Reads the body of an error response, checking its status first.
pub async fn read_error(
    response: http::Response<Body>,
    expected_status: http::StatusCode,
) -> ErrorResponseBody {
    assert_eq!(response.status(), expected_status);
    assert!(response
        .headers()
        .contains_key(crate::http_util::HEADER_REQUEST_ID));
    read_json(response).await
}
