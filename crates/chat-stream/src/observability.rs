use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::parse_bool;

const ENABLED_KEYS: [&str; 2] = [
    "CHAT_STREAM_OBSERVABILITY_ENABLED",
    "CHAT_STREAM_OBSERVABILITY",
];
const LEVEL_KEY: &str = "CHAT_STREAM_LOG_LEVEL";
const JSON_PATH_KEY: &str = "CHAT_STREAM_JSON_LOG_PATH";
const DEFAULT_LOG_FILE: &str = "chat-stream.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// Where diagnostics go.
#[derive(Debug, PartialEq, Eq)]
enum LogSink {
    Disabled,
    /// Compact lines on stderr; stdout carries the streamed answer.
    Stderr,
    JsonFile { dir: PathBuf, file_name: String },
}

fn resolve_sink(lookup: impl Fn(&str) -> Option<String>) -> LogSink {
    let enabled = ENABLED_KEYS
        .iter()
        .find_map(|key| lookup(key))
        .map(|value| parse_bool(&value).unwrap_or(true))
        .unwrap_or(true);
    if !enabled {
        return LogSink::Disabled;
    }

    let Some(raw) = lookup(JSON_PATH_KEY).filter(|p| !p.trim().is_empty()) else {
        return LogSink::Stderr;
    };
    let path = PathBuf::from(raw.trim());
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    LogSink::JsonFile { dir, file_name }
}

fn resolve_filter(lookup: impl Fn(&str) -> Option<String>, default_level: &str) -> EnvFilter {
    [LEVEL_KEY, EnvFilter::DEFAULT_ENV]
        .iter()
        .filter_map(|key| lookup(key))
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Installs the process-wide `tracing` subscriber once; later calls are no-ops.
///
/// The library itself never calls this. Frame skips, state transitions and
/// transport failures are logged through `tracing` and only show up once a
/// host installs a subscriber, here or its own.
///
/// - `CHAT_STREAM_OBSERVABILITY_ENABLED` (or `CHAT_STREAM_OBSERVABILITY`) set to
///   a false word turns logging off.
/// - `CHAT_STREAM_LOG_LEVEL`, then `RUST_LOG`, select the filter; otherwise
///   `default_level` applies.
/// - `CHAT_STREAM_JSON_LOG_PATH` sends JSONL records to that file instead of stderr.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        let filter = resolve_filter(env_lookup, default_level);
        match resolve_sink(env_lookup) {
            LogSink::Disabled => {}
            LogSink::Stderr => {
                let console = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console)
                    .try_init();
            }
            LogSink::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(&dir, file_name);
                let json = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json)
                    .try_init();
            }
        }
    });
}
