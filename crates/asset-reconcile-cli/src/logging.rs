use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LEVEL: &str = "info";
const DEFAULT_LOG_FILE: &str = "./logs/asset-reconcile.log";
const DEFAULT_FILE_NAME: &str = "asset-reconcile.log";

/// Directory and file name for the file log. A path ending in a separator
/// names a directory that gets the default file name.
fn log_location(path: &str) -> (PathBuf, String) {
    if path.ends_with('/') || path.ends_with('\\') {
        return (PathBuf::from(path), DEFAULT_FILE_NAME.to_string());
    }
    let path = Path::new(path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
    (dir, file)
}

fn open_log_file(dir: &Path, file: &str) -> io::Result<RollingFileAppender> {
    fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file)
        .build(dir)
        .map_err(io::Error::other)
}

/// Console logging plus a plain-text file log. Returns the file writer's
/// guard, or `None` when the file log could not be opened and only the
/// console is logging.
pub fn init_logger() -> Option<WorkerGuard> {
    let level = env::var("TRACING_LEVEL").unwrap_or_else(|_| DEFAULT_LEVEL.to_string());
    let (filter, rejected) = match EnvFilter::try_new(&level) {
        Ok(filter) => (filter, None),
        Err(_) => (EnvFilter::new(DEFAULT_LEVEL), Some(level)),
    };

    let requested = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (dir, file) = log_location(&requested);
    let (file_layer, guard, file_error) = match open_log_file(&dir, &file) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(file_layer)
        .with(filter)
        .init();

    if let Some(level) = rejected {
        warn!("Ignoring invalid TRACING_LEVEL {:?}, using {}", level, DEFAULT_LEVEL);
    }
    match file_error {
        Some(e) => warn!("File logging disabled, cannot open {}: {}", dir.join(&file).display(), e),
        None => info!("Logging to stdout and {}", dir.join(&file).display()),
    }
    guard
}
