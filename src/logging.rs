use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{Config, LoggingConfig};
use crate::error::ShellError;

/// Overrides the configured level, e.g. `DBLINE_LOG=dbline=trace`.
pub const LOG_ENV: &str = "DBLINE_LOG";

const LOG_FILE_NAME: &str = "debug.log";

/// Noisy dependencies are held at `warn` whatever the base level.
fn build_env_filter(level: &str) -> Result<EnvFilter, ShellError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    let directives = format!("{level},sqlx=warn,reedline=warn");
    EnvFilter::try_new(&directives)
        .map_err(|e| ShellError::Config(format!("Invalid tracing filter '{directives}': {e}")))
}

/// Where the file layer writes: the configured path, else the config directory.
pub fn log_file_path(config: &LoggingConfig) -> Option<PathBuf> {
    if !config.file_path.is_empty() {
        return Some(PathBuf::from(&config.file_path));
    }
    Config::get_config_dir().map(|dir| dir.join(LOG_FILE_NAME))
}

/// Installs the global subscriber. The returned guard flushes the file
/// writer on drop and must outlive the shell.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, ShellError> {
    let level = config.level.to_string();

    let console_layer = if config.console_output {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(build_env_filter(&level)?),
        )
    } else {
        None
    };

    let mut guard = None;
    let file_layer = match log_file_path(config).filter(|_| config.file_output) {
        Some(path) => {
            let (dir, name) = split_path(&path);
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard = Some(worker);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_target(true)
                    .with_filter(build_env_filter(&level)?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ShellError::Config(format!("Cannot install logger: {e}")))?;

    tracing::debug!("[logging::init] Logging initialized at level {}", level);
    Ok(guard)
}

fn split_path(path: &Path) -> (PathBuf, PathBuf) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(LOG_FILE_NAME));
    (dir, name)
}
