//! Logging initialization
//!
//! Sets up the tracing subscriber from the loaded configuration: stdout by
//! default, a plain or daily-rolling file when one is configured. Must run
//! once, early; the returned guard has to stay alive for the lifetime of
//! the process or buffered log lines are lost.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use crate::config::StaticConfig;

/// Result of logging initialization
pub struct LoggingInitResult {
    /// Keep alive for the duration of the program.
    pub guard: WorkerGuard,
    /// Set when the configured sink failed and stdout took over.
    pub warning: Option<String>,
}

type LogWriter = Box<dyn std::io::Write + Send + Sync>;

/// Pick the sink: rolling file, plain file, or stdout fallback.
fn make_writer(config: &StaticConfig) -> (LogWriter, Option<String>) {
    let log_file = match config.logging.file.as_deref() {
        Some(path) if !path.is_empty() => path,
        _ => return (Box::new(std::io::stdout()), None),
    };

    if config.logging.enable_rotation {
        let path = std::path::Path::new(log_file);
        let dir = path.parent().unwrap_or(std::path::Path::new("."));
        let prefix = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("linkcut.log")
            .trim_end_matches(".log");

        match rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(config.logging.max_backups as usize)
            .build(dir)
        {
            Ok(appender) => (Box::new(appender), None),
            Err(e) => (
                Box::new(std::io::stdout()),
                Some(format!(
                    "Failed to create rolling log appender for '{}': {}. Falling back to stdout.",
                    log_file, e
                )),
            ),
        }
    } else {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
        {
            Ok(file) => (Box::new(file), None),
            Err(e) => (
                Box::new(std::io::stdout()),
                Some(format!(
                    "Failed to open log file '{}': {}. Falling back to stdout.",
                    log_file, e
                )),
            ),
        }
    }
}

/// Initialize the tracing subscriber once, after config load.
pub fn init_logging(config: &StaticConfig) -> LoggingInitResult {
    let (writer, warning) = make_writer(config);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(writer);

    let to_stdout = config.logging.file.as_ref().is_none_or(|f| f.is_empty());
    let filter = tracing_subscriber::EnvFilter::new(config.logging.level.clone());

    let builder = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_ansi(to_stdout);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    LoggingInitResult { guard, warning }
}
