use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use env_logger::Env;
use log::Level;
use once_cell::sync::OnceCell;

use crate::config::LoggingConfig;

static LOG_FILE: OnceCell<PathBuf> = OnceCell::new();

/// Default log file location (under the user's local data directory)
fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("audiomancer")
        .join("logs")
        .join("audiomancer.log")
}

/// Path of the log file, if file logging was enabled
pub fn log_file_path() -> Option<PathBuf> {
    LOG_FILE.get().cloned()
}

/// One log line, without the trailing newline
pub fn format_line(timestamp: &str, level: Level, target: &str, message: &str) -> String {
    format!("[{}] [{}] [{}] {}", timestamp, level, target, message)
}

fn append_to_file(path: &Path, line: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", line);
    }
}

/// Install the global logger. `RUST_LOG` overrides `config.level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let file_path = if config.file {
        let path = default_log_path();
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        Some(LOG_FILE.get_or_init(|| path).clone())
    } else {
        None
    };

    let result = env_logger::Builder::from_env(Env::default().default_filter_or(&config.level))
        .format(move |buf, record| {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
            let line = format_line(
                &timestamp,
                record.level(),
                record.target(),
                &record.args().to_string(),
            );
            if let Some(path) = &file_path {
                append_to_file(path, &line);
            }
            writeln!(buf, "{}", line)
        })
        .try_init();

    if result.is_ok() {
        log::info!("Audiomancer logging started");
    }
}
