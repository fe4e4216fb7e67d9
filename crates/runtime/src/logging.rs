use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Mutex, OnceLock, PoisonError},
};

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::config::{PROGRAM_LOG_FILE, PROGRAM_LOG_LEVEL};

enum LogTarget {
    Stderr,
    File(Mutex<File>),
}

pub struct Logger {
    level: Level,
    target: LogTarget,
}

impl Logger {
    fn format(record: &Record<'_>) -> String {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let thread = std::thread::current();
        format!(
            "{} {} ({}) [{}] {}",
            timestamp,
            record.level(),
            thread.name().unwrap_or("-"),
            record.target(),
            record.args()
        )
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let msg = Self::format(record);

            match &self.target {
                LogTarget::Stderr => {
                    eprintln!("{msg}")
                }
                LogTarget::File(file) => {
                    let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
                    // Nowhere left to report a failed log write.
                    let _ = writeln!(file, "{msg}");
                }
            }
        }
    }

    fn flush(&self) {
        if let LogTarget::File(file) = &self.target {
            let _ = file.lock().unwrap_or_else(PoisonError::into_inner).flush();
        }
    }
}

fn get_level_from_env(default: Level) -> Level {
    std::env::var(PROGRAM_LOG_LEVEL)
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .and_then(|filter| filter.to_level())
        .unwrap_or(default)
}

fn get_target_from_env() -> LogTarget {
    std::env::var_os(PROGRAM_LOG_FILE)
        .filter(|p| !p.is_empty())
        .and_then(|p| open_log_file(Path::new(&p)))
        .map(|f| LogTarget::File(Mutex::new(f)))
        .unwrap_or(LogTarget::Stderr)
}

fn open_log_file(path: &Path) -> Option<File> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!(
                "cannot open log file {}: {e}; logging to stderr",
                path.display()
            );
            None
        }
    }
}

/// Install the process logger at `warn` unless `SLUICE_LOG_LEVEL` says otherwise.
pub fn init() -> Result<(), SetLoggerError> {
    init_with_default(Level::Warn)
}

/// Install the process logger, using `default` when the env var is unset or invalid.
pub fn init_with_default(default: Level) -> Result<(), SetLoggerError> {
    _init(get_level_from_env(default), get_target_from_env())
}

fn _init(level: Level, target: LogTarget) -> Result<(), SetLoggerError> {
    static LOGGER: OnceLock<Logger> = OnceLock::new();

    // Check whether it is an initial call,
    // since log::set_max_level uses the pass-in `level` value,
    // so in theory, the initial level at get_or_init and max_level
    // can create a mismatch.
    let init_call = LOGGER.get().is_none();

    let logger = LOGGER.get_or_init(|| Logger { level, target });

    if init_call {
        log::set_logger(logger)?;
        log::set_max_level(logger.level.to_level_filter());
    }

    Ok(())
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
