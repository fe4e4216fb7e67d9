use std::path::PathBuf;

pub const PROGRAM_NAME: &str = "sluice";
pub const PROGRAM_LOG_LEVEL: &str = "SLUICE_LOG_LEVEL";
pub const PROGRAM_LOG_FILE: &str = "SLUICE_LOG_FILE";

/// Address the daemon listens on unless `--bind` is given.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9090";
/// Address the client connects to unless `--addr` is given.
pub const DEFAULT_CONNECT_ADDRESS: &str = "127.0.0.1:9090";

pub const SINK_FILE_NAME: &str = "records.jsonl";

pub fn xdg_or_home(xdg_var: &str, home_suffix: &str) -> PathBuf {
    if let Some(dir) = std::env::var_os(xdg_var).filter(|d| !d.is_empty()) {
        PathBuf::from(dir)
    } else {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(home_suffix)
    }
}

/// Per-user data directory for the file sink.
///
/// `XDG_DATA_HOME` wins when set, then the platform data dir, then `~/.local/share`.
pub fn sluice_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_DATA_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join(PROGRAM_NAME);
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| xdg_or_home("XDG_DATA_HOME", ".local/share"))
        .join(PROGRAM_NAME)
}

/// Default location of the append-only file sink.
pub fn default_sink_path() -> PathBuf {
    sluice_data_dir().join(SINK_FILE_NAME)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
