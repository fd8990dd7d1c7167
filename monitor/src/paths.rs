/// Canonical file paths for monitor data files.
///
/// Both files live under %APPDATA%\LuaSTGMonitor\:
///   - config.toml  Session defaults, written by the user or the GUI.
///   - status.toml  Live session status, written by the monitor.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "LuaSTGMonitor";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the monitor's application data directory: %APPDATA%\LuaSTGMonitor\
/// on Windows, falling back to $HOME/.LuaSTGMonitor or the temp dir when no
/// profile directory is available (headless dev runs).
pub fn app_data_dir() -> PathBuf {
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata).join(APP_DIR_NAME);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(format!(".{APP_DIR_NAME}"));
    }
    std::env::temp_dir().join(APP_DIR_NAME)
}

/// Returns the full path to the config file.
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file.
pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        let dir = app_data_dir();
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.contains(APP_DIR_NAME), "unexpected dir name {name}");
    }

    #[test]
    fn config_file_path_has_correct_name() {
        let path = config_file_path();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn status_file_path_has_correct_name() {
        let path = status_file_path();
        assert_eq!(path.file_name().unwrap(), STATUS_FILE_NAME);
    }

    #[test]
    fn config_and_status_share_same_parent_dir() {
        let config = config_file_path();
        let status = status_file_path();
        assert_eq!(config.parent(), status.parent());
    }
}
