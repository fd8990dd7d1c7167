use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::protocol::DEFAULT_TELEMETRY_PORT;

pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 2;

/// Root configuration structure. Deserialized from
/// %APPDATA%\LuaSTGMonitor\config.toml.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Session defaults. Command-line arguments override all of these.
#[derive(Debug, Deserialize)]
pub struct MonitorConfig {
    /// UDP port the telemetry receiver binds and the target is pointed at.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between OS performance-counter samples.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,
    /// Default target executable, so a plain `lstg-monitor` launch works.
    pub target: Option<String>,
    /// Working directory for the target. Defaults to the executable's
    /// containing directory when unset.
    pub working_dir: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TELEMETRY_PORT,
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            target: None,
            working_dir: None,
        }
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file
/// does not exist. Returns an error if the file exists but cannot be read or
/// parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_port() -> u16 {
    DEFAULT_TELEMETRY_PORT
}

fn default_sample_interval() -> u64 {
    DEFAULT_SAMPLE_INTERVAL_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn default_config_uses_standard_port_and_interval() {
        let c = Config::default();
        assert_eq!(c.monitor.port, DEFAULT_TELEMETRY_PORT);
        assert_eq!(c.monitor.sample_interval_secs, DEFAULT_SAMPLE_INTERVAL_SECS);
        assert!(c.monitor.target.is_none());
        assert!(c.monitor.working_dir.is_none());
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.monitor.port, DEFAULT_TELEMETRY_PORT);
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[monitor]
port = 4000
sample_interval_secs = 5
target = "C:\\Games\\LuaSTGPlus.dev.exe"
working_dir = "C:\\Games"
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.monitor.port, 4000);
        assert_eq!(config.monitor.sample_interval_secs, 5);
        assert_eq!(
            config.monitor.target.as_deref(),
            Some("C:\\Games\\LuaSTGPlus.dev.exe")
        );
        assert_eq!(config.monitor.working_dir.as_deref(), Some("C:\\Games"));
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[monitor]\nport = 9000\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.monitor.port, 9000);
        assert_eq!(config.monitor.sample_interval_secs, DEFAULT_SAMPLE_INTERVAL_SECS);
        assert!(config.monitor.target.is_none());
    }

    #[test]
    fn load_or_default_empty_file_is_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.monitor.port, DEFAULT_TELEMETRY_PORT);
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
