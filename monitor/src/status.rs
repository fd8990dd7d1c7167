use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime status written by the monitor to
/// %APPDATA%\LuaSTGMonitor\status.toml after every counter sample.
/// The GUI front end reads this file (read-only) to display session state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorStatus {
    /// Monitor binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Lifecycle state of the target: "idle", "starting", "running", "exited".
    pub state: String,
    /// Path of the monitored executable, if a session was started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Pid of the live target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Wall-clock lifetime of the target in whole seconds.
    pub lifetime_secs: u64,
    /// Latest telemetry sample.
    pub fps: f32,
    pub objects: f32,
    pub frame_time: f32,
    pub render_time: f32,
    /// Latest OS counter sample, present while the target is alive.
    /// `working_set` is the full resident/working set in bytes, shared pages
    /// included; it is not the private working set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_set: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    /// Exit code once the target has exited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl MonitorStatus {
    /// Constructs the initial idle status on monitor startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: "idle".to_string(),
            target: None,
            pid: None,
            lifetime_secs: 0,
            fps: 0.0,
            objects: 0.0,
            frame_time: 0.0,
            render_time: 0.0,
            working_set: None,
            cpu_percent: None,
            exit_code: None,
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors to stderr rather than failing — a status write failure should
/// never end a monitoring session.
pub fn write_status(path: &Path, status: &MonitorStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("[status] Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                eprintln!("[status] Failed to write status file: {e}");
            }
        }
        Err(e) => eprintln!("[status] Failed to serialize status: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── MonitorStatus::new ────────────────────────────────────────────────────

    #[test]
    fn new_starts_idle_with_zeroed_telemetry() {
        let s = MonitorStatus::new();
        assert_eq!(s.state, "idle");
        assert_eq!(s.fps, 0.0);
        assert_eq!(s.lifetime_secs, 0);
        assert!(s.target.is_none());
        assert!(s.pid.is_none());
        assert!(s.exit_code.is_none());
    }

    #[test]
    fn new_version_matches_cargo_pkg() {
        let s = MonitorStatus::new();
        assert_eq!(s.version, env!("CARGO_PKG_VERSION"));
    }

    // ── write_status ──────────────────────────────────────────────────────────

    #[test]
    fn write_status_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        write_status(&path, &MonitorStatus::new());
        assert!(path.exists());
    }

    #[test]
    fn write_status_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("status.toml");
        write_status(&path, &MonitorStatus::new());
        assert!(path.exists());
    }

    #[test]
    fn write_status_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");

        let mut original = MonitorStatus::new();
        original.state = "running".to_string();
        original.target = Some(r"C:\Games\LuaSTGPlus.dev.exe".to_string());
        original.pid = Some(4242);
        original.fps = 60.0;

        write_status(&path, &original);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: MonitorStatus = toml::from_str(&content).unwrap();
        assert_eq!(parsed.state, "running");
        assert_eq!(parsed.pid, Some(4242));
        assert_eq!(parsed.fps, 60.0);
    }

    #[test]
    fn write_status_omits_none_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        write_status(&path, &MonitorStatus::new());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("target"));
        assert!(!content.contains("pid"));
        assert!(!content.contains("working_set"));
        assert!(!content.contains("exit_code"));
    }
}
