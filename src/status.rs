/// Status file: writes `recorder.status` as JSON on every state transition.
///
/// Uses atomic write pattern: write to temp file then rename.
use crate::detector::heuristic::LiveStatus;
use crate::monitor::{MonitorState, MonitorStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The JSON payload written to `recorder.status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub pid: u32,
    pub state: MonitorState,
    pub channel: String,
    pub recorder_name: String,
    pub last_check: Option<DateTime<Utc>>,
    pub last_status: Option<LiveStatus>,
    pub recording_file: Option<String>,
    pub recording_start: Option<DateTime<Utc>>,
    pub recordings_completed: u64,
    pub recordings_failed: u64,
    pub last_error: Option<String>,
    pub last_update: DateTime<Utc>,
}

/// Manages the status file lifecycle.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Hidden sibling of the status file, named after it: `.<name>.tmp.<pid>`.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "status".to_string());
        self.path
            .with_file_name(format!(".{name}.tmp.{}", std::process::id()))
    }

    /// Replace the status file with `data` via write-to-temp and rename, so a
    /// concurrent `--status` never reads a half-written file.
    pub fn write(&self, data: &StatusData) -> Result<(), StatusError> {
        let json =
            serde_json::to_string_pretty(data).map_err(|e| StatusError::Serialize { source: e })?;
        let tmp_path = self.temp_path();

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| StatusError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StatusError::Rename {
            from: tmp_path,
            to: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    /// Remove the status file (on clean shutdown).
    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Read a status file written by a running recorder.
pub fn read(path: &Path) -> Result<serde_json::Value, StatusError> {
    let contents = std::fs::read_to_string(path).map_err(|e| StatusError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&contents).map_err(|e| StatusError::Serialize { source: e })
}

/// Mutable state tracker that builds StatusData for each update.
pub struct StatusTracker {
    file: StatusFile,
    pid: u32,
    channel: String,
    recorder_name: String,
    last_check: Option<DateTime<Utc>>,
    last_status: Option<LiveStatus>,
    recording_file: Option<String>,
    recording_start: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl StatusTracker {
    pub fn new(status_path: PathBuf, channel: &str, recorder_name: &str) -> Self {
        Self {
            file: StatusFile::new(status_path),
            pid: std::process::id(),
            channel: channel.to_string(),
            recorder_name: recorder_name.to_string(),
            last_check: None,
            last_status: None,
            recording_file: None,
            recording_start: None,
            last_error: None,
        }
    }

    /// Write the status file for `state`. Counters come from the monitor's
    /// own stats so the two never disagree.
    pub fn update(&self, state: MonitorState, stats: &MonitorStats) {
        let data = StatusData {
            pid: self.pid,
            state,
            channel: self.channel.clone(),
            recorder_name: self.recorder_name.clone(),
            last_check: self.last_check,
            last_status: self.last_status,
            recording_file: self.recording_file.clone(),
            recording_start: self.recording_start,
            recordings_completed: stats.recordings_completed,
            recordings_failed: stats.recordings_failed,
            last_error: self.last_error.clone(),
            last_update: Utc::now(),
        };

        if let Err(e) = self.file.write(&data) {
            tracing::warn!(error = %e, "failed to write status file");
        }
    }

    /// Record the result of a detection.
    pub fn set_checked(&mut self, status: LiveStatus) {
        self.last_check = Some(Utc::now());
        self.last_status = Some(status);
    }

    pub fn set_recording_started(&mut self) {
        self.recording_start = Some(Utc::now());
    }

    pub fn set_recording_finished(&mut self, output: &Path) {
        self.recording_file = Some(output.display().to_string());
        self.recording_start = None;
    }

    pub fn set_last_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }
}

/// Errors from status file operations.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("failed to serialize status: {source}")]
    Serialize { source: serde_json::Error },
    #[error("failed to read status file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write temp status file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to rename {} -> {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}
