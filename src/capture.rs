/// Recording session: run the external capture tool until the broadcast ends.
///
/// The child inherits stdout/stderr so the tool's progress output stays visible,
/// and it stays in our process group so a terminal Ctrl-C reaches it too. We
/// never signal it ourselves; the call returns only when the tool exits.
use crate::channel::Channel;
use crate::config::CaptureConfig;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

/// How a finished capture ended. Both variants mean "resume polling".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Success {
        output: PathBuf,
        duration: Duration,
    },
    Failure {
        exit_code: i32,
        output: PathBuf,
        duration: Duration,
    },
}

impl CaptureOutcome {
    pub fn output(&self) -> &Path {
        match self {
            CaptureOutcome::Success { output, .. } | CaptureOutcome::Failure { output, .. } => {
                output
            }
        }
    }
}

/// Faults that prevent a capture from running at all.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to spawn capture tool '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("failed waiting for capture tool: {source}")]
    Wait { source: std::io::Error },
}

#[async_trait]
pub trait Recorder: Send + Sync {
    async fn capture(&self, channel: &Channel) -> Result<CaptureOutcome, CaptureError>;
}

/// Runs the configured capture command (yt-dlp by default).
#[derive(Debug, Clone)]
pub struct CaptureInvoker {
    command: String,
    args: Vec<String>,
    extension: String,
    media_dir: PathBuf,
    host: String,
}

impl CaptureInvoker {
    pub fn new(
        config: &CaptureConfig,
        media_dir: impl Into<PathBuf>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            extension: config.extension.clone(),
            media_dir: media_dir.into(),
            host: host.into(),
        }
    }

    /// `<media_dir>/<channel>_<YYYY-MM-DD_HH-MM-SS>.<ext>`
    pub fn recording_path(&self, channel: &Channel, started_at: DateTime<Local>) -> PathBuf {
        let filename = format!(
            "{}_{}.{}",
            channel,
            started_at.format("%Y-%m-%d_%H-%M-%S"),
            self.extension
        );
        self.media_dir.join(filename)
    }

    /// Substitute `{url}` and `{output}` placeholders in the argument template.
    fn build_args(&self, url: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{url}", url).replace("{output}", &output))
            .collect()
    }
}

#[async_trait]
impl Recorder for CaptureInvoker {
    async fn capture(&self, channel: &Channel) -> Result<CaptureOutcome, CaptureError> {
        let url = channel.page_url(&self.host);
        let output = self.recording_path(channel, Local::now());
        let args = self.build_args(&url, &output);

        tracing::info!(
            command = %self.command,
            args = ?args,
            output = %output.display(),
            "starting recording"
        );

        let start = Instant::now();
        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CaptureError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        let pid = child.id().unwrap_or(0);
        tracing::info!(pid, %url, "capture tool started");

        // No timeout: a broadcast can run for hours.
        let status = child
            .wait()
            .await
            .map_err(|e| CaptureError::Wait { source: e })?;
        let duration = start.elapsed();

        match exit_code(status) {
            0 => {
                tracing::info!(
                    output = %output.display(),
                    duration_secs = duration.as_secs(),
                    "recording completed successfully"
                );
                Ok(CaptureOutcome::Success { output, duration })
            }
            code => {
                tracing::error!(
                    exit_code = code,
                    signal = signal_name(status),
                    output = %output.display(),
                    duration_secs = duration.as_secs(),
                    "recording failed"
                );
                Ok(CaptureOutcome::Failure {
                    exit_code: code,
                    output,
                    duration,
                })
            }
        }
    }
}

/// Shell-style exit code: death by signal N is reported as 128 + N.
fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

fn signal_name(status: ExitStatus) -> Option<&'static str> {
    status
        .signal()
        .and_then(|sig| nix::sys::signal::Signal::try_from(sig).ok())
        .map(|sig| sig.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn invoker(command: &str, args: &[&str], media_dir: &Path) -> CaptureInvoker {
        let config = CaptureConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            extension: "mp4".to_string(),
        };
        CaptureInvoker::new(&config, media_dir, "kick.com")
    }

    fn channel(name: &str) -> Channel {
        Channel::new(name).unwrap()
    }

    #[test]
    fn test_recording_path_format() {
        let inv = invoker("yt-dlp", &[], Path::new("/data/media"));
        let started = Local.with_ymd_and_hms(2026, 3, 7, 21, 5, 9).unwrap();
        assert_eq!(
            inv.recording_path(&channel("alice"), started),
            PathBuf::from("/data/media/alice_2026-03-07_21-05-09.mp4")
        );
    }

    #[test]
    fn test_recording_paths_differ_per_second() {
        let inv = invoker("yt-dlp", &[], Path::new("media"));
        let a = Local.with_ymd_and_hms(2026, 3, 7, 21, 5, 9).unwrap();
        let b = Local.with_ymd_and_hms(2026, 3, 7, 21, 5, 10).unwrap();
        assert_ne!(
            inv.recording_path(&channel("alice"), a),
            inv.recording_path(&channel("alice"), b)
        );
    }

    #[test]
    fn test_build_args_default_template() {
        let inv = CaptureInvoker::new(&CaptureConfig::default(), "media", "kick.com");
        let args = inv.build_args("https://kick.com/bob", Path::new("media/bob.mp4"));
        assert_eq!(args, vec!["https://kick.com/bob", "-o", "media/bob.mp4"]);
    }

    #[test]
    fn test_build_args_embedded_placeholders() {
        let inv = invoker(
            "streamlink",
            &["--url={url}", "best", "--output={output}"],
            Path::new("m"),
        );
        let args = inv.build_args("https://kick.com/x", Path::new("m/x.ts"));
        assert_eq!(
            args,
            vec!["--url=https://kick.com/x", "best", "--output=m/x.ts"]
        );
    }

    #[tokio::test]
    async fn test_capture_success() {
        let dir = tempdir().unwrap();
        let inv = invoker("sh", &["-c", "touch \"$0\"", "{output}"], dir.path());

        let outcome = inv.capture(&channel("alice")).await.unwrap();
        match &outcome {
            CaptureOutcome::Success { output, .. } => {
                assert!(output.starts_with(dir.path()));
                assert!(output.exists());
                let name = output.file_name().unwrap().to_string_lossy();
                assert!(name.starts_with("alice_"));
                assert!(name.ends_with(".mp4"));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capture_passes_page_url() {
        let dir = tempdir().unwrap();
        let inv = invoker(
            "sh",
            &["-c", "test \"$0\" = https://kick.com/bob", "{url}"],
            dir.path(),
        );
        let outcome = inv.capture(&channel("bob")).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn test_capture_nonzero_exit_is_failure() {
        let dir = tempdir().unwrap();
        let inv = invoker("sh", &["-c", "exit 137"], dir.path());

        let outcome = inv.capture(&channel("dave")).await.unwrap();
        match outcome {
            CaptureOutcome::Failure { exit_code, .. } => assert_eq!(exit_code, 137),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capture_killed_by_signal_reports_128_plus_signal() {
        let dir = tempdir().unwrap();
        let inv = invoker("sh", &["-c", "kill -9 $$"], dir.path());

        let outcome = inv.capture(&channel("dave")).await.unwrap();
        assert!(matches!(
            outcome,
            CaptureOutcome::Failure { exit_code: 137, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_capture_leaves_partial_output() {
        let dir = tempdir().unwrap();
        let inv = invoker(
            "sh",
            &["-c", "echo partial > \"$0\"; exit 1", "{output}"],
            dir.path(),
        );

        let outcome = inv.capture(&channel("erin")).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Failure { exit_code: 1, .. }));
        assert!(outcome.output().exists());
    }

    #[tokio::test]
    async fn test_capture_spawn_failure() {
        let dir = tempdir().unwrap();
        let inv = invoker("nonexistent-capture-tool-xyz", &[], dir.path());

        let err = inv.capture(&channel("x")).await.unwrap_err();
        assert!(matches!(err, CaptureError::Spawn { .. }));
        assert!(err.to_string().contains("failed to spawn"));
    }
}
