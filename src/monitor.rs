/// Monitor loop: poll the channel page, record while live, cool down, repeat.
///
/// A single task drives every step in sequence, so at most one detection,
/// notification or capture is ever in flight. Recording awaits the capture
/// tool's exit inside `step`; nothing polls the page while it runs.
///
/// There is no retry cap and no backoff growth: every failure waits the normal
/// poll interval and starts over from `Polling`.
use crate::capture::{CaptureOutcome, Recorder};
use crate::channel::Channel;
use crate::detector::heuristic::LiveStatus;
use crate::detector::LiveDetector;
use crate::notifier::{live_message, Notifier};
use crate::signals::Shutdown;
use crate::status::StatusTracker;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Fixed pause after a recording ends, independent of the poll interval.
pub const COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Polling,
    Notifying,
    Recording,
    Cooldown,
    ErrorBackoff,
    Terminated,
}

/// Counters accumulated over a monitor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub checks: u64,
    pub live_detections: u64,
    pub recordings_completed: u64,
    pub recordings_failed: u64,
    pub faults: u64,
}

pub struct Monitor<D, N, R> {
    channel: Channel,
    check_interval: Duration,
    detector: D,
    notifier: N,
    recorder: R,
    shutdown: Shutdown,
    status: Option<StatusTracker>,
    last_fault: Option<String>,
    stats: MonitorStats,
}

impl<D, N, R> Monitor<D, N, R>
where
    D: LiveDetector,
    N: Notifier,
    R: Recorder,
{
    pub fn new(
        channel: Channel,
        check_interval: Duration,
        detector: D,
        notifier: N,
        recorder: R,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            channel,
            check_interval,
            detector,
            notifier,
            recorder,
            shutdown,
            status: None,
            last_fault: None,
            stats: MonitorStats::default(),
        }
    }

    /// Write every transition to a status file.
    pub fn with_status(mut self, tracker: StatusTracker) -> Self {
        self.status = Some(tracker);
        self
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Run until shutdown is requested.
    pub async fn run(&mut self) -> MonitorStats {
        let mut state = MonitorState::Polling;
        loop {
            if let Some(status) = &self.status {
                status.update(state, &self.stats);
            }
            if state == MonitorState::Terminated {
                break;
            }
            state = self.guarded_step(state).await;
        }
        tracing::info!(stats = ?self.stats, "monitor stopped");
        self.stats.clone()
    }

    /// Run one step, converting a panic anywhere in it into `ErrorBackoff`.
    async fn guarded_step(&mut self, state: MonitorState) -> MonitorState {
        match AssertUnwindSafe(self.step(state)).catch_unwind().await {
            Ok(next) => next,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.fault(format!("unexpected error: {message}"));
                MonitorState::ErrorBackoff
            }
        }
    }

    /// Perform the work of `state` and return the next state.
    pub async fn step(&mut self, state: MonitorState) -> MonitorState {
        if self.shutdown.is_requested() {
            return MonitorState::Terminated;
        }

        match state {
            MonitorState::Polling => self.poll().await,
            MonitorState::Notifying => {
                let message = live_message(&self.channel);
                self.notifier.notify_live(&self.channel, &message).await;
                MonitorState::Recording
            }
            MonitorState::Recording => self.record().await,
            MonitorState::Cooldown => {
                tracing::info!(
                    cooldown_secs = COOLDOWN.as_secs(),
                    "recording ended, waiting before next check"
                );
                self.sleep(COOLDOWN).await
            }
            MonitorState::ErrorBackoff => {
                tracing::error!(
                    error = self.last_fault.as_deref().unwrap_or("unknown"),
                    retry_secs = self.check_interval.as_secs(),
                    "monitor step failed, retrying"
                );
                self.sleep(self.check_interval).await
            }
            MonitorState::Terminated => MonitorState::Terminated,
        }
    }

    async fn poll(&mut self) -> MonitorState {
        tracing::info!(channel = %self.channel, "checking if channel is live");
        self.stats.checks += 1;

        match self.detector.detect(&self.channel).await {
            Ok(LiveStatus::Live) => {
                self.stats.live_detections += 1;
                self.set_checked(LiveStatus::Live);
                tracing::info!(channel = %self.channel, "channel is LIVE, starting recording");
                MonitorState::Notifying
            }
            Ok(LiveStatus::Offline) => {
                self.set_checked(LiveStatus::Offline);
                tracing::info!(
                    channel = %self.channel,
                    retry_secs = self.check_interval.as_secs(),
                    "channel is not live"
                );
                self.sleep(self.check_interval).await
            }
            Err(fault) => {
                self.fault(fault.to_string());
                MonitorState::ErrorBackoff
            }
        }
    }

    async fn record(&mut self) -> MonitorState {
        if let Some(status) = &mut self.status {
            status.set_recording_started();
            status.update(MonitorState::Recording, &self.stats);
        }

        match self.recorder.capture(&self.channel).await {
            Ok(outcome) => {
                let success = matches!(outcome, CaptureOutcome::Success { .. });
                if success {
                    self.stats.recordings_completed += 1;
                } else {
                    self.stats.recordings_failed += 1;
                }
                if let Some(status) = &mut self.status {
                    status.set_recording_finished(outcome.output());
                }
                MonitorState::Cooldown
            }
            Err(e) => {
                self.fault(e.to_string());
                MonitorState::ErrorBackoff
            }
        }
    }

    /// Sleep, unless shutdown is requested first.
    async fn sleep(&self, duration: Duration) -> MonitorState {
        tokio::select! {
            _ = tokio::time::sleep(duration) => MonitorState::Polling,
            _ = self.shutdown.requested() => MonitorState::Terminated,
        }
    }

    fn set_checked(&mut self, status: LiveStatus) {
        if let Some(tracker) = &mut self.status {
            tracker.set_checked(status);
        }
    }

    fn fault(&mut self, message: String) {
        self.stats.faults += 1;
        if let Some(status) = &mut self.status {
            status.set_last_error(&message);
        }
        self.last_fault = Some(message);
    }
}
