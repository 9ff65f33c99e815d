//! Live detection: render the channel page and decide whether it is live.

pub mod browser;
pub mod heuristic;

use crate::channel::Channel;
use async_trait::async_trait;
use heuristic::{Heuristic, LiveStatus, PageSnapshot};

/// Errors produced while inspecting a channel page.
#[derive(Debug, thiserror::Error)]
pub enum DetectionFault {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("navigation to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("page script evaluation failed: {0}")]
    Evaluation(String),
    /// A fault the detector has no recovery for (e.g. the browser event task panicked).
    #[error("internal detector fault: {0}")]
    Internal(String),
}

impl DetectionFault {
    /// Faults that are read as "offline" rather than escalated.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DetectionFault::Internal(_))
    }
}

/// Source of rendered page snapshots.
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn snapshot(&self, url: &str) -> Result<PageSnapshot, DetectionFault>;
}

/// Anything that can answer "is this channel live right now?".
#[async_trait]
pub trait LiveDetector: Send + Sync {
    async fn detect(&self, channel: &Channel) -> Result<LiveStatus, DetectionFault>;
}

/// Detector combining a page probe with the marker heuristic.
///
/// Recoverable faults are logged and reported as `Offline` so a broken page
/// load is never mistaken for a live stream. Only `DetectionFault::Internal`
/// reaches the caller.
pub struct PageLiveDetector<P> {
    probe: P,
    heuristic: Heuristic,
    host: String,
}

impl<P: PageProbe> PageLiveDetector<P> {
    pub fn new(probe: P, heuristic: Heuristic, host: impl Into<String>) -> Self {
        Self {
            probe,
            heuristic,
            host: host.into(),
        }
    }
}

#[async_trait]
impl<P: PageProbe> LiveDetector for PageLiveDetector<P> {
    async fn detect(&self, channel: &Channel) -> Result<LiveStatus, DetectionFault> {
        let url = channel.page_url(&self.host);
        match self.probe.snapshot(&url).await {
            Ok(page) => {
                let verdict = self.heuristic.classify(&page);
                tracing::debug!(
                    %channel,
                    status = %verdict.status,
                    signal = ?verdict.signal,
                    heuristic_version = self.heuristic.version(),
                    "classified channel page"
                );
                Ok(verdict.status)
            }
            Err(fault) if fault.is_recoverable() => {
                tracing::warn!(%channel, error = %fault, "failed to check stream status");
                Ok(LiveStatus::Offline)
            }
            Err(fault) => Err(fault),
        }
    }
}
