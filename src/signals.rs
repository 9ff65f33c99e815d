/// Signal handling for graceful shutdown.
///
/// SIGINT (Ctrl-C) and SIGTERM both request shutdown. The monitor loop checks
/// the flag between steps and races it against every sleep; a detection or
/// recording already in progress is allowed to finish. A terminal Ctrl-C also
/// reaches the capture tool directly, which ends the recording on its own.
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// Read side of the shutdown flag, held by the monitor loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Write side of the shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

/// Create a connected trigger/flag pair.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// True once shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when shutdown is requested. Never resolves if every trigger is gone.
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|requested| *requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Install SIGINT/SIGTERM handlers and return the shutdown flag they set.
pub fn install() -> std::io::Result<Shutdown> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let (trigger, shutdown) = shutdown_channel();

    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            };
            if *trigger.tx.borrow() {
                tracing::info!(signal = name, "shutdown already in progress");
            } else {
                tracing::info!(
                    signal = name,
                    "shutdown requested, stopping after the current step"
                );
                trigger.trigger();
            }
        }
    });

    Ok(shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flag_starts_clear() {
        let (_trigger, shutdown) = shutdown_channel();
        assert!(!shutdown.is_requested());
    }

    #[test]
    fn test_trigger_sets_flag_for_all_clones() {
        let (trigger, shutdown) = shutdown_channel();
        let other = shutdown.clone();
        trigger.trigger();
        assert!(shutdown.is_requested());
        assert!(other.is_requested());
    }

    #[tokio::test]
    async fn test_requested_resolves_after_trigger() {
        let (trigger, shutdown) = shutdown_channel();
        let waiter = tokio::spawn(async move { shutdown.requested().await });
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("requested() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_requested_resolves_immediately_when_already_set() {
        let (trigger, shutdown) = shutdown_channel();
        trigger.trigger();
        tokio::time::timeout(Duration::from_millis(100), shutdown.requested())
            .await
            .expect("already-set flag should resolve at once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_pends_when_trigger_dropped() {
        let (trigger, shutdown) = shutdown_channel();
        drop(trigger);
        let result = tokio::time::timeout(Duration::from_secs(5), shutdown.requested()).await;
        assert!(result.is_err());
    }
}
