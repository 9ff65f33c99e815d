/// Headless Chrome page probe.
///
/// Every call launches its own browser with a throwaway profile directory, so
/// no cookies or session state leak between polls. The browser is torn down
/// before `snapshot` returns on every path: explicitly via `BrowserSession::close`,
/// or by `Drop` (kill on drop + aborting the CDP handler task) when an early
/// return or timeout skips the explicit close.
use super::heuristic::PageSnapshot;
use super::{DetectionFault, PageProbe};
use crate::config::DetectorConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Script evaluated once the page has settled. Returns the facts the
/// heuristic needs as a plain JSON object.
const SNAPSHOT_SCRIPT: &str = r#"(() => {
    const video = document.querySelector('video');
    return {
        title: document.title || '',
        html: document.documentElement ? document.documentElement.outerHTML : '',
        hasVideo: video !== null,
        videoSource: video ? (video.currentSrc || video.src || null) : null,
    };
})()"#;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const PROFILE_PREFIX: &str = "kick-recorder-profile-";

/// Production `PageProbe` backed by chromiumoxide.
#[derive(Debug, Clone)]
pub struct ChromeProbe {
    user_agent: String,
    navigation_timeout: Duration,
    settle_delay: Duration,
    chrome_executable: Option<PathBuf>,
    no_sandbox: bool,
}

impl ChromeProbe {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            navigation_timeout: config.navigation_timeout(),
            settle_delay: config.settle_delay(),
            chrome_executable: config.chrome_executable.clone(),
            no_sandbox: config.no_sandbox,
        }
    }

    async fn inspect(
        &self,
        session: &BrowserSession,
        url: &str,
    ) -> Result<PageSnapshot, DetectionFault> {
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| DetectionFault::Launch(format!("failed to open page: {e}")))?;

        page.set_user_agent(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(|e| DetectionFault::Navigation {
                url: url.to_string(),
                reason: format!("failed to set user agent: {e}"),
            })?;

        tokio::time::timeout(self.navigation_timeout, navigate(&page, url))
            .await
            .map_err(|_| DetectionFault::Timeout {
                url: url.to_string(),
                secs: self.navigation_timeout.as_secs(),
            })??;

        tracing::debug!(
            url,
            settle_secs = self.settle_delay.as_secs(),
            "waiting for page to render"
        );
        tokio::time::sleep(self.settle_delay).await;

        evaluate::<PageSnapshot>(&page, SNAPSHOT_SCRIPT)
            .await
            .map_err(DetectionFault::Evaluation)
    }
}

/// Evaluate an expression in the page and deserialize its by-value result.
async fn evaluate<T: DeserializeOwned>(page: &Page, expression: &str) -> Result<T, String> {
    let params = EvaluateParams::builder()
        .expression(expression)
        .return_by_value(true)
        .await_promise(true)
        .build()?;
    page.evaluate_expression(params)
        .await
        .map_err(|e| e.to_string())?
        .into_value::<T>()
        .map_err(|e| format!("unexpected script result: {e}"))
}

const LOAD_STATE_SCRIPT: &str =
    "({ href: location.href, readyState: document.readyState })";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadState {
    href: String,
    ready_state: String,
}

impl LoadState {
    /// The new document has replaced `about:blank` and its DOM is built.
    fn dom_ready(&self) -> bool {
        self.href != "about:blank" && self.ready_state != "loading"
    }
}

/// Start navigation and wait for DOM construction only.
///
/// The site keeps background requests open indefinitely, so waiting for the
/// load event or network idle would routinely hit the timeout. `Page.navigate`
/// sent through chromiumoxide resolves only on `load`, so navigation is started
/// from script instead and readiness is polled.
async fn navigate(page: &Page, url: &str) -> Result<(), DetectionFault> {
    let target = serde_json::to_string(url).map_err(|e| DetectionFault::Navigation {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    evaluate::<String>(page, &format!("location.href = {target}"))
        .await
        .map_err(|reason| DetectionFault::Navigation {
            url: url.to_string(),
            reason,
        })?;

    loop {
        // Fails while the old context is torn down; keep polling.
        if let Ok(state) = evaluate::<LoadState>(page, LOAD_STATE_SCRIPT).await {
            if state.href.starts_with("chrome-error:") {
                return Err(DetectionFault::Navigation {
                    url: url.to_string(),
                    reason: "browser showed an error page".to_string(),
                });
            }
            if state.dom_ready() {
                return Ok(());
            }
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

#[async_trait]
impl PageProbe for ChromeProbe {
    async fn snapshot(&self, url: &str) -> Result<PageSnapshot, DetectionFault> {
        let session = BrowserSession::launch(self).await?;
        let result = self.inspect(&session, url).await;
        let closed = session.close().await;
        // An inspection error is more informative than a teardown error.
        let snapshot = result?;
        closed?;
        Ok(snapshot)
    }
}

/// One browser process plus the task driving its CDP connection.
struct BrowserSession {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    _profile: TempDir,
}

impl BrowserSession {
    async fn launch(probe: &ChromeProbe) -> Result<Self, DetectionFault> {
        let profile = tempfile::Builder::new()
            .prefix(PROFILE_PREFIX)
            .tempdir()
            .map_err(|e| DetectionFault::Launch(format!("failed to create profile dir: {e}")))?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .request_timeout(probe.navigation_timeout);
        if let Some(exe) = &probe.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        if probe.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(DetectionFault::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DetectionFault::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler stopped");
                    break;
                }
            }
        });

        tracing::debug!(profile = %profile.path().display(), "browser launched");
        Ok(Self {
            browser,
            handler: Some(handler),
            _profile: profile,
        })
    }

    /// Close the browser and wait for its process and handler task to finish.
    async fn close(mut self) -> Result<(), DetectionFault> {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "browser close command failed, killing process");
            let _ = self.browser.kill().await;
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "failed to reap browser process");
        }

        let Some(handler) = self.handler.take() else {
            return Ok(());
        };
        match handler.await {
            Err(e) if e.is_panic() => Err(DetectionFault::Internal(format!(
                "browser handler task panicked: {e}"
            ))),
            _ => Ok(()),
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(handler) = &self.handler {
            handler.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_probe_takes_settings_from_config() {
        let config = DetectorConfig {
            navigation_timeout_secs: 12,
            settle_delay_secs: 2,
            no_sandbox: true,
            ..DetectorConfig::default()
        };
        let probe = ChromeProbe::new(&config);
        assert_eq!(probe.navigation_timeout, Duration::from_secs(12));
        assert_eq!(probe.settle_delay, Duration::from_secs(2));
        assert!(probe.no_sandbox);
        assert!(probe.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_snapshot_script_reports_expected_fields() {
        for field in ["title:", "html:", "hasVideo:", "videoSource:"] {
            assert!(SNAPSHOT_SCRIPT.contains(field), "missing {field}");
        }
    }

    #[test]
    fn test_load_state_ready_only_after_leaving_blank_page() {
        let state = |href: &str, ready: &str| LoadState {
            href: href.to_string(),
            ready_state: ready.to_string(),
        };
        assert!(!state("about:blank", "complete").dom_ready());
        assert!(!state("https://kick.com/alice", "loading").dom_ready());
        assert!(state("https://kick.com/alice", "interactive").dom_ready());
        assert!(state("https://kick.com/alice", "complete").dom_ready());

        let parsed: LoadState =
            serde_json::from_str(r#"{"href":"about:blank","readyState":"complete"}"#).unwrap();
        assert_eq!(parsed.ready_state, "complete");
    }

    const CHANNEL_PAGE: &str = "<html><head><title>tester | Watch Live</title></head>\
        <body><video></video><img src=\"/stall.png\"></body></html>";

    /// Serves `/channel` at once, never answers `/stall.png` or `/hang`.
    async fn local_site() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 2048];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request).to_string();
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let response = match path.as_str() {
                        "/channel" => format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\n\
                             content-length: {}\r\nconnection: close\r\n\r\n{CHANNEL_PAGE}",
                            CHANNEL_PAGE.len()
                        ),
                        "/stall.png" | "/hang" => {
                            // Hold the connection open without answering.
                            std::future::pending::<()>().await;
                            return;
                        }
                        _ => "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\
                              connection: close\r\n\r\n"
                            .to_string(),
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        base
    }

    fn profile_dirs() -> HashSet<PathBuf> {
        std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(PROFILE_PREFIX))
            })
            .collect()
    }

    #[tokio::test]
    #[ignore = "launches Chrome; set CHROME to the browser binary if it is not on PATH"]
    async fn test_chrome_probe_against_local_site() {
        let base = local_site().await;
        let config = DetectorConfig {
            navigation_timeout_secs: 20,
            settle_delay_secs: 1,
            chrome_executable: std::env::var_os("CHROME").map(PathBuf::from),
            no_sandbox: true,
            ..DetectorConfig::default()
        };
        let before = profile_dirs();

        // A subresource that never finishes must not hold up detection.
        let probe = ChromeProbe::new(&config);
        let start = std::time::Instant::now();
        let snapshot = probe.snapshot(&format!("{base}/channel")).await.unwrap();
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "waited for the load event: {:?}",
            start.elapsed()
        );
        assert!(snapshot.has_video);
        assert!(snapshot.title.contains("Watch Live"));
        assert!(snapshot.html.contains("stall.png"));

        // A page that never arrives is a timeout.
        let probe = ChromeProbe::new(&DetectorConfig {
            navigation_timeout_secs: 2,
            ..config
        });
        let err = probe.snapshot(&format!("{base}/hang")).await.unwrap_err();
        assert!(
            matches!(err, DetectionFault::Timeout { secs: 2, .. }),
            "unexpected fault: {err}"
        );

        // Both sessions removed their throwaway profiles.
        let leaked: Vec<_> = profile_dirs().difference(&before).cloned().collect();
        assert!(leaked.is_empty(), "profiles left behind: {leaked:?}");
    }
}
