/// Discord webhook notification for "channel went live".
///
/// Strictly best-effort: every failure is logged and swallowed so a broken
/// webhook can never delay or prevent a recording.
use crate::channel::Channel;
use crate::config::DiscordConfig;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const EMBED_COLOR: u32 = 0x00ff00;
const FOOTER_TEXT: &str = "Kick Stream Recorder";

/// What happened to a notification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Disabled,
    MissingWebhook,
    Sent,
    Rejected(StatusCode),
    Failed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_live(&self, channel: &Channel, message: &str) -> Delivery;
}

/// Default mention text used when going live.
pub fn live_message(channel: &Channel) -> String {
    format!("@everyone {channel} has gone live!")
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    content: String,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    url: String,
    color: u32,
    timestamp: String,
    footer: Footer,
}

#[derive(Debug, Serialize)]
struct Footer {
    text: String,
}

pub struct DiscordNotifier {
    client: reqwest::Client,
    enabled: bool,
    webhook_url: String,
    recorder_name: String,
    host: String,
}

impl DiscordNotifier {
    pub fn new(
        config: &DiscordConfig,
        recorder_name: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            enabled: config.enabled,
            webhook_url: config.webhook_url.trim().to_string(),
            recorder_name: recorder_name.into(),
            host: host.into(),
        }
    }

    fn payload(&self, channel: &Channel, message: &str) -> WebhookPayload {
        WebhookPayload {
            content: message.to_string(),
            embeds: vec![Embed {
                title: format!("🔴 {channel} is LIVE!"),
                description: format!(
                    "Stream has started on Kick\n\n**Recording on:** 📹 `{}`",
                    self.recorder_name
                ),
                url: channel.page_url(&self.host),
                color: EMBED_COLOR,
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                footer: Footer {
                    text: FOOTER_TEXT.to_string(),
                },
            }],
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify_live(&self, channel: &Channel, message: &str) -> Delivery {
        if !self.enabled {
            tracing::info!("Discord notifications are disabled in config");
            return Delivery::Disabled;
        }
        if self.webhook_url.is_empty() {
            tracing::warn!("Discord enabled but webhook URL is missing in config");
            return Delivery::MissingWebhook;
        }

        let payload = self.payload(channel, message);
        let result = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status() == StatusCode::NO_CONTENT => {
                tracing::info!(%channel, "Discord notification sent");
                Delivery::Sent
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Discord notification rejected");
                Delivery::Rejected(resp.status())
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to send Discord notification");
                Delivery::Failed(e.to_string())
            }
        }
    }
}
