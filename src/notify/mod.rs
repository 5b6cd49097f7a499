//! Outcome notification via a Telegram bot
//!
//! Fire-and-forget: a notification failure is logged and never changes the
//! run's outcome. Disabled entirely when the bot token or chat id is absent.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::outcome::LoginReport;

/// Chat notifier for run outcomes.
pub struct Notifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Option<Self> {
        let client = match Client::builder().timeout(Duration::from_secs(15)).build() {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not build notification client: {}", e);
                return None;
            }
        };

        Some(Self {
            client,
            bot_token,
            chat_id,
        })
    }

    /// Read `NOTIFY_BOT_TOKEN` / `NOTIFY_CHAT_ID`; None disables notification.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("NOTIFY_BOT_TOKEN").ok().filter(|v| !v.is_empty())?;
        let chat_id = std::env::var("NOTIFY_CHAT_ID").ok().filter(|v| !v.is_empty())?;
        Self::new(bot_token, chat_id)
    }

    pub async fn notify_success(&self, report: &LoginReport) {
        let text = format!(
            "Login OK\ntime: {}\nurl: {}\ntitle: {}",
            report.finished_at.to_rfc3339(),
            report.final_url,
            report.title
        );
        self.send(text).await;
    }

    pub async fn notify_failure(&self, context: &str) {
        let text = format!("Login FAILED\ntime: {}\n{}", Utc::now().to_rfc3339(), context);
        self.send(text).await;
    }

    async fn send(&self, text: String) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Notification delivered");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "Notification rejected: {} - {}",
                    status,
                    &body[..body.len().min(200)]
                );
            }
            Err(e) => {
                warn!("Notification failed: {}", e);
            }
        }

        debug!("Notification attempt finished");
    }
}
