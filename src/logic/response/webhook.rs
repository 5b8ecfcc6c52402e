//! Alert notifications (Telegram)
//!
//! Fire-and-forget: callers spawn `notify` and only log failures.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::NotifyConfig;
use super::types::{AlertNotice, NotifyError};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &AlertNotice) -> Result<(), NotifyError>;
}

pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    http_client: reqwest::Client,
}

impl TelegramNotifier {
    /// `None` unless both bot token and chat id are configured
    pub fn from_config(config: &NotifyConfig) -> Option<Self> {
        let bot_token = config.telegram_bot_token.clone()?;
        let chat_id = config.telegram_chat_id.clone()?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .ok()?;

        Some(Self { bot_token, chat_id, http_client })
    }

    fn format_message(notice: &AlertNotice) -> String {
        format!(
            "{} *Suricata Alert* {}\n\
             *Signature:* {}\n\
             *Severity:* {}\n\
             *Source:* {}\n\
             *Dest:* {}\n\
             *Action:* {}",
            notice.severity_emoji(),
            notice.severity_emoji(),
            escape_markdown(&notice.signature),
            notice.severity,
            endpoint(&notice.src_ip, notice.src_port),
            endpoint(&notice.dest_ip, notice.dest_port),
            notice.action,
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notice: &AlertNotice) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": Self::format_message(notice),
            "parse_mode": "Markdown"
        });

        let response = self.http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(response.status().as_u16()))
        }
    }
}

fn endpoint(ip: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => format!("{}:{}", ip, port),
        None => ip.to_string(),
    }
}

fn escape_markdown(text: &str) -> String {
    text.replace('*', "\\*")
        .replace('_', "\\_")
        .replace('`', "\\`")
        .replace('[', "\\[")
}
