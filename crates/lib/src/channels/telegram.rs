//! Telegram channel: long-poll getUpdates and sendMessage via Bot API.

use crate::channels::inbound::InboundMessage;
use crate::channels::registry::ChannelHandle;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;

/// Registry id of the Telegram channel.
pub const TELEGRAM_CHANNEL_ID: &str = "telegram";

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

impl TelegramUpdate {
    /// Extract a relayable message: text plus chat and sender ids. Non-text
    /// updates (stickers, photos, service messages) yield None and are dropped
    /// before they reach the relay.
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        let msg = self.message.as_ref()?;
        let text = msg.text.as_ref()?;
        let from = msg.from.as_ref()?;
        Some(InboundMessage {
            chat_id: msg.chat.id.to_string(),
            user_id: from.id.to_string(),
            text: text.clone(),
        })
    }
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
pub struct TelegramChannel {
    token: Option<String>,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the getUpdates long-poll loop and forward messages to the server. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let token = self.token.as_ref().ok_or("telegram bot token not configured")?;
        let url = format!(
            "{}/bot{}/getUpdates?timeout={}",
            telegram_api_base(),
            token,
            LONG_POLL_TIMEOUT
        );
        let url = if let Some(off) = offset {
            format!("{}&offset={}", url, off)
        } else {
            url
        };
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("getUpdates failed: {} {}", status, body));
        }
        let data: GetUpdatesResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err("getUpdates returned ok: false".to_string());
        }
        let next_offset = data
            .result
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1);
        Ok((data.result, next_offset))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String> {
        let token = self
            .token
            .as_ref()
            .ok_or("telegram bot token not configured")?;
        let api_url = format!("{}/bot{}/setWebhook", telegram_api_base(), token);
        let mut body = serde_json::json!({ "url": url });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        let res = self
            .client
            .post(&api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("setWebhook failed: {} {}", status, body));
        }
        Ok(())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), String> {
        let token = self
            .token
            .as_ref()
            .ok_or("telegram bot token not configured")?;
        let url = format!("{}/bot{}/deleteWebhook", telegram_api_base(), token);
        let res = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("deleteWebhook failed: {} {}", status, body));
        }
        Ok(())
    }

    /// Send a text message to a chat via sendMessage API.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let token = self
            .token
            .as_ref()
            .ok_or("telegram bot token not configured")?;
        let url = format!("{}/bot{}/sendMessage", telegram_api_base(), token);
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("sendMessage failed: {} {}", status, body));
        }
        Ok(())
    }

    /// Signal "typing" to a chat via sendChatAction API.
    pub async fn send_chat_action(&self, chat_id: &str, action: &str) -> Result<(), String> {
        let token = self
            .token
            .as_ref()
            .ok_or("telegram bot token not configured")?;
        let url = format!("{}/bot{}/sendChatAction", telegram_api_base(), token);
        let body = serde_json::json!({ "chat_id": chat_id, "action": action });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("sendChatAction failed: {} {}", status, body));
        }
        Ok(())
    }
}

async fn run_get_updates_loop(
    channel: Arc<TelegramChannel>,
    inbound_tx: mpsc::Sender<InboundMessage>,
) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                offset = next;
                for u in updates {
                    if let Some(inbound) = u.to_inbound() {
                        if inbound_tx.send(inbound).await.is_err() {
                            log::debug!("telegram: inbound channel closed, stopping loop");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        TELEGRAM_CHANNEL_ID
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        TelegramChannel::send_message(self, chat_id, text).await
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), String> {
        self.send_chat_action(chat_id, "typing").await
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_update_becomes_inbound() {
        let update: TelegramUpdate = serde_json::from_str(
            r#"{"update_id":1,"message":{"chat":{"id":42},"from":{"id":7},"text":"вопрос"}}"#,
        )
        .expect("parse");
        let inbound = update.to_inbound().expect("inbound");
        assert_eq!(inbound.chat_id, "42");
        assert_eq!(inbound.user_id, "7");
        assert_eq!(inbound.text, "вопрос");
    }

    #[test]
    fn non_text_update_is_dropped() {
        let update: TelegramUpdate = serde_json::from_str(
            r#"{"update_id":2,"message":{"chat":{"id":42},"from":{"id":7}}}"#,
        )
        .expect("parse");
        assert!(update.to_inbound().is_none());

        let update: TelegramUpdate = serde_json::from_str(r#"{"update_id":3}"#).expect("parse");
        assert!(update.to_inbound().is_none());
    }
}
