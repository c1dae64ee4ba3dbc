use crate::book::AlertTrigger;
use crate::error::AlerterError;
use crate::AlertSink;
use async_trait::async_trait;
use configuration::TelegramSettings;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// The JSON payload for the Telegram `sendMessage` endpoint.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// A client for sending messages to the Telegram Bot API.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    /// Returns `None` if the token or chat_id is empty, so alerting can be
    /// left off without failing start-up.
    pub fn new(settings: &TelegramSettings) -> Option<Self> {
        if settings.token.is_empty() || settings.chat_id.is_empty() {
            tracing::warn!("Telegram alerter is not configured (missing token or chat_id).");
            return None;
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            client,
            token: settings.token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }

    /// Sends a text message to the configured Telegram chat.
    pub async fn send_message(&self, message: &str) -> Result<(), AlerterError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to decode error response".to_string());
            return Err(AlerterError::ApiError(error_text));
        }

        Ok(())
    }
}

#[async_trait]
impl AlertSink for TelegramAlerter {
    async fn deliver(&self, trigger: &AlertTrigger) -> Result<(), AlerterError> {
        self.send_message(&format_trigger(trigger)).await
    }
}

fn format_trigger(trigger: &AlertTrigger) -> String {
    format!(
        "🚨 *{}* alert on account `{}`\n{}",
        escape_markdown(trigger.kind.as_str()),
        trigger.account_id,
        escape_markdown(&trigger.message)
    )
}

/// Escapes the characters that have special meaning in Telegram's MarkdownV2.
fn escape_markdown(text: &str) -> String {
    let special_chars = r"_*[]()~`>#+-=|{}.!";
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if special_chars.contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
