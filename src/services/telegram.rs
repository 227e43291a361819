use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound delivery of reminder text to a chat.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, destination_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    channel_post: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// A chat message carrying text, as received by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub update_id: i64,
    pub chat_id: i64,
    pub text: String,
}

/// Telegram Bot API client, used both to deliver reminders and to
/// long-poll the chats the bot sits in.
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Result<Self> {
        Self::with_api_url(TELEGRAM_API_URL, bot_token)
    }

    pub fn with_api_url(api_url: &str, bot_token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        // without_url keeps the bot token out of error messages
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| e.without_url())?;

        let status = response.status();
        let api: ApiResponse<T> = response.json().await.map_err(|e| e.without_url())?;

        match api {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(AppError::Telegram(format!(
                "{} failed ({}): {}",
                method,
                status,
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    /// Long-poll for new messages. Pass the last seen `update_id + 1` as
    /// `offset` to acknowledge everything before it.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        long_poll: Duration,
    ) -> Result<Vec<IncomingMessage>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: long_poll.as_secs(),
            allowed_updates: ["message", "channel_post"],
        };
        let updates: Vec<Update> = self
            .call("getUpdates", &request, long_poll + REQUEST_TIMEOUT)
            .await?;
        Ok(messages_from_updates(updates))
    }
}

#[async_trait]
impl NotificationChannel for TelegramClient {
    async fn send(&self, destination_id: &str, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: destination_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let _: serde_json::Value = self.call("sendMessage", &request, REQUEST_TIMEOUT).await?;
        tracing::info!(chat_id = %destination_id, "Notification sent");
        Ok(())
    }
}

/// Updates without text still advance the offset, so they are kept with
/// an empty body.
fn messages_from_updates(updates: Vec<Update>) -> Vec<IncomingMessage> {
    updates
        .into_iter()
        .map(|update| {
            let message = update.message.or(update.channel_post);
            let chat_id = message.as_ref().map(|m| m.chat.id).unwrap_or_default();
            let text = message
                .and_then(|m| m.text.or(m.caption))
                .unwrap_or_default();
            IncomingMessage {
                update_id: update.update_id,
                chat_id,
                text,
            }
        })
        .collect()
}
