//! Telegram Bot API transport
//!
//! Provides:
//! - `ChatTransport`: the outbound surface the conversation needs
//! - `TelegramClient`: reqwest implementation plus long-poll `getUpdates`
//! - Wire types for the subset of updates the bot consumes

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Extra time on top of the long-poll timeout before the HTTP request gives up
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Timeout for ordinary Bot API calls
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport errors
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Bot API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Bot API returned no result")]
    MissingResult,
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        // URLs carry the bot token
        TelegramError::Http(e.without_url())
    }
}

/// Telegram message formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    Markdown,
}

/// Outbound text message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
}

impl OutgoingMessage {
    /// Plain text message to a chat
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to_message_id: None,
            parse_mode: None,
        }
    }

    /// Reply to an inbound message in its chat
    pub fn reply(to: &IncomingMessage, text: impl Into<String>) -> Self {
        Self {
            reply_to_message_id: Some(to.message_id),
            ..Self::new(to.chat_id, text)
        }
    }

    pub fn markdown(mut self) -> Self {
        self.parse_mode = Some(ParseMode::Markdown);
        self
    }
}

/// Outbound side of the chat transport
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), TelegramError>;

    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: &str)
        -> Result<(), TelegramError>;

    async fn send_typing(&self, chat_id: i64) -> Result<(), TelegramError>;
}

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// getUpdates parameters
#[derive(Debug, Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

/// Incoming update
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

/// Telegram message (fields the bot uses)
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// A text message ready for the conversation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub text: String,
}

impl IncomingMessage {
    /// Extract a text message from an update; other update kinds yield None
    pub fn from_update(update: Update) -> Option<Self> {
        let message = update.message?;
        let text = message.text?;
        // Channel posts and anonymous admins have no sender; fall back to the chat
        let (user_id, username) = match message.from {
            Some(user) => (user.id, user.username),
            None => (message.chat.id, None),
        };

        Some(Self {
            chat_id: message.chat.id,
            message_id: message.message_id,
            user_id,
            username,
            text,
        })
    }

    /// Bot command name, if the text is one (`/start@my_bot arg` -> `start`)
    pub fn command(&self) -> Option<&str> {
        let first = self.text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        (!name.is_empty()).then_some(name)
    }
}

/// Telegram Bot API client
#[derive(Debug, Clone)]
pub struct TelegramClient {
    /// HTTP client
    client: Client,
    /// `{api_url}/bot{token}`
    base_url: String,
}

impl TelegramClient {
    /// Create a new client
    pub fn new(api_url: &str, token: &str) -> Result<Self, TelegramError> {
        let client = Client::builder().timeout(CALL_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Send a request and unwrap the Bot API envelope
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TelegramError> {
        let response: ApiResponse<T> = request.send().await?.json().await?;

        if !response.ok {
            return Err(TelegramError::Api {
                code: response.error_code.unwrap_or_default(),
                description: response.description.unwrap_or_default(),
            });
        }

        response.result.ok_or(TelegramError::MissingResult)
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let body = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: &["message"],
        };

        let request = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(timeout + POLL_GRACE)
            .json(&body);

        let updates: Vec<Update> = self.call(request).await?;
        if !updates.is_empty() {
            debug!("Received {} updates", updates.len());
        }
        Ok(updates)
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), TelegramError> {
        let request = self.client.post(self.method_url("sendMessage")).json(&message);
        let _: serde_json::Value = self.call(request).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        caption: &str,
    ) -> Result<(), TelegramError> {
        let photo = Part::bytes(png)
            .file_name("image.png")
            .mime_str("image/png")?;

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let request = self.client.post(self.method_url("sendPhoto")).multipart(form);
        let _: serde_json::Value = self.call(request).await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), TelegramError> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let request = self.client.post(self.method_url("sendChatAction")).json(&body);
        let _: bool = self.call(request).await?;
        Ok(())
    }
}
