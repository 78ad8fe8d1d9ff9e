//! Common test utilities - fake transport and generator for driving the bot
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use parking_lot::Mutex;

use imgbot::conversation::Conversation;
use imgbot::db::Database;
use imgbot::generation::{GenerationError, ImageGenerator};
use imgbot::registry::UserRegistry;
use imgbot::telegram::{ChatTransport, IncomingMessage, OutgoingMessage, ParseMode, TelegramError};

/// Typing interval used by test conversations
pub const TYPING_INTERVAL: Duration = Duration::from_millis(5);

static NEXT_MESSAGE_ID: AtomicI64 = AtomicI64::new(1);

/// Something the bot sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
        reply_to: Option<i64>,
        markdown: bool,
    },
    Photo {
        chat_id: i64,
        caption: String,
        png: Vec<u8>,
    },
    Typing {
        chat_id: i64,
    },
}

impl Sent {
    pub fn chat_id(&self) -> i64 {
        match self {
            Sent::Text { chat_id, .. } | Sent::Photo { chat_id, .. } | Sent::Typing { chat_id } => {
                *chat_id
            }
        }
    }
}

/// Transport that records everything in send order
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Everything but typing signals, for one chat
    pub fn replies(&self, chat_id: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat_id() == chat_id && !matches!(s, Sent::Typing { .. }))
            .collect()
    }

    pub fn texts(&self, chat_id: i64) -> Vec<String> {
        self.replies(chat_id)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn captions(&self, chat_id: i64) -> Vec<String> {
        self.replies(chat_id)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo { caption, .. } => Some(caption),
                _ => None,
            })
            .collect()
    }

    pub fn typing_count(&self, chat_id: i64) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Typing { chat_id: c } if *c == chat_id))
            .count()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), TelegramError> {
        self.sent.lock().push(Sent::Text {
            chat_id: message.chat_id,
            text: message.text,
            reply_to: message.reply_to_message_id,
            markdown: message.parse_mode == Some(ParseMode::Markdown),
        });
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        caption: &str,
    ) -> Result<(), TelegramError> {
        self.sent.lock().push(Sent::Photo {
            chat_id,
            caption: caption.to_string(),
            png,
        });
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), TelegramError> {
        self.sent.lock().push(Sent::Typing { chat_id });
        Ok(())
    }
}

/// One scripted generator outcome
pub enum Outcome {
    Image,
    Bytes(Vec<u8>),
    Fail(GenerationError),
}

/// Generator that replays a script, then succeeds with a sample image
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Outcome>>,
    calls: Mutex<Vec<(String, u32)>>,
    delay: Duration,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    /// Every call takes `delay` before answering
    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::with_script_and_delay(Vec::new(), delay)
    }

    pub fn with_script_and_delay(script: Vec<Outcome>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay,
            ..Self::default()
        })
    }

    /// (prompt, seed) of every call so far
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, seed: u32) -> Result<Vec<u8>, GenerationError> {
        self.calls.lock().push((prompt.to_string(), seed));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Image);
        match outcome {
            Outcome::Image => Ok(sample_jpeg()),
            Outcome::Bytes(bytes) => Ok(bytes),
            Outcome::Fail(e) => Err(e),
        }
    }
}

/// A small JPEG, as a model might return
pub fn sample_jpeg() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([10, 120, 200])));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Jpeg)
        .expect("encode sample image");
    buffer.into_inner()
}

/// Inbound text message from a private chat (user id == chat id)
pub fn text(chat_id: i64, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id,
        message_id: NEXT_MESSAGE_ID.fetch_add(1, Ordering::SeqCst),
        user_id: chat_id,
        username: Some(format!("user{}", chat_id)),
        text: text.to_string(),
    }
}

/// In-memory registry with the production schema
pub async fn registry() -> UserRegistry {
    let db = Database::new(None)
        .await
        .expect("Failed to create test database");
    UserRegistry::new(db.pool().clone())
}

/// Conversation wired to the given fakes and a fresh registry
pub async fn conversation(
    transport: Arc<RecordingTransport>,
    generator: Arc<ScriptedGenerator>,
) -> (Conversation, UserRegistry) {
    let registry = registry().await;
    let conversation = Conversation::new(transport, generator, registry.clone(), TYPING_INTERVAL);
    (conversation, registry)
}
