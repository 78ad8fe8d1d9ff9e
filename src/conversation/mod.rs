//! Conversation state machine
//!
//! Each chat moves through `NoSession -> AwaitingCount -> Generating` and back.
//! Callers must not run two `handle` calls for the same chat concurrently; the
//! dispatcher guarantees this with one worker per chat.

mod session;

pub use session::{
    parse_image_count, validate_prompt, ChatState, Session, SessionStore, ValidationError,
    MAX_IMAGES, MAX_PROMPT_CHARS, MIN_PROMPT_CHARS,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::generation::{random_seed, GenerationError, ImageGenerator};
use crate::images;
use crate::registry::{UserRegistry, NO_USERNAME};
use crate::telegram::{ChatTransport, IncomingMessage, OutgoingMessage};
use crate::typing::TypingIndicator;

pub const ASK_COUNT: &str = "How many images would you like to generate?";

pub const CLOSING: &str =
    "If you want another image, give another prompt. Else you can just leave the session.";

pub const SAVE_FAILED: &str =
    "Sorry, there was an issue saving your data. Please try again later.";

pub const WELCOME: &str = "🎉 *Welcome to the Image Generator Bot!* 🎉\n\n\
Here’s how you can use me:\n\
1️⃣ Use the /start command to begin interacting with me.\n\
2️⃣ Send me a text prompt describing the image you want to generate.\n\
3️⃣ I’ll ask how many images you want (up to 3) and generate them for you!\n\n\
💡 *Example Prompt*: `A futuristic city in the clouds`\n\n\
⚡ *Pro Tip*: The more creative your prompt, the better the image!\n\n\
Let’s get started! 🚀";

/// Caption for the `index`-th image (1-based) of a batch
pub fn caption(index: usize, prompt: &str) -> String {
    format!("Image {} for: {}", index, prompt)
}

/// Drives sessions, generation and replies for all chats
pub struct Conversation {
    transport: Arc<dyn ChatTransport>,
    generator: Arc<dyn ImageGenerator>,
    registry: UserRegistry,
    sessions: SessionStore,
    typing_interval: Duration,
}

impl Conversation {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        generator: Arc<dyn ImageGenerator>,
        registry: UserRegistry,
        typing_interval: Duration,
    ) -> Self {
        Self {
            transport,
            generator,
            registry,
            sessions: SessionStore::new(),
            typing_interval,
        }
    }

    /// Session store (read access for callers and tests)
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one inbound text message
    pub async fn handle(&self, msg: &IncomingMessage) {
        if msg.command() == Some("start") {
            self.welcome(msg).await;
            return;
        }

        match self.sessions.state(msg.chat_id) {
            ChatState::NoSession => self.accept_prompt(msg).await,
            ChatState::AwaitingCount => self.accept_count(msg).await,
            ChatState::Generating => {
                // Only reachable if a previous batch was torn down mid-flight
                warn!("Discarding stale session for chat {}", msg.chat_id);
                self.sessions.remove(msg.chat_id);
                self.accept_prompt(msg).await;
            }
        }
    }

    /// `/start`: register the user and explain how the bot works
    async fn welcome(&self, msg: &IncomingMessage) {
        let username = msg.username.as_deref().unwrap_or(NO_USERNAME);

        if self.registry.add_user(username, msg.user_id).await.is_err() {
            self.reply(OutgoingMessage::reply(msg, SAVE_FAILED)).await;
            return;
        }

        self.reply(OutgoingMessage::reply(msg, WELCOME).markdown()).await;
    }

    async fn accept_prompt(&self, msg: &IncomingMessage) {
        match validate_prompt(&msg.text) {
            Ok(prompt) => {
                debug!("Chat {} prompt accepted", msg.chat_id);
                self.sessions.start(msg.chat_id, prompt);
                self.reply(OutgoingMessage::reply(msg, ASK_COUNT)).await;
            }
            Err(e) => self.reject(msg, e).await,
        }
    }

    async fn accept_count(&self, msg: &IncomingMessage) {
        let count = match parse_image_count(&msg.text) {
            Ok(count) => count,
            Err(e) => return self.reject(msg, e).await,
        };

        let Some(session) = self.sessions.set_count(msg.chat_id, count) else {
            return;
        };

        self.run_batch(msg, &session.prompt, count).await;
        self.sessions.remove(msg.chat_id);
    }

    /// Generate `count` images and deliver them, or report the first failure
    async fn run_batch(&self, msg: &IncomingMessage, prompt: &str, count: u8) {
        info!("Chat {}: generating {} image(s)", msg.chat_id, count);

        let typing = TypingIndicator::start(
            self.transport.clone(),
            msg.chat_id,
            self.typing_interval,
        );
        let result = self.generate_all(prompt, count).await;
        typing.stop().await;

        let pngs = match result {
            Ok(pngs) => pngs,
            Err(e) => {
                // Images made before the failure are dropped, not delivered
                self.reply(OutgoingMessage::reply(msg, e.user_message())).await;
                return;
            }
        };

        for (i, png) in pngs.into_iter().enumerate() {
            if let Err(e) = self
                .transport
                .send_photo(msg.chat_id, png, &caption(i + 1, prompt))
                .await
            {
                error!("Failed to send image {} to chat {}: {}", i + 1, msg.chat_id, e);
            }
        }

        self.reply(OutgoingMessage::reply(msg, CLOSING)).await;
        info!("Chat {}: batch delivered", msg.chat_id);
    }

    /// Sequential generation; stops at the first failure
    async fn generate_all(&self, prompt: &str, count: u8) -> Result<Vec<Vec<u8>>, GenerationError> {
        let mut pngs = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let seed = random_seed();
            let raw = self.generator.generate(prompt, seed).await?;
            let png = images::to_png(&raw).map_err(|e| {
                let err = GenerationError::from(e);
                error!("{}", err);
                err
            })?;
            pngs.push(png);
        }

        Ok(pngs)
    }

    async fn reject(&self, msg: &IncomingMessage, e: ValidationError) {
        debug!("Chat {} input rejected: {:?}", msg.chat_id, e);
        self.reply(OutgoingMessage::reply(msg, e.to_string())).await;
    }

    async fn reply(&self, message: OutgoingMessage) {
        let chat_id = message.chat_id;
        if let Err(e) = self.transport.send_message(message).await {
            error!("Failed to send message to chat {}: {}", chat_id, e);
        }
    }
}
