//! imgbot - Telegram image generation bot
//!
//! Collects a prompt and an image count from each chat, generates the images
//! through a hosted diffusion model and sends them back as photos.

pub mod config;
pub mod conversation;
pub mod db;
pub mod dispatch;
pub mod generation;
pub mod images;
pub mod registry;
pub mod telegram;
pub mod typing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub use config::Config;
use conversation::Conversation;
use db::Database;
use dispatch::Dispatcher;
use generation::HuggingFaceClient;
use registry::UserRegistry;
use telegram::{IncomingMessage, TelegramClient};

/// Wait before polling again after getUpdates fails
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// The bot instance
pub struct Bot {
    config: Config,
    db: Arc<Database>,
    telegram: Arc<TelegramClient>,
    conversation: Arc<Conversation>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Bot {
    /// Open the database and build the clients
    pub async fn new(config: Config) -> Result<Self> {
        let db = Arc::new(Database::new(config.db_path.as_deref()).await?);
        db.health_check().await?;
        let telegram = Arc::new(TelegramClient::new(
            &config.telegram_api_url,
            &config.bot_token,
        )?);
        let generator = Arc::new(HuggingFaceClient::new(
            config.api_url.clone(),
            config.huggingface_token.clone(),
            config.request_timeout(),
        )?);

        let conversation = Arc::new(Conversation::new(
            telegram.clone(),
            generator,
            UserRegistry::new(db.pool().clone()),
            config.typing_interval(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            db,
            telegram,
            conversation,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the database handle
    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Get the conversation handler
    pub fn conversation(&self) -> Arc<Conversation> {
        self.conversation.clone()
    }

    /// Poll for updates until shutdown
    pub async fn run(&self) -> Result<()> {
        info!("imgbot polling for updates");

        let mut dispatcher = Dispatcher::new(self.conversation.clone(), self.config.worker_idle());
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut offset: Option<i64> = None;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let polled = tokio::select! {
                _ = shutdown_rx.changed() => break,
                polled = self.telegram.get_updates(offset, self.config.poll_timeout()) => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        match IncomingMessage::from_update(update) {
                            Some(msg) => dispatcher.dispatch(msg),
                            None => debug!("Ignoring non-text update"),
                        }
                    }
                }
                Err(e) => {
                    error!("Polling for updates failed: {}", e);
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = tokio::time::sleep(POLL_BACKOFF) => {}
                    }
                }
            }

            dispatcher.retire_idle();
        }

        info!("Waiting for in-flight chats to finish");
        dispatcher.shutdown().await;
        self.db.close().await;

        info!("imgbot shutdown complete");
        Ok(())
    }

    /// Signal the bot to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
