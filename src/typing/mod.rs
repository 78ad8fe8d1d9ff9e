//! Persistent "typing" indicator
//!
//! Telegram clears a chat action after about five seconds, so while a batch
//! runs the indicator is re-sent on an interval from a background task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::telegram::ChatTransport;

/// Handle to a running typing loop for one chat
///
/// Dropping the handle without calling [`TypingIndicator::stop`] leaves the
/// task to notice the closed channel and exit on its own.
pub struct TypingIndicator {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TypingIndicator {
    /// Spawn the loop; the first signal is sent immediately
    pub fn start(transport: Arc<dyn ChatTransport>, chat_id: i64, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(typing_loop(transport, chat_id, interval, stop_rx));
        Self { stop_tx, handle }
    }

    /// Signal the loop to stop and wait until it has exited
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!("Typing indicator task failed: {}", e);
        }
    }
}

async fn typing_loop(
    transport: Arc<dyn ChatTransport>,
    chat_id: i64,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        if let Err(e) = transport.send_typing(chat_id).await {
            warn!("Failed to send typing action to chat {}: {}", chat_id, e);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Typing indicator for chat {} stopped", chat_id);
}
