//! Per-chat message dispatch
//!
//! Every chat gets its own worker task fed through an mpsc channel, so the
//! messages of one chat are handled one at a time and in order while other
//! chats proceed in parallel. Queuing never waits: a chat whose inbox is full
//! loses the overflow instead of holding up the poll loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::conversation::Conversation;
use crate::telegram::IncomingMessage;

/// Messages a chat may queue before further ones are dropped
pub const CHAT_QUEUE_DEPTH: usize = 16;

/// A chat's worker task and its inbox
struct ChatWorker {
    sender: mpsc::Sender<IncomingMessage>,
    /// Messages sent but not yet fully handled
    pending: Arc<AtomicUsize>,
    last_seen: Instant,
    handle: JoinHandle<()>,
}

impl ChatWorker {
    fn spawn(conversation: Arc<Conversation>, chat_id: i64) -> Self {
        let (sender, mut rx) = mpsc::channel::<IncomingMessage>(CHAT_QUEUE_DEPTH);
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = pending.clone();

        let handle = tokio::spawn(async move {
            debug!("Worker for chat {} started", chat_id);
            while let Some(msg) = rx.recv().await {
                conversation.handle(&msg).await;
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
            debug!("Worker for chat {} exited", chat_id);
        });

        Self {
            sender,
            pending,
            last_seen: Instant::now(),
            handle,
        }
    }

    fn is_idle(&self, idle: Duration) -> bool {
        self.handle.is_finished()
            || (self.pending.load(Ordering::SeqCst) == 0 && self.last_seen.elapsed() >= idle)
    }
}

/// Routes inbound messages to chat workers
pub struct Dispatcher {
    conversation: Arc<Conversation>,
    workers: HashMap<i64, ChatWorker>,
    idle: Duration,
}

impl Dispatcher {
    /// Create a dispatcher; workers idle for `idle` are retired
    pub fn new(conversation: Arc<Conversation>, idle: Duration) -> Self {
        Self {
            conversation,
            workers: HashMap::new(),
            idle,
        }
    }

    /// Queue a message on its chat's worker, starting one if needed
    pub fn dispatch(&mut self, msg: IncomingMessage) {
        let chat_id = msg.chat_id;
        let conversation = self.conversation.clone();
        let worker = self
            .workers
            .entry(chat_id)
            .or_insert_with(|| ChatWorker::spawn(conversation.clone(), chat_id));

        // A worker only goes away on its own if a handler panicked
        if worker.handle.is_finished() {
            warn!("Worker for chat {} died, restarting", chat_id);
            *worker = ChatWorker::spawn(conversation, chat_id);
        }

        worker.last_seen = Instant::now();
        worker.pending.fetch_add(1, Ordering::SeqCst);
        match worker.sender.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                worker.pending.fetch_sub(1, Ordering::SeqCst);
                warn!("Dropped message for chat {}: inbox full", chat_id);
            }
            Err(TrySendError::Closed(_)) => {
                worker.pending.fetch_sub(1, Ordering::SeqCst);
                warn!("Dropped message for chat {}: worker gone", chat_id);
            }
        }
    }

    /// Drop workers with nothing queued or in flight and no recent traffic
    ///
    /// Only the dispatcher adds work, so a worker seen with zero pending
    /// messages here cannot receive more before its sender is dropped.
    pub fn retire_idle(&mut self) {
        let idle = self.idle;
        self.workers.retain(|chat_id, worker| {
            let keep = !worker.is_idle(idle);
            if !keep {
                debug!("Retiring idle worker for chat {}", chat_id);
            }
            keep
        });
    }

    /// Number of live chat workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close every inbox and wait for queued messages to be handled
    pub async fn shutdown(self) {
        for (chat_id, worker) in self.workers {
            drop(worker.sender);
            if let Err(e) = worker.handle.await {
                warn!("Worker for chat {} failed: {}", chat_id, e);
            }
        }
    }
}
