//! Per-chat dispatch of inbound channel messages.
//!
//! Every chat gets its own worker task fed by a bounded queue, so messages
//! from one chat are answered strictly in arrival order while other chats
//! proceed independently. Workers exit after sitting idle and are respawned
//! on the next message; a respawned worker waits for its predecessor to
//! finish draining before it answers anything.

use parley_core::channel::{Channel, ChannelMessage};
use parley_core::error::ChannelError;
use parley_core::message::ChatId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::commands::Bot;

const QUEUE_DEPTH: usize = 32;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Routing handle for one chat's worker.
struct Worker {
    tx: mpsc::Sender<ChannelMessage>,
    /// Resolves once the worker task has exited.
    done: oneshot::Receiver<()>,
}

pub struct ChatDispatcher {
    bot: Arc<Bot>,
    channel: Arc<dyn Channel>,
    idle_timeout: Duration,
}

impl ChatDispatcher {
    pub fn new(bot: Arc<Bot>, channel: Arc<dyn Channel>) -> Self {
        Self {
            bot,
            channel,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// How long a chat worker waits for another message before exiting.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Consume inbound messages until the channel closes, then wait for
    /// queued turns to finish.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<Result<ChannelMessage, ChannelError>>,
    ) {
        let mut workers: HashMap<ChatId, Worker> = HashMap::new();
        let mut tasks = JoinSet::new();

        info!(channel = self.channel.name(), "Dispatcher started");

        while let Some(item) = inbound.recv().await {
            let msg = match item {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(channel = self.channel.name(), error = %e, "Inbound channel error");
                    continue;
                }
            };

            if !self.channel.is_allowed(&msg.sender_id) {
                warn!(
                    channel = self.channel.name(),
                    sender = %msg.sender_id,
                    "Ignoring message from sender not on allowlist"
                );
                continue;
            }

            self.route(&mut workers, &mut tasks, msg).await;

            // Reap finished workers so the set does not grow without bound.
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Chat worker panicked");
                }
            }
        }

        info!(channel = self.channel.name(), "Inbound stream closed, draining chat workers");
        drop(workers);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Chat worker panicked");
            }
        }
    }

    async fn route(
        &self,
        workers: &mut HashMap<ChatId, Worker>,
        tasks: &mut JoinSet<()>,
        msg: ChannelMessage,
    ) {
        let chat_id = msg.chat_id.clone();

        let (msg, predecessor) = match workers.remove(&chat_id) {
            Some(worker) => match worker.tx.send(msg).await {
                Ok(()) => {
                    workers.insert(chat_id, worker);
                    return;
                }
                // Worker went idle and closed its queue. It may still be
                // draining, so the replacement waits on it.
                Err(mpsc::error::SendError(msg)) => (msg, Some(worker.done)),
            },
            None => (msg, None),
        };

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let (done_tx, done) = oneshot::channel();
        tasks.spawn(chat_worker(
            chat_id.clone(),
            rx,
            predecessor,
            done_tx,
            Arc::clone(&self.bot),
            Arc::clone(&self.channel),
            self.idle_timeout,
        ));
        debug!(chat_id = %chat_id, "Spawned chat worker");

        if tx.send(msg).await.is_err() {
            error!(chat_id = %chat_id, "New chat worker closed before first message");
        }
        workers.insert(chat_id, Worker { tx, done });
    }
}

async fn chat_worker(
    chat_id: ChatId,
    mut rx: mpsc::Receiver<ChannelMessage>,
    predecessor: Option<oneshot::Receiver<()>>,
    // Dropped on exit, which resolves the matching `Worker::done`.
    _done: oneshot::Sender<()>,
    bot: Arc<Bot>,
    channel: Arc<dyn Channel>,
    idle_timeout: Duration,
) {
    if let Some(previous) = predecessor {
        let _ = previous.await;
    }

    loop {
        let msg = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => {
                // Refuse new work, then finish whatever is already queued.
                rx.close();
                while let Some(msg) = rx.recv().await {
                    handle(&bot, channel.as_ref(), msg).await;
                }
                debug!(chat_id = %chat_id, "Chat worker idle, exiting");
                break;
            }
        };
        handle(&bot, channel.as_ref(), msg).await;
    }
}

async fn handle(bot: &Bot, channel: &dyn Channel, msg: ChannelMessage) {
    if let Err(e) = channel.send_typing(&msg.chat_id).await {
        debug!(chat_id = %msg.chat_id, error = %e, "Typing indicator failed");
    }

    let reply = bot.respond(&msg.chat_id, &msg.content).await;

    if let Err(e) = channel
        .send(&msg.chat_id, &reply, msg.message_id.as_deref())
        .await
    {
        error!(chat_id = %msg.chat_id, error = %e, "Failed to deliver reply");
    }
}
