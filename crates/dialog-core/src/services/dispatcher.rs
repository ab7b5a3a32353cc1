//! Per-chat single-writer dispatch
//!
//! Every chat gets one worker task fed by a bounded queue, so turns for the
//! same chat never interleave while different chats proceed in parallel.
//! Workers stop after an idle period and are respawned on demand.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::conversation_manager::ConversationManager;
use crate::domain::{ChatId, Mode};
use crate::engine::GenerationEngine;
use crate::error::DialogError;
use crate::repositories::SessionStore;

enum Job {
    Start {
        owner: String,
        reply: oneshot::Sender<Result<(), DialogError>>,
    },
    Answer {
        text: String,
        mode: Option<Mode>,
        reply: oneshot::Sender<Result<String, DialogError>>,
    },
    Reset {
        reply: oneshot::Sender<Result<(), DialogError>>,
    },
}

pub struct ChatDispatcher<S: SessionStore + ?Sized, E: GenerationEngine + ?Sized> {
    manager: Arc<ConversationManager<S, E>>,
    mailboxes: Arc<DashMap<ChatId, mpsc::Sender<Job>>>,
    capacity: usize,
    idle_timeout: Duration,
}

impl<S, E> ChatDispatcher<S, E>
where
    S: SessionStore + ?Sized + 'static,
    E: GenerationEngine + ?Sized + 'static,
{
    pub fn new(
        manager: Arc<ConversationManager<S, E>>,
        capacity: usize,
        idle_timeout: Duration,
    ) -> Self {
        info!(
            capacity,
            idle_secs = idle_timeout.as_secs(),
            "Initializing chat dispatcher"
        );
        Self {
            manager,
            mailboxes: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            idle_timeout,
        }
    }

    /// Number of chats with a live worker.
    pub fn active_workers(&self) -> usize {
        self.mailboxes.len()
    }

    pub async fn start_session(&self, chat_id: ChatId, owner: &str) -> Result<(), DialogError> {
        let (reply, rx) = oneshot::channel();
        let job = Job::Start {
            owner: owner.to_string(),
            reply,
        };
        self.submit(chat_id, job).await?;
        rx.await.map_err(|_| DialogError::WorkerGone(chat_id))?
    }

    pub async fn answer(
        &self,
        chat_id: ChatId,
        text: &str,
        mode: Option<Mode>,
    ) -> Result<String, DialogError> {
        let (reply, rx) = oneshot::channel();
        let job = Job::Answer {
            text: text.to_string(),
            mode,
            reply,
        };
        self.submit(chat_id, job).await?;
        rx.await.map_err(|_| DialogError::WorkerGone(chat_id))?
    }

    pub async fn reset_session(&self, chat_id: ChatId) -> Result<(), DialogError> {
        let (reply, rx) = oneshot::channel();
        self.submit(chat_id, Job::Reset { reply }).await?;
        rx.await.map_err(|_| DialogError::WorkerGone(chat_id))?
    }

    async fn submit(&self, chat_id: ChatId, mut job: Job) -> Result<(), DialogError> {
        // A worker may close its queue between lookup and send; retry on a fresh one.
        for _ in 0..3 {
            let sender = self.mailbox(chat_id);
            match sender.send(job).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    debug!(chat_id, "chat worker closed, respawning");
                    job = returned;
                }
            }
        }
        Err(DialogError::WorkerGone(chat_id))
    }

    fn mailbox(&self, chat_id: ChatId) -> mpsc::Sender<Job> {
        match self.mailboxes.entry(chat_id) {
            Entry::Occupied(entry) if !entry.get().is_closed() => entry.get().clone(),
            Entry::Occupied(mut entry) => {
                let sender = self.spawn_worker(chat_id);
                entry.insert(sender.clone());
                sender
            }
            Entry::Vacant(entry) => {
                let sender = self.spawn_worker(chat_id);
                entry.insert(sender.clone());
                sender
            }
        }
    }

    fn spawn_worker(&self, chat_id: ChatId) -> mpsc::Sender<Job> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let manager = self.manager.clone();
        let mailboxes = self.mailboxes.clone();
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            Self::worker_loop(chat_id, manager, receiver, idle_timeout).await;
            mailboxes.remove_if(&chat_id, |_, sender| sender.is_closed());
        });

        debug!(chat_id, "chat worker spawned");
        sender
    }

    async fn worker_loop(
        chat_id: ChatId,
        manager: Arc<ConversationManager<S, E>>,
        mut receiver: mpsc::Receiver<Job>,
        idle_timeout: Duration,
    ) {
        loop {
            match tokio::time::timeout(idle_timeout, receiver.recv()).await {
                Ok(Some(job)) => Self::handle(&manager, chat_id, job).await,
                Ok(None) => break,
                Err(_) => {
                    // Refuse new jobs, then finish whatever is already queued.
                    receiver.close();
                    while let Some(job) = receiver.recv().await {
                        Self::handle(&manager, chat_id, job).await;
                    }
                    break;
                }
            }
        }
        debug!(chat_id, "chat worker stopped");
    }

    async fn handle(manager: &ConversationManager<S, E>, chat_id: ChatId, job: Job) {
        // A dropped receiver means the caller went away; the turn still completes.
        match job {
            Job::Start { owner, reply } => {
                let _ = reply.send(manager.start_session(chat_id, &owner).await);
            }
            Job::Answer { text, mode, reply } => {
                let _ = reply.send(manager.answer(chat_id, &text, mode).await);
            }
            Job::Reset { reply } => {
                let _ = reply.send(manager.reset_session(chat_id).await);
            }
        }
    }
}
