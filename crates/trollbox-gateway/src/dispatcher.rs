use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

use trollbox_types::{ChatAction, Credentials, Message};

/// Shared by every connection: recent history plus the fan-out channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Serialized action frames; every connected widget receives every frame.
    broadcast_tx: broadcast::Sender<String>,

    /// Oldest first.
    history: RwLock<VecDeque<Message>>,
    max_history: usize,
}

impl Dispatcher {
    pub fn new(max_history: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                history: RwLock::new(VecDeque::with_capacity(max_history)),
                max_history,
            }),
        }
    }

    /// Snapshot the history and subscribe in one step, so a new connection
    /// neither misses nor repeats a post made while it joins.
    pub async fn join(&self) -> (Vec<Message>, broadcast::Receiver<String>) {
        let history = self.inner.history.read().await;
        let rx = self.inner.broadcast_tx.subscribe();
        (history.iter().cloned().collect(), rx)
    }

    pub async fn history(&self) -> Vec<Message> {
        self.inner.history.read().await.iter().cloned().collect()
    }

    /// Accept a post from `author`: assign a fresh id, stamp the author from
    /// the verified credentials, store it and broadcast it.
    pub async fn post(&self, draft: Message, author: &Credentials) -> Message {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            author_name: author.username.clone(),
            author_uid: author.uid,
            author_role: author.role,
            ..draft
        };

        let mut history = self.inner.history.write().await;
        if self.inner.max_history > 0 {
            while history.len() >= self.inner.max_history {
                history.pop_front();
            }
            history.push_back(message.clone());
        }
        self.broadcast(&ChatAction::PostMessage(message.clone()));
        message
    }

    /// Remove a message by id and tell every widget. Returns whether the id
    /// was still in the history; the broadcast happens either way so widgets
    /// holding older messages drop them too.
    pub async fn delete(&self, id: &str) -> bool {
        let mut history = self.inner.history.write().await;
        let removed = match history.iter().position(|m| m.id == id) {
            Some(idx) => history.remove(idx).is_some(),
            None => false,
        };
        self.broadcast(&ChatAction::delete(id));
        removed
    }

    fn broadcast(&self, action: &ChatAction) {
        match serde_json::to_string(action) {
            Ok(json) => {
                let receivers = self.inner.broadcast_tx.send(json).unwrap_or(0);
                debug!("Broadcast {} to {} connections", action.name(), receivers);
            }
            Err(e) => warn!("Failed to serialize {}: {}", action.name(), e),
        }
    }
}
