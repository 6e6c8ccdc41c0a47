//! Registry of connected WebSocket clients and per-quiz fanout.
//!
//! Each client owns a bounded outbound queue drained by its writer task. A
//! broadcast serializes the message once and offers it to every client bound
//! to the quiz without blocking; a client whose queue is full or closed is
//! dropped from the registry, which closes its queue exactly once.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use quizline_common::id::{prefix, prefixed_ulid};
use tokio::sync::mpsc;

use super::events::ServerMessage;
use super::relay::Relay;

/// Serialized frames waiting for a client's writer task.
pub type OutboundQueue = mpsc::Receiver<Arc<str>>;

struct ClientEntry {
    tx: mpsc::Sender<Arc<str>>,
    quiz_id: Option<String>,
    user_id: Option<String>,
}

/// The quiz and participant a connection joined as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub quiz_id: String,
    pub user_id: String,
}

pub struct Hub {
    clients: DashMap<String, ClientEntry>,
    queue_capacity: usize,
    relay: RwLock<Option<Relay>>,
}

impl Hub {
    /// Broadcasts stay on this instance until a relay is attached.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            clients: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
            relay: RwLock::new(None),
        }
    }

    /// Start publishing broadcasts to other instances.
    pub fn attach_relay(&self, relay: Relay) {
        *self.relay.write() = Some(relay);
    }

    pub fn has_relay(&self) -> bool {
        self.relay.read().is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Add a connection. Returns its id and the receiving end of its queue.
    pub fn register(&self) -> (String, OutboundQueue) {
        let client_id = prefixed_ulid(prefix::CLIENT);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.clients.insert(
            client_id.clone(),
            ClientEntry {
                tx,
                quiz_id: None,
                user_id: None,
            },
        );
        tracing::debug!(%client_id, "client registered");
        (client_id, rx)
    }

    /// Remove a connection. Its queue closes once the entry is dropped.
    pub fn unregister(&self, client_id: &str) -> bool {
        let removed = self.clients.remove(client_id).is_some();
        if removed {
            tracing::debug!(%client_id, "client unregistered");
        }
        removed
    }

    /// Attach a connection to a quiz as a participant. Rebinding replaces the
    /// previous binding.
    pub fn bind(&self, client_id: &str, quiz_id: &str, user_id: &str) -> bool {
        match self.clients.get_mut(client_id) {
            Some(mut entry) => {
                entry.quiz_id = Some(quiz_id.to_string());
                entry.user_id = Some(user_id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn binding(&self, client_id: &str) -> Option<Binding> {
        let entry = self.clients.get(client_id)?;
        Some(Binding {
            quiz_id: entry.quiz_id.clone()?,
            user_id: entry.user_id.clone()?,
        })
    }

    /// Queue a message for a single connection.
    pub fn send_to(&self, client_id: &str, message: &ServerMessage) -> bool {
        let Some(frame) = encode(message) else {
            return false;
        };
        let sent = match self.clients.get(client_id) {
            Some(entry) => entry.tx.try_send(frame).is_ok(),
            None => return false,
        };
        if !sent {
            tracing::info!(%client_id, "client queue full or closed; dropping client");
            self.unregister(client_id);
        }
        sent
    }

    /// Deliver a message to the clients on this instance bound to `quiz_id`.
    /// Returns the number of clients the message was queued for.
    pub fn deliver_local(&self, quiz_id: &str, message: &ServerMessage) -> usize {
        let Some(frame) = encode(message) else {
            return 0;
        };

        let mut delivered = 0;
        let mut stale = Vec::new();
        for entry in self.clients.iter() {
            if entry.quiz_id.as_deref() != Some(quiz_id) {
                continue;
            }
            match entry.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => stale.push(entry.key().clone()),
            }
        }

        for client_id in stale {
            tracing::info!(%client_id, %quiz_id, "client queue full or closed; dropping client");
            self.unregister(&client_id);
        }
        delivered
    }

    /// Deliver locally, then publish to the other instances.
    pub async fn broadcast(&self, quiz_id: &str, message: ServerMessage) {
        let delivered = self.deliver_local(quiz_id, &message);
        tracing::debug!(%quiz_id, delivered, "broadcast delivered locally");
        let relay = self.relay.read().clone();
        if let Some(relay) = relay {
            relay.publish(quiz_id, message).await;
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Arc<str>> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            tracing::error!(?e, "failed to serialize outbound message");
            None
        }
    }
}
