use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::StoreError;

/// Key layout in the shared store.
pub mod keys {
    /// Set holding the id of every live quiz.
    pub const ACTIVE_QUIZZES: &str = "active_quizzes";

    pub fn quiz(quiz_id: &str) -> String {
        format!("quiz:{quiz_id}")
    }

    pub fn user(user_id: &str) -> String {
        format!("user:{user_id}")
    }

    pub fn leaderboard(quiz_id: &str) -> String {
        format!("leaderboard:{quiz_id}")
    }

    /// Claim marking that a participant's answer to a question was accepted.
    pub fn answer(user_id: &str, question_id: &str) -> String {
        format!("answer:{user_id}:{question_id}")
    }
}

/// A message received from a pattern subscription.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: String,
}

pub type MessageStream = BoxStream<'static, PubSubMessage>;

/// Abstraction over the shared state channel: a key-value store with TTLs,
/// string sets, and topic-based publish/subscribe.
///
/// Backed by Redis in production and an in-memory map in tests.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;
    /// Set `key` only if it does not exist. Returns whether it was set.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;
    /// Subscribe to every channel matching `pattern` (a trailing `*` matches
    /// any suffix). The subscription is live once this returns.
    async fn psubscribe(&self, pattern: &str) -> Result<MessageStream, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (single process / tests)
// ---------------------------------------------------------------------------

/// Capacity of the in-process topic bus.
const BUS_CAPACITY: usize = 1024;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory store. Share one instance between several app states to
/// simulate multiple server processes on one Redis.
pub struct MemoryStore {
    values: Mutex<HashMap<String, Entry>>,
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
    bus: broadcast::Sender<PubSubMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            values: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
            bus,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let expires_at = (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs));
        self.values.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut values = self.values.lock();
        let now = Instant::now();
        if values.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        let expires_at = (ttl_secs > 0).then(|| now + Duration::from_secs(ttl_secs));
        values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut values = self.values.lock();
        let now = Instant::now();
        match values.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().remove(key);
        self.sets.lock().remove(key);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.sets
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut sets = self.sets.lock();
        if let Some(set) = sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                sets.remove(key);
            }
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sets
            .lock()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        // send() errs when nobody is subscribed; nothing to deliver then.
        let _ = self.bus.send(PubSubMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<MessageStream, StoreError> {
        let rx = self.bus.subscribe();
        let pattern = pattern.to_string();

        let messages = stream::unfold((rx, pattern), |(mut rx, pattern)| async move {
            loop {
                match rx.recv().await {
                    Ok(msg) if channel_matches(&pattern, &msg.channel) => {
                        return Some((msg, (rx, pattern)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "memory pubsub subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(messages.boxed())
    }
}

/// Redis-style pattern match restricted to an optional trailing `*`.
fn channel_matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}
