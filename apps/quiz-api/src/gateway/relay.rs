//! Cross-instance event relay over the shared state channel.
//!
//! Broadcasts are published on `quiz:<id>` wrapped in a [`RelayEnvelope`].
//! Every instance subscribes to `quiz:*` and re-delivers remote envelopes to
//! its own clients; envelopes stamped with this instance's id were already
//! delivered locally and are skipped.

use std::sync::Arc;

use futures_util::StreamExt;
use quizline_common::id::{prefix, prefixed_ulid};
use tokio::task::JoinHandle;

use super::events::{RelayEnvelope, ServerMessage};
use super::hub::Hub;
use crate::db::kv::{KeyValueStore, PubSubMessage};
use crate::error::StoreError;
use crate::session::SessionStore;

pub const TOPIC_PATTERN: &str = "quiz:*";

pub fn topic(quiz_id: &str) -> String {
    format!("quiz:{quiz_id}")
}

#[derive(Clone)]
pub struct Relay {
    kv: Arc<dyn KeyValueStore>,
    instance_id: String,
}

impl Relay {
    pub fn new(kv: Arc<dyn KeyValueStore>, instance_id: impl Into<String>) -> Self {
        Self {
            kv,
            instance_id: instance_id.into(),
        }
    }

    /// Publish failures are logged; local delivery has already happened.
    pub async fn publish(&self, quiz_id: &str, message: ServerMessage) {
        let envelope = RelayEnvelope {
            event_id: prefixed_ulid(prefix::EVENT),
            origin: self.instance_id.clone(),
            quiz_id: quiz_id.to_string(),
            message,
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(?e, %quiz_id, "failed to serialize relay envelope");
                return;
            }
        };
        if let Err(e) = self.kv.publish(&topic(quiz_id), &payload).await {
            tracing::warn!(?e, %quiz_id, event_id = %envelope.event_id, "failed to publish event");
        }
    }

    /// Subscribe to every quiz topic and spawn the delivery loop.
    ///
    /// The subscription is established before this returns, so events
    /// published afterwards are not missed.
    pub async fn start(
        &self,
        sessions: Arc<SessionStore>,
        hub: Arc<Hub>,
    ) -> Result<JoinHandle<()>, StoreError> {
        let mut stream = self.kv.psubscribe(TOPIC_PATTERN).await?;
        let relay = self.clone();
        tracing::info!(instance_id = %relay.instance_id, pattern = TOPIC_PATTERN, "relay subscribed");

        Ok(tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                relay.handle(message, &sessions, &hub).await;
            }
            tracing::warn!(instance_id = %relay.instance_id, "relay subscription ended");
        }))
    }

    async fn handle(&self, message: PubSubMessage, sessions: &SessionStore, hub: &Hub) {
        let envelope: RelayEnvelope = match serde_json::from_str(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(?e, channel = %message.channel, "dropping malformed relay envelope");
                return;
            }
        };
        if envelope.origin == self.instance_id {
            return;
        }

        let quiz_id = envelope.quiz_id.as_str();
        match &envelope.message {
            ServerMessage::QuizDeleted { .. } => sessions.evict(quiz_id),
            m if m.changes_quiz_state() => sessions.refresh(quiz_id).await,
            _ => {}
        }

        let delivered = hub.deliver_local(quiz_id, &envelope.message);
        tracing::debug!(
            %quiz_id,
            event_id = %envelope.event_id,
            origin = %envelope.origin,
            delivered,
            "relayed event delivered"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::Config;
    use crate::db::kv::{MemoryStore, MessageStream};
    use crate::gateway::hub::OutboundQueue;
    use crate::AppState;

    /// A store that refuses subscriptions and otherwise behaves like memory.
    struct NoSubscribe(MemoryStore);

    #[async_trait]
    impl KeyValueStore for NoSubscribe {
        async fn ping(&self) -> Result<(), StoreError> {
            self.0.ping().await
        }
        async fn set_ex(&self, key: &str, value: &str, ttl: u64) -> Result<(), StoreError> {
            self.0.set_ex(key, value, ttl).await
        }
        async fn set_nx_ex(&self, key: &str, value: &str, ttl: u64) -> Result<bool, StoreError> {
            self.0.set_nx_ex(key, value, ttl).await
        }
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key).await
        }
        async fn del(&self, key: &str) -> Result<(), StoreError> {
            self.0.del(key).await
        }
        async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
            self.0.sadd(key, member).await
        }
        async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
            self.0.srem(key, member).await
        }
        async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
            self.0.smembers(key).await
        }
        async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
            self.0.publish(channel, payload).await
        }
        async fn psubscribe(&self, _: &str) -> Result<MessageStream, StoreError> {
            Err(StoreError::Serialization(
                serde_json::from_str::<()>("refused").unwrap_err(),
            ))
        }
    }

    async fn recv(queue: &mut OutboundQueue) -> Option<Arc<str>> {
        tokio::time::timeout(Duration::from_millis(500), queue.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn remote_events_reach_local_clients_once() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let sessions = Arc::new(SessionStore::new(Some(kv.clone()), 60));

        let local = Relay::new(kv.clone(), "inst_local");
        let remote = Relay::new(kv.clone(), "inst_remote");
        let hub = Arc::new(Hub::new(8));
        local.start(sessions, hub.clone()).await.unwrap();
        hub.attach_relay(local.clone());

        let (client, mut queue) = hub.register();
        hub.bind(&client, "quiz_1", "usr_1");

        remote
            .publish("quiz_1", ServerMessage::QuizDeleted { quiz_id: "quiz_1".into() })
            .await;
        let frame = recv(&mut queue).await.expect("relayed frame");
        assert!(frame.contains("quiz_deleted"));

        // Our own publications are skipped by the listener.
        hub.broadcast("quiz_1", ServerMessage::error("local")).await;
        assert!(recv(&mut queue).await.unwrap().contains("local"));
        assert!(recv(&mut queue).await.is_none());
    }

    #[tokio::test]
    async fn failed_subscription_keeps_broadcasts_local() {
        let store = Arc::new(NoSubscribe(MemoryStore::new()));
        let mut published = store.0.psubscribe(TOPIC_PATTERN).await.unwrap();
        let state = AppState::new(Config::default(), Some(store.clone() as Arc<dyn KeyValueStore>));

        assert!(state.start_relay().await.is_err());
        assert!(!state.hub.has_relay());

        let (client, mut queue) = state.hub.register();
        state.hub.bind(&client, "quiz_1", "usr_1");
        state.hub.broadcast("quiz_1", ServerMessage::error("local")).await;

        assert!(recv(&mut queue).await.is_some());
        let leaked = tokio::time::timeout(Duration::from_millis(200), published.next()).await;
        assert!(leaked.is_err(), "broadcast was published without a relay");
    }

    #[test]
    fn topics_match_the_subscription_pattern() {
        assert_eq!(topic("quiz_1"), "quiz:quiz_1");
        assert!(topic("x").starts_with(TOPIC_PATTERN.trim_end_matches('*')));
    }
}
