pub mod actions;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod session;

use std::sync::Arc;

use config::Config;
use db::kv::KeyValueStore;
use error::StoreError;
use gateway::hub::Hub;
use gateway::relay::Relay;
use session::SessionStore;
use tokio::task::JoinHandle;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub hub: Arc<Hub>,
    /// Shared state channel. `None` in single-instance mode.
    pub kv: Option<Arc<dyn KeyValueStore>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the session store and hub around an optional shared store. The
    /// hub publishes to other instances only once [`AppState::start_relay`]
    /// has subscribed.
    pub fn new(config: Config, kv: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(kv.clone(), config.state_ttl_secs)),
            hub: Arc::new(Hub::new(config.client_queue_capacity)),
            kv,
            config: Arc::new(config),
        }
    }

    /// Subscribe to other instances' events and attach the relay to the hub.
    /// Returns `None` in single-instance mode. On error the hub keeps its
    /// broadcasts local.
    pub async fn start_relay(&self) -> Result<Option<JoinHandle<()>>, StoreError> {
        let Some(kv) = &self.kv else {
            return Ok(None);
        };
        let relay = Relay::new(kv.clone(), self.config.instance_id.clone());
        let handle = relay
            .start(self.sessions.clone(), self.hub.clone())
            .await?;
        self.hub.attach_relay(relay);
        Ok(Some(handle))
    }
}
