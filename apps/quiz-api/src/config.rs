use quizline_common::id::{prefix, prefixed_ulid};

/// Default lifetime of persisted quiz, user, and leaderboard keys (24h).
pub const DEFAULT_STATE_TTL_SECS: u64 = 24 * 60 * 60;

/// Quiz API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Redis connection string. `None` runs the instance without a shared
    /// state channel (single-instance mode).
    pub redis_url: Option<String>,
    /// Identity stamped on every event this instance publishes.
    pub instance_id: String,
    /// Capacity of each client's outbound queue.
    pub client_queue_capacity: usize,
    /// TTL applied to persisted state keys.
    pub state_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            redis_url: None,
            instance_id: prefixed_ulid(prefix::INSTANCE),
            client_queue_capacity: 256,
            state_ttl_secs: DEFAULT_STATE_TTL_SECS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `REDIS_URL` defaults to a local Redis; set it to an empty string to
    /// disable the shared state channel entirely.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            redis_url: match std::env::var("REDIS_URL") {
                Ok(url) if url.trim().is_empty() => None,
                Ok(url) => Some(url),
                Err(_) => Some("redis://localhost:6379/0".to_string()),
            },
            instance_id: std::env::var("INSTANCE_ID")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.instance_id),
            client_queue_capacity: parsed_var("CLIENT_QUEUE_CAPACITY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.client_queue_capacity),
            state_ttl_secs: parsed_var("STATE_TTL_SECS").unwrap_or(defaults.state_ttl_secs),
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
