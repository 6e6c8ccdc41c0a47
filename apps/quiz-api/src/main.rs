use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use quiz_api::config::Config;
use quiz_api::db::kv::KeyValueStore;
use quiz_api::db::redis_store::RedisStore;
use quiz_api::routes::ApiDoc;
use quiz_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // The shared store is probed once; without it this instance runs alone.
    let kv: Option<Arc<dyn KeyValueStore>> = match &config.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => {
                tracing::info!("connected to redis");
                Some(Arc::new(store) as Arc<dyn KeyValueStore>)
            }
            Err(e) => {
                tracing::warn!(?e, "redis unavailable; running in single-instance mode");
                None
            }
        },
        None => {
            tracing::info!("REDIS_URL is empty; running in single-instance mode");
            None
        }
    };

    tracing::info!(instance_id = %config.instance_id, "quiz-api configured");

    let state = AppState::new(config, kv);
    state.sessions.warm().await;
    if let Err(e) = state.start_relay().await {
        tracing::warn!(?e, "relay subscription failed; events stay on this instance");
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(quiz_api::routes::router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "quiz-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .expect("server error");
}
