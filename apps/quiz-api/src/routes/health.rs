use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// `connected`, or `disconnected` in single-instance mode.
    pub store: String,
    pub instance_id: String,
    pub quizzes: usize,
    pub clients: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse),
    ),
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        store: if state.sessions.is_persistent() {
            "connected"
        } else {
            "disconnected"
        }
        .to_string(),
        instance_id: state.config.instance_id.clone(),
        quizzes: state.sessions.quiz_count(),
        clients: state.hub.client_count(),
    })
}
