use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{ApiError, ApiErrorBody};
use crate::models::user::User;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/users/{id}", get(get_user))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "Users",
    params(
        ("id" = String, Path, description = "Participant ID"),
    ),
    responses(
        (status = 200, description = "Participant", body = User),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.sessions.get_user(&user_id).await?))
}
