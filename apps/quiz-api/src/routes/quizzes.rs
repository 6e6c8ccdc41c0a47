//! Quiz endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::actions;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::leaderboard::LeaderboardEntry;
use crate::models::quiz::{Quiz, QuizStats};
use crate::models::user::{Answer, User};
use crate::AppState;

/// Header carrying the participant id when it is not given as a query param.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quizzes", post(create_quiz).get(list_quizzes))
        .route("/quizzes/join", post(join_quiz))
        .route("/quizzes/answer", post(submit_answer))
        .route("/quizzes/{id}", get(get_quiz).delete(delete_quiz))
        .route("/quizzes/{id}/leaderboard", get(get_leaderboard))
        .route("/quizzes/{id}/start", post(start_quiz))
        .route("/quizzes/{id}/end", post(end_quiz))
        .route("/quizzes/{id}/stats", get(get_stats))
}

// ---------------------------------------------------------------------------
// POST /api/v1/quizzes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateQuizRequest {
    pub title: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/quizzes",
    tag = "Quizzes",
    request_body = CreateQuizRequest,
    responses(
        (status = 201, description = "Quiz created", body = Quiz),
        (status = 400, description = "Validation error", body = ApiErrorBody),
    ),
)]
pub async fn create_quiz(
    State(state): State<AppState>,
    Json(body): Json<CreateQuizRequest>,
) -> Result<(StatusCode, Json<Quiz>), ApiError> {
    let quiz = actions::create_quiz(&state, &body.title).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

// ---------------------------------------------------------------------------
// GET /api/v1/quizzes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ListQuizzesResponse {
    pub quizzes: Vec<Quiz>,
    pub count: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/quizzes",
    tag = "Quizzes",
    responses(
        (status = 200, description = "Active quizzes, oldest first", body = ListQuizzesResponse),
    ),
)]
pub async fn list_quizzes(State(state): State<AppState>) -> Json<ListQuizzesResponse> {
    let quizzes = state.sessions.list_quizzes().await;
    Json(ListQuizzesResponse {
        count: quizzes.len(),
        quizzes,
    })
}

// ---------------------------------------------------------------------------
// GET /api/v1/quizzes/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/quizzes/{id}",
    tag = "Quizzes",
    params(
        ("id" = String, Path, description = "Quiz ID"),
    ),
    responses(
        (status = 200, description = "Quiz", body = Quiz),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_quiz(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> Result<Json<Quiz>, ApiError> {
    Ok(Json(state.sessions.get_quiz(&quiz_id).await?))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/quizzes/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/quizzes/{id}",
    tag = "Quizzes",
    params(
        ("id" = String, Path, description = "Quiz ID"),
    ),
    responses(
        (status = 204, description = "Quiz deleted (or never existed)"),
    ),
)]
pub async fn delete_quiz(State(state): State<AppState>, Path(quiz_id): Path<String>) -> StatusCode {
    actions::delete_quiz(&state, &quiz_id).await;
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// POST /api/v1/quizzes/join
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinQuizRequest {
    pub quiz_id: String,
    pub name: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/quizzes/join",
    tag = "Quizzes",
    request_body = JoinQuizRequest,
    responses(
        (status = 200, description = "Joined; the new participant", body = User),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 404, description = "Quiz not found", body = ApiErrorBody),
    ),
)]
pub async fn join_quiz(
    State(state): State<AppState>,
    Json(body): Json<JoinQuizRequest>,
) -> Result<Json<User>, ApiError> {
    if body.quiz_id.trim().is_empty() {
        return Err(ApiError::bad_request("Quiz ID is required"));
    }
    let user = actions::join_quiz(&state, &body.quiz_id, &body.name).await?;
    Ok(Json(user))
}

// ---------------------------------------------------------------------------
// POST /api/v1/quizzes/answer
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub quiz_id: String,
    pub question_id: String,
    pub answer: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    pub answer: Answer,
    pub score: u32,
}

#[utoipa::path(
    post,
    path = "/api/v1/quizzes/answer",
    tag = "Quizzes",
    params(
        ("user_id" = Option<String>, Query, description = "Participant ID (or the X-User-ID header)"),
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer accepted", body = SubmitAnswerResponse),
        (status = 400, description = "Missing user id", body = ApiErrorBody),
        (status = 404, description = "Quiz, user, or question not found", body = ApiErrorBody),
        (status = 409, description = "Already answered, or quiz ended", body = ApiErrorBody),
    ),
)]
pub async fn submit_answer(
    State(state): State<AppState>,
    Query(query): Query<SubmitAnswerQuery>,
    headers: HeaderMap,
    Json(body): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, ApiError> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| {
            headers
                .get(USER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|id| !id.trim().is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| ApiError::bad_request("User ID is required"))?;

    let submission = actions::submit_answer(
        &state,
        &body.quiz_id,
        &user_id,
        &body.question_id,
        body.answer,
    )
    .await?;

    Ok(Json(SubmitAnswerResponse {
        score: submission.user.score,
        answer: submission.answer,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/quizzes/{id}/leaderboard
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/quizzes/{id}/leaderboard",
    tag = "Quizzes",
    params(
        ("id" = String, Path, description = "Quiz ID"),
    ),
    responses(
        (status = 200, description = "Ranked participants", body = [LeaderboardEntry]),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    Ok(Json(state.sessions.leaderboard(&quiz_id).await?))
}

// ---------------------------------------------------------------------------
// POST /api/v1/quizzes/{id}/start, /end
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct QuizStartedResponse {
    pub quiz_id: String,
    pub started_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/api/v1/quizzes/{id}/start",
    tag = "Quizzes",
    params(
        ("id" = String, Path, description = "Quiz ID"),
    ),
    responses(
        (status = 200, description = "Quiz started", body = QuizStartedResponse),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Quiz is not waiting", body = ApiErrorBody),
    ),
)]
pub async fn start_quiz(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizStartedResponse>, ApiError> {
    let started_at = actions::start_quiz(&state, &quiz_id).await?;
    Ok(Json(QuizStartedResponse { quiz_id, started_at }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuizEndedResponse {
    pub quiz_id: String,
    /// Absent when the quiz had already ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

#[utoipa::path(
    post,
    path = "/api/v1/quizzes/{id}/end",
    tag = "Quizzes",
    params(
        ("id" = String, Path, description = "Quiz ID"),
    ),
    responses(
        (status = 200, description = "Quiz ended", body = QuizEndedResponse),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Quiz has not started", body = ApiErrorBody),
    ),
)]
pub async fn end_quiz(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizEndedResponse>, ApiError> {
    let ended_at = actions::end_quiz(&state, &quiz_id).await?;
    Ok(Json(QuizEndedResponse { quiz_id, ended_at }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/quizzes/{id}/stats
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/quizzes/{id}/stats",
    tag = "Quizzes",
    params(
        ("id" = String, Path, description = "Quiz ID"),
    ),
    responses(
        (status = 200, description = "Quiz statistics", body = QuizStats),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_stats(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizStats>, ApiError> {
    Ok(Json(state.sessions.stats(&quiz_id).await?))
}
