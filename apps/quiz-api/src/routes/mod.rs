pub mod health;
pub mod quizzes;
pub mod users;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v1",
            health::router()
                .merge(quizzes::router())
                .merge(users::router()),
        )
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Quizline API", description = "Real-time multiplayer quiz coordination"),
    paths(
        // Health
        health::health,
        // Quizzes
        quizzes::create_quiz,
        quizzes::list_quizzes,
        quizzes::get_quiz,
        quizzes::delete_quiz,
        quizzes::join_quiz,
        quizzes::submit_answer,
        quizzes::get_leaderboard,
        quizzes::start_quiz,
        quizzes::end_quiz,
        quizzes::get_stats,
        // Users
        users::get_user,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::quiz::Quiz,
            crate::models::quiz::QuizStatus,
            crate::models::quiz::QuizStats,
            crate::models::question::Question,
            crate::models::user::User,
            crate::models::user::Answer,
            crate::models::leaderboard::LeaderboardEntry,
            // Route request/response types
            health::HealthResponse,
            quizzes::CreateQuizRequest,
            quizzes::ListQuizzesResponse,
            quizzes::JoinQuizRequest,
            quizzes::SubmitAnswerRequest,
            quizzes::SubmitAnswerResponse,
            quizzes::QuizStartedResponse,
            quizzes::QuizEndedResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Quizzes", description = "Quiz lifecycle, answers, and leaderboards"),
        (name = "Users", description = "Quiz participants"),
    )
)]
pub struct ApiDoc;
