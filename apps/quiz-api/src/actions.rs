//! Quiz mutations shared by the HTTP and WebSocket surfaces.
//!
//! Each state-changing action holds the quiz's turn from the mutation until
//! its events are handed to the hub, so clients observe events in the order
//! the mutations were applied.

use chrono::{DateTime, Utc};

use crate::error::QuizError;
use crate::gateway::events::ServerMessage;
use crate::models::quiz::Quiz;
use crate::models::user::User;
use crate::session::rules::Submission;
use crate::AppState;

pub async fn create_quiz(state: &AppState, title: &str) -> Result<Quiz, QuizError> {
    state.sessions.create_quiz(title).await
}

/// Join, then announce the newcomer and the updated leaderboard.
pub async fn join_quiz(state: &AppState, quiz_id: &str, name: &str) -> Result<User, QuizError> {
    let _turn = state.sessions.turn(quiz_id).await?;
    let user = state.sessions.join_quiz(quiz_id, name).await?;

    state
        .hub
        .broadcast(
            quiz_id,
            ServerMessage::UserJoined {
                user_id: user.id.clone(),
                name: user.name.clone(),
            },
        )
        .await;
    broadcast_leaderboard(state, quiz_id).await;

    Ok(user)
}

pub async fn submit_answer(
    state: &AppState,
    quiz_id: &str,
    user_id: &str,
    question_id: &str,
    choice: usize,
) -> Result<Submission, QuizError> {
    let _turn = state.sessions.turn(quiz_id).await?;
    let submission = state
        .sessions
        .submit_answer(quiz_id, user_id, question_id, choice)
        .await?;

    state
        .hub
        .broadcast(
            quiz_id,
            ServerMessage::ScoreUpdate {
                user_id: submission.user.id.clone(),
                name: submission.user.name.clone(),
                score: submission.user.score,
            },
        )
        .await;
    broadcast_leaderboard(state, quiz_id).await;

    Ok(submission)
}

pub async fn start_quiz(state: &AppState, quiz_id: &str) -> Result<DateTime<Utc>, QuizError> {
    let _turn = state.sessions.turn(quiz_id).await?;
    let started_at = state.sessions.start_quiz(quiz_id).await?;

    state
        .hub
        .broadcast(
            quiz_id,
            ServerMessage::QuizStarted {
                quiz_id: quiz_id.to_string(),
                started_at,
            },
        )
        .await;
    Ok(started_at)
}

/// `None` when the quiz had already ended; nothing is broadcast then.
pub async fn end_quiz(state: &AppState, quiz_id: &str) -> Result<Option<DateTime<Utc>>, QuizError> {
    let _turn = state.sessions.turn(quiz_id).await?;
    let Some(ended_at) = state.sessions.end_quiz(quiz_id).await? else {
        return Ok(None);
    };

    state
        .hub
        .broadcast(
            quiz_id,
            ServerMessage::QuizEnded {
                quiz_id: quiz_id.to_string(),
                ended_at,
            },
        )
        .await;
    Ok(Some(ended_at))
}

/// Remove a quiz everywhere. Deleting an unknown quiz is a no-op.
pub async fn delete_quiz(state: &AppState, quiz_id: &str) {
    let turn = state.sessions.turn(quiz_id).await.ok();
    state.sessions.delete_quiz(quiz_id).await;

    if turn.is_some() {
        state
            .hub
            .broadcast(
                quiz_id,
                ServerMessage::QuizDeleted {
                    quiz_id: quiz_id.to_string(),
                },
            )
            .await;
    }
}

async fn broadcast_leaderboard(state: &AppState, quiz_id: &str) {
    match state.sessions.leaderboard(quiz_id).await {
        Ok(board) => {
            state
                .hub
                .broadcast(quiz_id, ServerMessage::LeaderboardUpdate(board))
                .await
        }
        Err(e) => tracing::warn!(%e, %quiz_id, "leaderboard unavailable after mutation"),
    }
}
