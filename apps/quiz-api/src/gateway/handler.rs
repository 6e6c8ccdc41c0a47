//! Dispatch of decoded client messages.
//!
//! Every failure is reported to the sender as an `error` frame; the
//! connection stays open.

use crate::actions;
use crate::AppState;

use super::events::{
    ClientMessage, JoinQuizPayload, QuizControlPayload, ServerMessage, SubmitAnswerPayload,
};

pub async fn handle_text(state: &AppState, client_id: &str, text: &str) {
    let message = match ClientMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(%client_id, error = %e, "rejected client message");
            reply(state, client_id, ServerMessage::error(e.to_string()));
            return;
        }
    };

    let result = match message {
        ClientMessage::JoinQuiz(payload) => join(state, client_id, payload).await,
        ClientMessage::SubmitAnswer(payload) => submit(state, client_id, payload).await,
        ClientMessage::StartQuiz(payload) => start(state, client_id, payload).await,
        ClientMessage::EndQuiz(payload) => end(state, client_id, payload).await,
    };

    if let Err(message) = result {
        reply(state, client_id, ServerMessage::error(message));
    }
}

fn reply(state: &AppState, client_id: &str, message: ServerMessage) {
    state.hub.send_to(client_id, &message);
}

async fn join(state: &AppState, client_id: &str, payload: JoinQuizPayload) -> Result<(), String> {
    if payload.quiz_id.trim().is_empty() {
        return Err("Quiz ID and name are required".to_string());
    }

    let user = actions::join_quiz(state, &payload.quiz_id, &payload.name)
        .await
        .map_err(|e| format!("Failed to join quiz: {e}"))?;
    if !state.hub.bind(client_id, &payload.quiz_id, &user.id) {
        tracing::debug!(%client_id, quiz_id = %payload.quiz_id, user_id = %user.id, "client gone before bind");
        return Ok(());
    }

    tracing::info!(%client_id, quiz_id = %payload.quiz_id, user_id = %user.id, "client joined quiz");

    reply(
        state,
        client_id,
        ServerMessage::JoinSuccess {
            user_id: user.id,
            name: user.name,
            quiz_id: payload.quiz_id.clone(),
        },
    );

    // Taken after binding so nothing broadcast in between is missed.
    let quiz = state
        .sessions
        .get_quiz(&payload.quiz_id)
        .await
        .map_err(|e| format!("Failed to load quiz: {e}"))?;
    let leaderboard = quiz.leaderboard();
    reply(state, client_id, ServerMessage::QuizState { quiz, leaderboard });
    Ok(())
}

async fn submit(
    state: &AppState,
    client_id: &str,
    payload: SubmitAnswerPayload,
) -> Result<(), String> {
    let binding = state
        .hub
        .binding(client_id)
        .ok_or_else(|| "Must join a quiz first".to_string())?;

    let submission = actions::submit_answer(
        state,
        &binding.quiz_id,
        &binding.user_id,
        &payload.question_id,
        payload.answer,
    )
    .await
    .map_err(|e| format!("Failed to submit answer: {e}"))?;

    reply(
        state,
        client_id,
        ServerMessage::AnswerSubmitted {
            question_id: submission.answer.question_id,
            answer: submission.answer.answer,
        },
    );
    Ok(())
}

async fn start(state: &AppState, client_id: &str, payload: QuizControlPayload) -> Result<(), String> {
    let quiz_id = control_target(state, client_id, payload)?;
    actions::start_quiz(state, &quiz_id)
        .await
        .map_err(|e| format!("Failed to start quiz: {e}"))?;
    Ok(())
}

async fn end(state: &AppState, client_id: &str, payload: QuizControlPayload) -> Result<(), String> {
    let quiz_id = control_target(state, client_id, payload)?;
    actions::end_quiz(state, &quiz_id)
        .await
        .map_err(|e| format!("Failed to end quiz: {e}"))?;
    Ok(())
}

/// Quiz named by a control message, defaulting to the bound quiz. Only
/// joined connections may control a quiz.
fn control_target(
    state: &AppState,
    client_id: &str,
    payload: QuizControlPayload,
) -> Result<String, String> {
    let binding = state
        .hub
        .binding(client_id)
        .ok_or_else(|| "Must join a quiz first".to_string())?;
    Ok(payload
        .quiz_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(binding.quiz_id))
}
