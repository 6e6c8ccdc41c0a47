//! Scoring and lifecycle rules applied to a quiz under its state lock.

use chrono::{DateTime, Utc};

use crate::error::QuizError;
use crate::models::quiz::{Quiz, QuizStatus};
use crate::models::user::{Answer, User};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_NAME_LEN: usize = 50;

/// An accepted answer together with the participant's updated state.
#[derive(Debug, Clone)]
pub struct Submission {
    pub answer: Answer,
    pub user: User,
}

/// Trim `value` and check it is non-empty and at most `max` characters.
pub fn validate_text(field: &'static str, value: &str, max: usize) -> Result<String, QuizError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(QuizError::validation(field, format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(QuizError::validation(
            field,
            format!("{field} must be {max} characters or fewer"),
        ));
    }
    Ok(value.to_string())
}

/// Whether `user_id` may still answer `question_id`, without recording
/// anything.
pub fn check_answer(quiz: &Quiz, user_id: &str, question_id: &str) -> Result<(), QuizError> {
    if quiz.status == QuizStatus::Ended {
        return Err(QuizError::InvalidState(
            "quiz has ended and no longer accepts answers".to_string(),
        ));
    }

    let user = quiz
        .participants
        .get(user_id)
        .ok_or_else(|| QuizError::user_not_found(user_id))?;

    if user.has_answered(question_id) {
        return Err(QuizError::Conflict(format!(
            "user already answered question {question_id}"
        )));
    }

    quiz.question(question_id)
        .ok_or_else(|| QuizError::question_not_found(question_id))?;
    Ok(())
}

/// Check-and-record an answer. The caller must hold the quiz lock for the
/// whole call so the "already answered" check and the append are atomic.
pub fn apply_answer(
    quiz: &mut Quiz,
    user_id: &str,
    question_id: &str,
    choice: usize,
    now: DateTime<Utc>,
) -> Result<Submission, QuizError> {
    check_answer(quiz, user_id, question_id)?;

    let question = quiz
        .question(question_id)
        .cloned()
        .ok_or_else(|| QuizError::question_not_found(question_id))?;
    let user = quiz
        .participants
        .get_mut(user_id)
        .ok_or_else(|| QuizError::user_not_found(user_id))?;

    let correct = question.is_correct(choice);
    let answer = Answer {
        question_id: question.id,
        answer: choice,
        correct,
        points: if correct { question.points } else { 0 },
        answered_at: now,
    };
    user.record_answer(answer.clone());

    Ok(Submission {
        answer,
        user: user.clone(),
    })
}

/// `Waiting -> Active`.
pub fn start(quiz: &mut Quiz, now: DateTime<Utc>) -> Result<(), QuizError> {
    if quiz.status != QuizStatus::Waiting {
        return Err(QuizError::InvalidState(format!(
            "quiz is {} and cannot be started",
            quiz.status
        )));
    }
    quiz.status = QuizStatus::Active;
    quiz.started_at = Some(now);
    Ok(())
}

/// `Active -> Ended`. Returns `false` when the quiz had already ended.
pub fn end(quiz: &mut Quiz, now: DateTime<Utc>) -> Result<bool, QuizError> {
    match quiz.status {
        QuizStatus::Active => {
            quiz.status = QuizStatus::Ended;
            quiz.ended_at = Some(now);
            Ok(true)
        }
        QuizStatus::Ended => Ok(false),
        QuizStatus::Waiting => Err(QuizError::InvalidState(
            "quiz has not started and cannot be ended".to_string(),
        )),
    }
}
