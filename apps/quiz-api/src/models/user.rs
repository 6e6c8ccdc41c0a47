use chrono::{DateTime, Utc};
use quizline_common::id::{prefix, PrefixedId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A participant in a quiz.
///
/// `score` is derived from `answers` and is only changed through
/// [`User::record_answer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub answers: Vec<Answer>,
    pub joined_at: DateTime<Utc>,
}

/// One accepted answer. At most one exists per question for a given user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Answer {
    pub question_id: String,
    pub answer: usize,
    pub correct: bool,
    pub points: u32,
    pub answered_at: DateTime<Utc>,
}

impl PrefixedId for User {
    const PREFIX: &'static str = prefix::USER;
}

impl User {
    pub fn new(name: String) -> Self {
        Self {
            id: Self::generate_id(),
            name,
            score: 0,
            answers: Vec::new(),
            joined_at: Utc::now(),
        }
    }

    pub fn has_answered(&self, question_id: &str) -> bool {
        self.answers.iter().any(|a| a.question_id == question_id)
    }

    /// Append an answer and recompute the score from the answer log.
    pub fn record_answer(&mut self, answer: Answer) {
        self.answers.push(answer);
        self.score = self.recomputed_score();
    }

    /// Fold another copy of this participant in. Answers are unioned by
    /// question; when both copies answered the same question the earlier
    /// answer wins, then the lower choice.
    pub fn merge(&mut self, other: User) {
        for answer in other.answers {
            match self.answers.iter_mut().find(|a| a.question_id == answer.question_id) {
                Some(existing) => {
                    if (answer.answered_at, answer.answer) < (existing.answered_at, existing.answer) {
                        *existing = answer;
                    }
                }
                None => self.answers.push(answer),
            }
        }
        self.answers
            .sort_by(|a, b| a.answered_at.cmp(&b.answered_at).then_with(|| a.question_id.cmp(&b.question_id)));
        self.joined_at = self.joined_at.min(other.joined_at);
        self.score = self.recomputed_score();
    }

    /// Sum of points over correct answers.
    pub fn recomputed_score(&self) -> u32 {
        self.answers
            .iter()
            .filter(|a| a.correct)
            .map(|a| a.points)
            .sum()
    }
}
