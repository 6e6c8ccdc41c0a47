use std::collections::HashMap;

use chrono::{DateTime, Utc};
use quizline_common::id::{prefix, PrefixedId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::leaderboard::{self, LeaderboardEntry};
use super::question::Question;
use super::user::User;

/// Lifecycle of a quiz. Transitions only move forward:
/// `Waiting -> Active -> Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Waiting,
    Active,
    Ended,
}

impl std::fmt::Display for QuizStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub questions: Vec<Question>,
    pub participants: HashMap<String, User>,
    pub status: QuizStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl PrefixedId for Quiz {
    const PREFIX: &'static str = prefix::QUIZ;
}

impl Quiz {
    pub fn new(title: String, questions: Vec<Question>) -> Self {
        Self {
            id: Self::generate_id(),
            title,
            questions,
            participants: HashMap::new(),
            status: QuizStatus::Waiting,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        leaderboard::rank(self.participants.values())
    }

    /// Fold another copy of this quiz in, as written by a different instance.
    ///
    /// Participants are unioned and merged per user, the status takes the
    /// furthest point reached, and each timestamp keeps its earliest value.
    /// The result does not depend on which copy is `self`.
    pub fn merge(&mut self, other: Quiz) {
        for (user_id, user) in other.participants {
            match self.participants.get_mut(&user_id) {
                Some(existing) => existing.merge(user),
                None => {
                    self.participants.insert(user_id, user);
                }
            }
        }
        self.status = self.status.max(other.status);
        self.started_at = earliest(self.started_at, other.started_at);
        self.ended_at = earliest(self.ended_at, other.ended_at);
        self.created_at = self.created_at.min(other.created_at);
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Aggregate figures for a quiz.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizStats {
    pub quiz_id: String,
    pub title: String,
    pub status: QuizStatus,
    pub total_participants: usize,
    pub total_questions: usize,
    pub total_answers: usize,
    pub correct_answers: usize,
    pub accuracy_percent: f64,
    pub total_score: u64,
    pub average_score: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&Quiz> for QuizStats {
    fn from(quiz: &Quiz) -> Self {
        let total_participants = quiz.participants.len();
        let answers = quiz.participants.values().flat_map(|u| u.answers.iter());
        let (total_answers, correct_answers) =
            answers.fold((0, 0), |(total, correct), a| (total + 1, correct + a.correct as usize));
        let total_score: u64 = quiz.participants.values().map(|u| u.score as u64).sum();

        let accuracy_percent = if total_answers > 0 {
            correct_answers as f64 / total_answers as f64 * 100.0
        } else {
            0.0
        };
        let average_score = if total_participants > 0 {
            total_score as f64 / total_participants as f64
        } else {
            0.0
        };

        Self {
            quiz_id: quiz.id.clone(),
            title: quiz.title.clone(),
            status: quiz.status,
            total_participants,
            total_questions: quiz.questions.len(),
            total_answers,
            correct_answers,
            accuracy_percent,
            total_score,
            average_score,
            created_at: quiz.created_at,
            started_at: quiz.started_at,
            ended_at: quiz.ended_at,
        }
    }
}
