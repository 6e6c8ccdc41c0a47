//! Wire format of the quiz WebSocket and of relayed events.
//!
//! Every frame is `{"type": <name>, "payload": <body>}`. Inbound frames are
//! decoded once into a closed [`ClientMessage`]; a mismatched shape fails
//! with a [`DecodeError`] instead of leaking an untyped value downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::leaderboard::LeaderboardEntry;
use crate::models::quiz::Quiz;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoinQuizPayload {
    pub quiz_id: String,
    pub name: String,
}

/// `quiz_id` is accepted for compatibility; the connection's bound quiz wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitAnswerPayload {
    #[serde(default)]
    pub quiz_id: Option<String>,
    pub question_id: String,
    pub answer: usize,
}

/// Body of `start_quiz` and `end_quiz`. Falls back to the bound quiz.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QuizControlPayload {
    #[serde(default)]
    pub quiz_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    JoinQuiz(JoinQuizPayload),
    SubmitAnswer(SubmitAnswerPayload),
    StartQuiz(QuizControlPayload),
    EndQuiz(QuizControlPayload),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid message format")]
    Malformed(#[source] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let raw: RawClientMessage = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
        let payload = match raw.payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        match raw.kind.as_str() {
            "join_quiz" => payload_as("join_quiz", payload).map(Self::JoinQuiz),
            "submit_answer" => payload_as("submit_answer", payload).map(Self::SubmitAnswer),
            "start_quiz" => payload_as("start_quiz", payload).map(Self::StartQuiz),
            "end_quiz" => payload_as("end_quiz", payload).map(Self::EndQuiz),
            _ => Err(DecodeError::UnknownType(raw.kind)),
        }
    }
}

fn payload_as<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    payload: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::InvalidPayload { kind, source })
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    JoinSuccess {
        user_id: String,
        name: String,
        quiz_id: String,
    },
    QuizState {
        quiz: Quiz,
        leaderboard: Vec<LeaderboardEntry>,
    },
    UserJoined {
        user_id: String,
        name: String,
    },
    ScoreUpdate {
        user_id: String,
        name: String,
        score: u32,
    },
    LeaderboardUpdate(Vec<LeaderboardEntry>),
    QuizStarted {
        quiz_id: String,
        started_at: DateTime<Utc>,
    },
    QuizEnded {
        quiz_id: String,
        ended_at: DateTime<Utc>,
    },
    AnswerSubmitted {
        question_id: String,
        answer: usize,
    },
    QuizDeleted {
        quiz_id: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether a remote copy of this event means the quiz changed in the
    /// shared store.
    pub fn changes_quiz_state(&self) -> bool {
        matches!(
            self,
            Self::UserJoined { .. }
                | Self::ScoreUpdate { .. }
                | Self::QuizStarted { .. }
                | Self::QuizEnded { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Relay envelope
// ---------------------------------------------------------------------------

/// An event as published on the shared state channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub event_id: String,
    /// Instance id of the publisher.
    pub origin: String,
    pub quiz_id: String,
    pub message: ServerMessage,
}
