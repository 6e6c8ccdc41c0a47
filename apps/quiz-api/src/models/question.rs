use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single multiple-choice question. Immutable once attached to a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    /// Index into `options` of the correct choice.
    pub correct: usize,
    pub points: u32,
    pub category: String,
}

impl Question {
    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.correct
    }
}

/// The fixed question set attached to every new quiz.
pub fn question_bank() -> Vec<Question> {
    vec![
        question(
            "q1",
            "What is the capital of Vietnam?",
            &["Hanoi", "Ho Chi Minh City", "Da Nang", "Hue"],
            0,
            10,
            "Geography",
        ),
        question(
            "q2",
            "Which programming language is this quiz server written in?",
            &["Python", "JavaScript", "Rust", "Java"],
            2,
            15,
            "Programming",
        ),
        question(
            "q3",
            "What is Redis primarily used for?",
            &["File storage", "In-memory data store", "Database backup", "Email service"],
            1,
            20,
            "Technology",
        ),
        question(
            "q4",
            "What does WebSocket provide?",
            &["File upload", "Real-time communication", "Database queries", "Email sending"],
            1,
            15,
            "Technology",
        ),
        question(
            "q5",
            "Which data structure gives O(1) average lookup by key?",
            &["Linked list", "Binary heap", "Hash map", "Stack"],
            2,
            10,
            "Programming",
        ),
    ]
}

fn question(
    id: &str,
    text: &str,
    options: &[&str],
    correct: usize,
    points: u32,
    category: &str,
) -> Question {
    Question {
        id: id.to_string(),
        text: text.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct,
        points,
        category: category.to_string(),
    }
}
