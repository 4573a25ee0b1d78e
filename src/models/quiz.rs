//! Quiz artifact and question types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a stored quiz row.
///
/// Distinct from [`super::QuizStatus`], which tracks the owning book's
/// generation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizState {
    /// Generation succeeded; `questions` holds the full set.
    Completed,
    /// Generation exhausted its retry budget; the row is a failure marker.
    Failed,
    /// A retry is in flight for this quiz.
    Retrying,
}

impl QuizState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizState::Completed => "completed",
            QuizState::Failed => "failed",
            QuizState::Retrying => "retrying",
        }
    }
}

impl std::fmt::Display for QuizState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuizState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(QuizState::Completed),
            "failed" => Ok(QuizState::Failed),
            "retrying" => Ok(QuizState::Retrying),
            other => Err(format!("unknown quiz state '{}'", other)),
        }
    }
}

/// A single multiple-choice question.
///
/// All four fields are mandatory; `options` must hold exactly four
/// entries. The generation client validates this before a quiz is
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub explanation: String,
}

/// Wire shape of the generation backend's JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizData {
    pub quiz: Vec<QuizQuestion>,
}

/// A generated quiz, one-to-one with a book.
///
/// Created only by pipeline workers: either as a completed quiz after a
/// successful generation, or as a failure marker after retry exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub book_id: Uuid,
    pub questions: Vec<QuizQuestion>,
    pub ai_model: String,
    pub status: QuizState,
    pub retry_count: i32,
    pub error_log: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quiz {
    /// A completed quiz produced by a successful generation attempt.
    pub fn completed(
        book_id: Uuid,
        ai_model: impl Into<String>,
        questions: Vec<QuizQuestion>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            book_id,
            questions,
            ai_model: ai_model.into(),
            status: QuizState::Completed,
            retry_count: 0,
            error_log: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A failure marker persisted after the retry budget is exhausted.
    ///
    /// Holds no questions; `retry_count` records the configured limit and
    /// `error_log` the last attempt's error message.
    pub fn failure_marker(
        book_id: Uuid,
        ai_model: impl Into<String>,
        retry_limit: u32,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            book_id,
            questions: Vec::new(),
            ai_model: ai_model.into(),
            status: QuizState::Failed,
            retry_count: retry_limit as i32,
            error_log: error.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
