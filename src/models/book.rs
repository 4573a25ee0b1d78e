//! Book record and its quiz-generation status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quiz-generation status of a book.
///
/// Transitions are performed only by pipeline workers: `Pending ->
/// Generating -> Completed | Failed`. The periodic retry sweep resets
/// `Failed` back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    /// No generation attempt has been scheduled yet.
    Pending,
    /// A worker is currently running the generation workflow.
    Generating,
    /// A completed quiz exists for this book.
    Completed,
    /// The last generation workflow exhausted its retry budget.
    Failed,
}

impl QuizStatus {
    /// The string stored in the `quiz_status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Pending => "pending",
            QuizStatus::Generating => "generating",
            QuizStatus::Completed => "completed",
            QuizStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QuizStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuizStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QuizStatus::Pending),
            "generating" => Ok(QuizStatus::Generating),
            "completed" => Ok(QuizStatus::Completed),
            "failed" => Ok(QuizStatus::Failed),
            other => Err(format!("unknown quiz status '{}'", other)),
        }
    }
}

/// A bibliographic record merged from one or more metadata sources.
///
/// Descriptive fields (title, authors, description, categories, publisher,
/// published date) feed the quiz generation prompt. `quiz_status` and
/// `quiz_id` are owned by the pipeline workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub isbn: String,
    pub isbn13: String,
    pub description: String,
    pub publisher: String,
    pub published_date: String,
    pub page_count: i32,
    pub categories: Vec<String>,
    pub language: String,
    pub cover_url: String,
    pub thumbnail_url: String,
    /// Raw provider payloads kept for debugging, keyed by source name.
    pub source_data: Option<serde_json::Value>,
    /// Which providers contributed to this record (e.g. "google_books").
    pub data_sources: Vec<String>,
    pub quiz_id: Option<Uuid>,
    pub quiz_status: QuizStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Creates a book with a fresh id, `Pending` quiz status, and empty
    /// descriptive fields.
    pub fn new(title: impl Into<String>, isbn: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            authors: Vec::new(),
            isbn: isbn.into(),
            isbn13: String::new(),
            description: String::new(),
            publisher: String::new(),
            published_date: String::new(),
            page_count: 0,
            categories: Vec::new(),
            language: String::new(),
            cover_url: String::new(),
            thumbnail_url: String::new(),
            source_data: None,
            data_sources: Vec::new(),
            quiz_id: None,
            quiz_status: QuizStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the quiz status (builder form, used by tests and fixtures).
    pub fn with_quiz_status(mut self, status: QuizStatus) -> Self {
        self.quiz_status = status;
        self
    }
}
