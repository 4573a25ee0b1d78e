//! Durable storage for books and quizzes.
//!
//! [`Database`] is the PostgreSQL implementation; the pipeline depends
//! only on the [`BookStore`] and [`QuizStore`] traits so the generation
//! workflow can be exercised against in-memory stores in tests.

pub mod database;
pub mod migrations;
pub mod schema;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Book, Quiz, QuizState, QuizStatus};

pub use database::{Database, DatabaseError, QuizStatusCounts};
pub use migrations::{MigrationError, MigrationRunner};

/// Read/update access to book records.
///
/// `update_quiz_status` leaves `quiz_id` untouched when `quiz_id` is
/// `None`; passing `Some` stamps both columns in one statement.
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn get_book(&self, id: Uuid) -> Result<Option<Book>, DatabaseError>;

    async fn insert_book(&self, book: &Book) -> Result<(), DatabaseError>;

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, DatabaseError>;

    async fn update_quiz_status(
        &self,
        id: Uuid,
        status: QuizStatus,
        quiz_id: Option<Uuid>,
    ) -> Result<(), DatabaseError>;

    async fn find_by_quiz_status(
        &self,
        statuses: &[QuizStatus],
    ) -> Result<Vec<Book>, DatabaseError>;

    async fn quiz_status_counts(&self) -> Result<QuizStatusCounts, DatabaseError>;
}

/// Access to stored quizzes.
///
/// `create_quiz` enforces the one-quiz-per-book uniqueness constraint and
/// fails when a row for the book already exists.
#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn create_quiz(&self, quiz: &Quiz) -> Result<(), DatabaseError>;

    async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>, DatabaseError>;

    async fn find_by_book_and_status(
        &self,
        book_id: Uuid,
        status: QuizState,
    ) -> Result<Option<Quiz>, DatabaseError>;

    /// Deletes quizzes for the book in the given state, returning how many
    /// rows were removed.
    async fn delete_by_book_and_status(
        &self,
        book_id: Uuid,
        status: QuizState,
    ) -> Result<u64, DatabaseError>;
}
