//! PostgreSQL store for books and quizzes.
//!
//! All operations are single-row reads/updates; the generation workflow's
//! cross-step atomicity is intentionally not transactional (the workflow
//! heals a torn write by re-stamping status from the stored quiz on the
//! next pass).

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Book, Quiz, QuizQuestion, QuizState, QuizStatus};

use super::migrations::MigrationRunner;
use super::{BookStore, QuizStore};

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A stored value could not be mapped back to a domain type.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] super::migrations::MigrationError),
}

/// Counts of books per quiz status, used by the pipeline stats surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QuizStatusCounts {
    pub total: i64,
    pub pending: i64,
    pub generating: i64,
    pub completed: i64,
    pub failed: i64,
}

/// PostgreSQL database client.
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connects to the database and returns a new client.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Creates a new database client from an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let runner = MigrationRunner::new(self.pool.clone());
        runner.run_migrations().await?;
        Ok(())
    }
}

fn book_from_row(row: &PgRow) -> Result<Book, DatabaseError> {
    let status: String = row.get("quiz_status");
    let quiz_status: QuizStatus = status.parse().map_err(DatabaseError::InvalidData)?;

    Ok(Book {
        id: row.get("id"),
        title: row.get("title"),
        authors: row.get("authors"),
        isbn: row.get("isbn"),
        isbn13: row.get("isbn13"),
        description: row.get("description"),
        publisher: row.get("publisher"),
        published_date: row.get("published_date"),
        page_count: row.get("page_count"),
        categories: row.get("categories"),
        language: row.get("language"),
        cover_url: row.get("cover_url"),
        thumbnail_url: row.get("thumbnail_url"),
        source_data: row.get("source_data"),
        data_sources: row.get("data_sources"),
        quiz_id: row.get("quiz_id"),
        quiz_status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn quiz_from_row(row: &PgRow) -> Result<Quiz, DatabaseError> {
    let status: String = row.get("status");
    let quiz_state: QuizState = status.parse().map_err(DatabaseError::InvalidData)?;

    let questions_json: serde_json::Value = row.get("questions");
    let questions: Vec<QuizQuestion> = serde_json::from_value(questions_json)?;

    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");

    Ok(Quiz {
        id: row.get("id"),
        book_id: row.get("book_id"),
        questions,
        ai_model: row.get("ai_model"),
        status: quiz_state,
        retry_count: row.get("retry_count"),
        error_log: row.get("error_log"),
        created_at,
        updated_at,
    })
}

const SELECT_BOOK_COLUMNS: &str = r#"
    SELECT id, title, authors, isbn, isbn13, description, publisher,
           published_date, page_count, categories, language, cover_url,
           thumbnail_url, source_data, data_sources, quiz_id, quiz_status,
           created_at, updated_at
    FROM books
"#;

#[async_trait::async_trait]
impl BookStore for Database {
    async fn get_book(&self, id: Uuid) -> Result<Option<Book>, DatabaseError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(book_from_row).transpose()
    }

    async fn insert_book(&self, book: &Book) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO books (
                id, title, authors, isbn, isbn13, description, publisher,
                published_date, page_count, categories, language, cover_url,
                thumbnail_url, source_data, data_sources, quiz_id, quiz_status,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                      $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.authors)
        .bind(&book.isbn)
        .bind(&book.isbn13)
        .bind(&book.description)
        .bind(&book.publisher)
        .bind(&book.published_date)
        .bind(book.page_count)
        .bind(&book.categories)
        .bind(&book.language)
        .bind(&book.cover_url)
        .bind(&book.thumbnail_url)
        .bind(&book.source_data)
        .bind(&book.data_sources)
        .bind(book.quiz_id)
        .bind(book.quiz_status.as_str())
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, DatabaseError> {
        let row = sqlx::query(&format!(
            "{} WHERE isbn = $1 OR isbn13 = $1",
            SELECT_BOOK_COLUMNS
        ))
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(book_from_row).transpose()
    }

    async fn update_quiz_status(
        &self,
        id: Uuid,
        status: QuizStatus,
        quiz_id: Option<Uuid>,
    ) -> Result<(), DatabaseError> {
        let result = match quiz_id {
            Some(quiz_id) => {
                sqlx::query(
                    "UPDATE books SET quiz_status = $2, quiz_id = $3, updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(status.as_str())
                .bind(quiz_id)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "UPDATE books SET quiz_status = $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Book {}", id)));
        }

        Ok(())
    }

    async fn find_by_quiz_status(
        &self,
        statuses: &[QuizStatus],
    ) -> Result<Vec<Book>, DatabaseError> {
        let status_strings: Vec<String> =
            statuses.iter().map(|s| s.as_str().to_string()).collect();

        let rows = sqlx::query(&format!(
            "{} WHERE quiz_status = ANY($1) ORDER BY created_at",
            SELECT_BOOK_COLUMNS
        ))
        .bind(&status_strings)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(book_from_row).collect()
    }

    async fn quiz_status_counts(&self) -> Result<QuizStatusCounts, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE quiz_status = 'pending') AS pending,
                   COUNT(*) FILTER (WHERE quiz_status = 'generating') AS generating,
                   COUNT(*) FILTER (WHERE quiz_status = 'completed') AS completed,
                   COUNT(*) FILTER (WHERE quiz_status = 'failed') AS failed
            FROM books
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QuizStatusCounts {
            total: row.get("total"),
            pending: row.get("pending"),
            generating: row.get("generating"),
            completed: row.get("completed"),
            failed: row.get("failed"),
        })
    }
}

#[async_trait::async_trait]
impl QuizStore for Database {
    async fn create_quiz(&self, quiz: &Quiz) -> Result<(), DatabaseError> {
        let questions_json = serde_json::to_value(&quiz.questions)?;

        sqlx::query(
            r#"
            INSERT INTO quizzes (
                id, book_id, questions, ai_model, status, retry_count,
                error_log, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(quiz.id)
        .bind(quiz.book_id)
        .bind(&questions_json)
        .bind(&quiz.ai_model)
        .bind(quiz.status.as_str())
        .bind(quiz.retry_count)
        .bind(&quiz.error_log)
        .bind(quiz.created_at)
        .bind(quiz.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT id, book_id, questions, ai_model, status, retry_count,
                   error_log, created_at, updated_at
            FROM quizzes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(quiz_from_row).transpose()
    }

    async fn find_by_book_and_status(
        &self,
        book_id: Uuid,
        status: QuizState,
    ) -> Result<Option<Quiz>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT id, book_id, questions, ai_model, status, retry_count,
                   error_log, created_at, updated_at
            FROM quizzes
            WHERE book_id = $1 AND status = $2
            "#,
        )
        .bind(book_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(quiz_from_row).transpose()
    }

    async fn delete_by_book_and_status(
        &self,
        book_id: Uuid,
        status: QuizState,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM quizzes WHERE book_id = $1 AND status = $2")
            .bind(book_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
