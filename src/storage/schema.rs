//! Database schema definitions.
//!
//! Every statement is idempotent (`IF NOT EXISTS`) so the migration runner
//! can replay the full list safely.

/// Books table: one row per merged bibliographic record.
pub const CREATE_BOOKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    authors TEXT[] NOT NULL DEFAULT '{}',
    isbn TEXT NOT NULL UNIQUE,
    isbn13 TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    publisher TEXT NOT NULL DEFAULT '',
    published_date TEXT NOT NULL DEFAULT '',
    page_count INTEGER NOT NULL DEFAULT 0,
    categories TEXT[] NOT NULL DEFAULT '{}',
    language TEXT NOT NULL DEFAULT '',
    cover_url TEXT NOT NULL DEFAULT '',
    thumbnail_url TEXT NOT NULL DEFAULT '',
    source_data JSONB,
    data_sources TEXT[] NOT NULL DEFAULT '{}',
    quiz_id UUID,
    quiz_status TEXT NOT NULL DEFAULT 'pending',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Index used by the retry sweep and the stats query.
pub const CREATE_BOOKS_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_books_quiz_status ON books (quiz_status)
"#;

/// Quizzes table: at most one row per book, enforced by the unique
/// constraint on book_id (failed markers are deleted before a new attempt).
pub const CREATE_QUIZZES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quizzes (
    id UUID PRIMARY KEY,
    book_id UUID NOT NULL UNIQUE REFERENCES books(id) ON DELETE CASCADE,
    questions JSONB NOT NULL,
    ai_model TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'completed',
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_log TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_QUIZZES_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_quizzes_status ON quizzes (status)
"#;

/// All schema statements in creation order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_BOOKS_TABLE,
        CREATE_BOOKS_STATUS_INDEX,
        CREATE_QUIZZES_TABLE,
        CREATE_QUIZZES_STATUS_INDEX,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for statement in all_schema_statements() {
            assert!(statement.contains("IF NOT EXISTS"));
        }
    }

    #[test]
    fn test_tables_come_before_their_indexes() {
        let statements = all_schema_statements();
        let books = statements
            .iter()
            .position(|s| s.contains("TABLE IF NOT EXISTS books"))
            .expect("books table present");
        let books_index = statements
            .iter()
            .position(|s| s.contains("idx_books_quiz_status"))
            .expect("books index present");

        assert!(books < books_index);
    }
}
