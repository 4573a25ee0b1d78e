//! Bibliographic metadata sources.
//!
//! Each provider client normalizes its API's response into [`BookData`];
//! [`merger::BookMerger`] queries all providers and folds their results
//! into a single [`crate::models::Book`] with field-level priority.

pub mod google_books;
pub mod merger;
pub mod open_library;

use thiserror::Error;

pub use google_books::GoogleBooksClient;
pub use merger::BookMerger;
pub use open_library::OpenLibraryClient;

/// Errors that can occur querying a metadata source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The API returned a non-success status.
    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    DecodeFailed(String),

    /// The query matched no books.
    #[error("No books found for query")]
    NotFound,

    /// No source returned a record for the query.
    #[error("Book not found in any source")]
    NotFoundAnywhere,
}

/// What a search query matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchKind {
    Isbn,
    Title,
    Author,
}

/// Normalized book metadata from a single source.
#[derive(Debug, Clone, Default)]
pub struct BookData {
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
    /// Source name, e.g. `"google_books"`.
    pub source: &'static str,
    /// The provider's raw response, kept on the book for debugging.
    pub raw: serde_json::Value,
}
