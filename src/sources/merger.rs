//! Multi-source book lookup and field-priority merge.

use tracing::{info, warn};

use crate::models::Book;

use super::{google_books, open_library, BookData, GoogleBooksClient, OpenLibraryClient, SearchKind, SourceError};

/// Queries all metadata sources and merges their results into one book.
///
/// Google Books data wins field by field; Open Library fills in anything
/// Google leaves empty. A query that misses in one source still succeeds
/// as long as the other finds something.
pub struct BookMerger {
    google_books: GoogleBooksClient,
    open_library: OpenLibraryClient,
}

impl BookMerger {
    pub fn new(google_books_api_key: Option<String>) -> Result<Self, SourceError> {
        Ok(Self {
            google_books: GoogleBooksClient::new(google_books_api_key)?,
            open_library: OpenLibraryClient::new()?,
        })
    }

    /// Searches both sources and returns a merged book in `Pending`
    /// quiz status.
    pub async fn search_book(&self, query: &str, kind: SearchKind) -> Result<Book, SourceError> {
        let google = match self.google_books.search(query, kind).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(query, error = %e, "google books lookup failed");
                None
            }
        };

        let open_library = match self.open_library.search(query, kind).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(query, error = %e, "open library lookup failed");
                None
            }
        };

        if google.is_none() && open_library.is_none() {
            return Err(SourceError::NotFoundAnywhere);
        }

        let book = merge_book_data(google, open_library);
        info!(
            title = %book.title,
            isbn = %book.isbn,
            sources = ?book.data_sources,
            "merged book record"
        );

        Ok(book)
    }
}

fn prefer_non_empty(primary: String, secondary: String) -> String {
    if primary.is_empty() {
        secondary
    } else {
        primary
    }
}

fn prefer_non_empty_vec(primary: Vec<String>, secondary: Vec<String>) -> Vec<String> {
    if primary.is_empty() {
        secondary
    } else {
        primary
    }
}

/// Folds per-source records into one book, Google Books first.
pub fn merge_book_data(google: Option<BookData>, open_library: Option<BookData>) -> Book {
    let mut sources = Vec::new();
    let mut source_data = serde_json::Map::new();

    if let Some(data) = &google {
        sources.push(google_books::SOURCE_NAME.to_string());
        source_data.insert(google_books::SOURCE_NAME.to_string(), data.raw.clone());
    }
    if let Some(data) = &open_library {
        sources.push(open_library::SOURCE_NAME.to_string());
        source_data.insert(open_library::SOURCE_NAME.to_string(), data.raw.clone());
    }

    let primary = google.unwrap_or_default();
    let secondary = open_library.unwrap_or_default();

    let mut book = Book::new(
        prefer_non_empty(primary.title, secondary.title),
        prefer_non_empty(primary.isbn, secondary.isbn),
    );

    book.authors = prefer_non_empty_vec(primary.authors, secondary.authors);
    book.isbn13 = prefer_non_empty(primary.isbn13, secondary.isbn13);
    book.description = prefer_non_empty(primary.description, secondary.description);
    book.publisher = prefer_non_empty(primary.publisher, secondary.publisher);
    book.published_date = prefer_non_empty(primary.published_date, secondary.published_date);
    book.page_count = if primary.page_count > 0 {
        primary.page_count
    } else {
        secondary.page_count
    };
    book.categories = prefer_non_empty_vec(primary.categories, secondary.categories);
    book.language = prefer_non_empty(primary.language, secondary.language);
    book.cover_url = prefer_non_empty(primary.cover_url, secondary.cover_url);
    book.thumbnail_url = prefer_non_empty(primary.thumbnail_url, secondary.thumbnail_url);
    book.data_sources = sources;
    book.source_data = Some(serde_json::Value::Object(source_data));

    // The isbn column is required; fall back to isbn13 when the primary
    // identifier is missing from both sources.
    if book.isbn.is_empty() {
        book.isbn = book.isbn13.clone();
    }

    book
}
