//! Open Library API client.
//!
//! ISBN lookups hit the books endpoint directly and fall back to the
//! search API; title and author lookups always go through search.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{BookData, SearchKind, SourceError};

const DEFAULT_BASE_URL: &str = "https://openlibrary.org";
const COVERS_BASE_URL: &str = "https://covers.openlibrary.org";
pub const SOURCE_NAME: &str = "open_library";

/// Client for the Open Library API. No API key required.
pub struct OpenLibraryClient {
    client: Client,
    base_url: String,
}

impl OpenLibraryClient {
    pub fn new() -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SourceError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Overrides the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Searches for the best-matching book, normalized to [`BookData`].
    pub async fn search(&self, query: &str, kind: SearchKind) -> Result<BookData, SourceError> {
        match kind {
            SearchKind::Isbn => self.search_by_isbn(query).await,
            SearchKind::Title => self.search_by_query(&format!("title:{}", query)).await,
            SearchKind::Author => self.search_by_query(&format!("author:{}", query)).await,
        }
    }

    async fn search_by_isbn(&self, isbn: &str) -> Result<BookData, SourceError> {
        let clean_isbn: String = isbn.chars().filter(|c| *c != '-').collect();
        let url = format!("{}/isbn/{}.json", self.base_url, clean_isbn);

        debug!(isbn = %clean_isbn, "looking up open library isbn endpoint");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::RequestFailed(e.to_string()))?;

        if response.status().is_success() {
            let book: EditionResponse = response
                .json()
                .await
                .map_err(|e| SourceError::DecodeFailed(e.to_string()))?;
            return Ok(edition_to_book_data(book));
        }

        // The edition endpoint 404s for many valid ISBNs; fall back to search.
        self.search_by_query(&format!("isbn:{}", clean_isbn)).await
    }

    async fn search_by_query(&self, query: &str) -> Result<BookData, SourceError> {
        debug!(query = %query, "searching open library");

        let response = self
            .client
            .get(format!("{}/search.json", self.base_url))
            .query(&[("q", query), ("limit", "1")])
            .send()
            .await
            .map_err(|e| SourceError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::ApiError {
                code: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::DecodeFailed(e.to_string()))?;

        let doc = result.docs.into_iter().next().ok_or(SourceError::NotFound)?;
        Ok(doc_to_book_data(doc))
    }
}

fn cover_urls(cover_id: i64) -> (String, String) {
    (
        format!("{}/b/id/{}-L.jpg", COVERS_BASE_URL, cover_id),
        format!("{}/b/id/{}-M.jpg", COVERS_BASE_URL, cover_id),
    )
}

fn edition_to_book_data(book: EditionResponse) -> BookData {
    let raw = serde_json::to_value(&book).unwrap_or(serde_json::Value::Null);

    let mut data = BookData {
        title: book.title.clone(),
        publisher: book.publishers.join(", "),
        published_date: book.publish_date.clone(),
        page_count: book.number_of_pages,
        categories: book.subjects.clone(),
        source: SOURCE_NAME,
        raw,
        ..Default::default()
    };

    if let Some(isbn13) = book.isbn_13.first() {
        data.isbn13 = isbn13.clone();
        data.isbn = isbn13.clone();
    } else if let Some(isbn10) = book.isbn_10.first() {
        data.isbn = isbn10.clone();
    }

    // Language references look like "/languages/eng".
    if let Some(lang) = book.languages.first() {
        data.language = lang
            .key
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
    }

    data.description = match book.description {
        Some(Description::Text(text)) => text,
        Some(Description::Object { value }) => value,
        None => String::new(),
    };

    if let Some(cover_id) = book.covers.first() {
        let (cover, thumb) = cover_urls(*cover_id);
        data.cover_url = cover;
        data.thumbnail_url = thumb;
    }

    data
}

fn doc_to_book_data(doc: SearchDoc) -> BookData {
    let raw = serde_json::to_value(&doc).unwrap_or(serde_json::Value::Null);

    let mut data = BookData {
        title: doc.title.clone(),
        authors: doc.author_name.clone(),
        categories: doc.subject.clone(),
        page_count: doc.number_of_pages_median,
        source: SOURCE_NAME,
        raw,
        ..Default::default()
    };

    for isbn in &doc.isbn {
        if isbn.len() == 13 {
            data.isbn13 = isbn.clone();
            data.isbn = isbn.clone();
            break;
        }
        if isbn.len() == 10 && data.isbn.is_empty() {
            data.isbn = isbn.clone();
        }
    }

    if let Some(publisher) = doc.publisher.first() {
        data.publisher = publisher.clone();
    }
    if let Some(year) = doc.publish_year.first() {
        data.published_date = year.to_string();
    }
    if let Some(language) = doc.language.first() {
        data.language = language.clone();
    }
    if doc.cover_i > 0 {
        let (cover, thumb) = cover_urls(doc.cover_i);
        data.cover_url = cover;
        data.thumbnail_url = thumb;
    }

    data
}

#[derive(Debug, Default, serde::Serialize, Deserialize)]
#[serde(default)]
struct EditionResponse {
    key: String,
    title: String,
    publishers: Vec<String>,
    publish_date: String,
    number_of_pages: i32,
    isbn_10: Vec<String>,
    isbn_13: Vec<String>,
    subjects: Vec<String>,
    languages: Vec<LanguageRef>,
    description: Option<Description>,
    covers: Vec<i64>,
}

#[derive(Debug, Default, serde::Serialize, Deserialize)]
struct LanguageRef {
    key: String,
}

/// Open Library descriptions are either a bare string or `{type, value}`.
#[derive(Debug, serde::Serialize, Deserialize)]
#[serde(untagged)]
enum Description {
    Text(String),
    Object { value: String },
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Default, serde::Serialize, Deserialize)]
#[serde(default)]
struct SearchDoc {
    key: String,
    title: String,
    author_name: Vec<String>,
    isbn: Vec<String>,
    publisher: Vec<String>,
    publish_year: Vec<i32>,
    number_of_pages_median: i32,
    subject: Vec<String>,
    language: Vec<String>,
    cover_i: i64,
}
