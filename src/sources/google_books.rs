//! Google Books volumes API client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{BookData, SearchKind, SourceError};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";
pub const SOURCE_NAME: &str = "google_books";

/// Client for the Google Books volumes API.
///
/// Works without an API key at reduced quota.
pub struct GoogleBooksClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GoogleBooksClient {
    pub fn new(api_key: Option<String>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SourceError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Overrides the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Searches for the best-matching volume, normalized to [`BookData`].
    pub async fn search(&self, query: &str, kind: SearchKind) -> Result<BookData, SourceError> {
        let q = match kind {
            SearchKind::Isbn => format!("isbn:{}", query),
            SearchKind::Title => format!("intitle:{}", query),
            SearchKind::Author => format!("inauthor:{}", query),
        };

        debug!(query = %q, "searching google books");

        let mut request = self
            .client
            .get(format!("{}/volumes", self.base_url))
            .query(&[("q", q.as_str()), ("maxResults", "1")]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
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

        let result: VolumesResponse = response
            .json()
            .await
            .map_err(|e| SourceError::DecodeFailed(e.to_string()))?;

        let item = result.items.into_iter().next().ok_or(SourceError::NotFound)?;
        Ok(to_book_data(item))
    }
}

fn to_book_data(item: VolumeItem) -> BookData {
    let raw = serde_json::to_value(&item).unwrap_or(serde_json::Value::Null);
    let volume = item.volume_info;

    let mut data = BookData {
        title: volume.title,
        authors: volume.authors,
        description: volume.description,
        publisher: volume.publisher,
        published_date: volume.published_date,
        page_count: volume.page_count,
        categories: volume.categories,
        language: volume.language,
        source: SOURCE_NAME,
        raw,
        ..Default::default()
    };

    for identifier in volume.industry_identifiers {
        match identifier.kind.as_str() {
            "ISBN_10" => {
                if data.isbn.is_empty() {
                    data.isbn = identifier.identifier;
                }
            }
            "ISBN_13" => {
                data.isbn13 = identifier.identifier.clone();
                // ISBN-13 is preferred as the primary identifier.
                if data.isbn.is_empty() {
                    data.isbn = identifier.identifier;
                }
            }
            _ => {}
        }
    }

    let images = volume.image_links;
    data.cover_url = [images.large, images.medium, images.small]
        .into_iter()
        .find(|u| !u.is_empty())
        .unwrap_or_default();
    data.thumbnail_url = [images.thumbnail, images.small_thumbnail]
        .into_iter()
        .find(|u| !u.is_empty())
        .unwrap_or_default();

    data
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<VolumeItem>,
}

#[derive(Debug, serde::Serialize, Deserialize)]
struct VolumeItem {
    #[serde(default)]
    id: String,
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, serde::Serialize, Deserialize)]
#[serde(default)]
struct VolumeInfo {
    title: String,
    authors: Vec<String>,
    publisher: String,
    #[serde(rename = "publishedDate")]
    published_date: String,
    description: String,
    #[serde(rename = "industryIdentifiers")]
    industry_identifiers: Vec<IndustryIdentifier>,
    #[serde(rename = "pageCount")]
    page_count: i32,
    categories: Vec<String>,
    language: String,
    #[serde(rename = "imageLinks")]
    image_links: ImageLinks,
}

#[derive(Debug, serde::Serialize, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Default, serde::Serialize, Deserialize)]
#[serde(default)]
struct ImageLinks {
    #[serde(rename = "smallThumbnail")]
    small_thumbnail: String,
    thumbnail: String,
    small: String,
    medium: String,
    large: String,
}
