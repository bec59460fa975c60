//! Readwise export-API client
//!
//! Both endpoints are cursor-paginated: each page carries `nextPageCursor`,
//! which is sent back as `pageCursor` until it comes back empty. Pages are
//! fetched lazily as the returned stream is polled, with a fixed pause
//! between requests to stay under the API rate limit.

use std::time::Duration;

use async_stream::try_stream;
use chrono::{DateTime, Utc};
use core_config::{ConfigError, env_required};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HighlightError, HighlightResult};
use crate::models::format_timestamp;

pub const READWISE_BASE_URL: &str = "https://readwise.io";

/// Pause between page requests
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(3);

const EXPORT_PATH: &str = "/api/v2/export/";
const READER_LIST_PATH: &str = "/api/v3/list/";

/// Highlight as returned by the export endpoint, with its book attached
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawHighlight {
    pub id: Option<i64>,
    pub text: Option<String>,
    pub note: Option<String>,
    pub location: Option<i64>,
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<RawTag>,
    pub highlighted_at: Option<String>,
    pub updated_at: Option<String>,
    pub book: Option<BookContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTag {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookContext {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportBook {
    user_book_id: Option<i64>,
    title: Option<String>,
    author: Option<String>,
    category: Option<String>,
    source: Option<String>,
    source_url: Option<String>,
    #[serde(default)]
    highlights: Vec<RawHighlight>,
}

impl ExportBook {
    fn context(&self) -> BookContext {
        BookContext {
            id: self.user_book_id,
            title: self.title.clone(),
            author: self.author.clone(),
            category: self.category.clone(),
            source: self.source.clone(),
            source_url: self.source_url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(rename = "nextPageCursor")]
    next_page_cursor: Option<String>,
}

/// Source of raw highlights for the ingestion jobs
#[cfg_attr(test, mockall::automock)]
pub trait HighlightSource: Send + Sync {
    /// Every highlight updated after `updated_after`, or all of them when `None`
    fn export(
        &self,
        updated_after: Option<DateTime<Utc>>,
    ) -> BoxStream<'static, HighlightResult<RawHighlight>>;
}

#[derive(Clone)]
pub struct ReadwiseClient {
    http: Client,
    token: String,
    base_url: String,
    page_delay: Duration,
}

impl ReadwiseClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            token: token.into(),
            base_url: READWISE_BASE_URL.to_string(),
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Client for `READWISE_TOKEN`
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(env_required("READWISE_TOKEN")?))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Flattened highlights from `/api/v2/export/`, each tagged with its book
    pub fn export(
        &self,
        updated_after: Option<DateTime<Utc>>,
    ) -> BoxStream<'static, HighlightResult<RawHighlight>> {
        let params = updated_after
            .map(|ts| vec![("updatedAfter", format_timestamp(ts))])
            .unwrap_or_default();
        let mut pages = self.pages::<ExportBook>(EXPORT_PATH, params);

        try_stream! {
            while let Some(page) = pages.next().await {
                for book in page? {
                    let context = book.context();
                    for mut highlight in book.highlights {
                        highlight.book = Some(context.clone());
                        yield highlight;
                    }
                }
            }
        }
        .boxed()
    }

    /// Documents from the Reader `/api/v3/list/` endpoint
    pub fn reader_list(
        &self,
        updated_after: Option<DateTime<Utc>>,
    ) -> BoxStream<'static, HighlightResult<serde_json::Value>> {
        let params = updated_after
            .map(|ts| vec![("updated__gt", format_timestamp(ts))])
            .unwrap_or_default();
        let mut pages = self.pages::<serde_json::Value>(READER_LIST_PATH, params);

        try_stream! {
            while let Some(page) = pages.next().await {
                for item in page? {
                    yield item;
                }
            }
        }
        .boxed()
    }

    /// Result lists of successive pages of `path`
    fn pages<T>(
        &self,
        path: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> BoxStream<'static, HighlightResult<Vec<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let http = self.http.clone();
        let url = format!("{}{}", self.base_url, path);
        let authorization = format!("Token {}", self.token);
        let page_delay = self.page_delay;

        try_stream! {
            let mut cursor: Option<String> = None;
            loop {
                let mut query = params.clone();
                if let Some(cursor) = &cursor {
                    query.push(("pageCursor", cursor.clone()));
                }

                let response = http
                    .get(&url)
                    .header(AUTHORIZATION, &authorization)
                    .query(&query)
                    .send()
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(readwise_error)?;
                let page: Page<T> = response.json().await.map_err(readwise_error)?;

                cursor = page.next_page_cursor.filter(|c| !c.is_empty());
                debug!(path, results = page.results.len(), more = cursor.is_some(), "Fetched page");
                yield page.results;

                if cursor.is_none() {
                    break;
                }
                tokio::time::sleep(page_delay).await;
            }
        }
        .boxed()
    }
}

impl HighlightSource for ReadwiseClient {
    fn export(
        &self,
        updated_after: Option<DateTime<Utc>>,
    ) -> BoxStream<'static, HighlightResult<RawHighlight>> {
        ReadwiseClient::export(self, updated_after)
    }
}

fn readwise_error(err: reqwest::Error) -> HighlightError {
    HighlightError::Readwise(err.to_string())
}
