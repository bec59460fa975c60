use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::parser::parse_iso_datetime;

/// Width of the stored embedding vectors (text-embedding-3-large)
pub const EMBEDDING_DIMENSIONS: usize = 3072;

/// Result count used when a request omits `k` or sends a non-positive one
pub const DEFAULT_K: usize = 20;

/// Sync-state key for the Readwise export source
pub const READWISE_SERVICE: &str = "readwise";

/// One excerpted passage from a source document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: i64,
    pub text: String,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub source_author: Option<String>,
    pub source_title: Option<String>,
    pub source_url: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub location: Option<i32>,
    pub highlighted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

impl Highlight {
    /// Text submitted to the embedding provider during incremental sync
    pub fn embedding_input(&self) -> String {
        format!("{} {}", self.text, self.note.as_deref().unwrap_or_default())
    }
}

/// Closed interval of calendar days, compared in UTC
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Parse `[start, end]` ISO dates (`YYYY-MM-DD`).
    pub fn parse_pair<S: AsRef<str>>(values: &[S]) -> Result<Self, String> {
        let [start, end] = values else {
            return Err(format!(
                "highlighted_at_range must contain exactly 2 dates, got {}",
                values.len()
            ));
        };
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .map_err(|e| format!("invalid date '{value}': {e}"))
        };
        Ok(Self::new(parse(start.as_ref())?, parse(end.as_ref())?))
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let day = timestamp.date_naive();
        self.start <= day && day <= self.end
    }

    /// First and last instant of the range, for a `BETWEEN` predicate
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start.and_time(NaiveTime::MIN).and_utc();
        let end = (self.end.and_time(NaiveTime::MIN) + TimeDelta::days(1)
            - TimeDelta::microseconds(1))
        .and_utc();
        (start, end)
    }
}

/// Normalised search input shared by every front-end
#[derive(Clone, Debug, PartialEq)]
pub struct SearchQuery {
    pub q: String,
    pub k: usize,
    pub source_type: Option<String>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
    pub highlighted_at_range: Option<DateRange>,
    pub include_embedding: bool,
}

impl SearchQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            k: DEFAULT_K,
            source_type: None,
            author: None,
            tags: None,
            highlighted_at_range: None,
            include_embedding: false,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.highlighted_at_range = Some(range);
        self
    }
}

/// A highlight plus its cosine distance to the query (lower is closer)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    pub id: i64,
    pub text: String,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub tags: Option<Vec<String>>,
    /// RFC 3339, UTC
    pub highlighted_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub score: f64,
}

impl SearchResult {
    /// Parsed `highlighted_at`, `None` when absent or unparseable
    pub fn highlighted_at_parsed(&self) -> Option<DateTime<Utc>> {
        parse_iso_datetime(self.highlighted_at.as_deref())
    }
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// A row returned by either search path: every highlight column plus `score`
#[derive(Clone, Debug, sqlx::FromRow, sea_orm::FromQueryResult)]
pub struct ScoredHighlight {
    pub id: i64,
    pub text: String,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub source_author: Option<String>,
    pub source_title: Option<String>,
    pub source_url: Option<String>,
    pub highlighted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub embedding: Option<pgvector::Vector>,
    pub score: f64,
}

impl From<ScoredHighlight> for SearchResult {
    fn from(row: ScoredHighlight) -> Self {
        Self {
            id: row.id,
            text: row.text,
            source_type: row.source_type,
            source_id: row.source_id,
            title: row.source_title,
            author: row.source_author,
            url: row.source_url,
            tags: row.tags,
            highlighted_at: row.highlighted_at.map(format_timestamp),
            updated_at: row.updated_at.map(format_timestamp),
            embedding: row.embedding.map(|v| v.to_vec()),
            score: row.score,
        }
    }
}

/// `POST /search` body
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub q: Option<String>,
    pub k: Option<i64>,
    pub source_type: Option<String>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
    /// `[start, end]` ISO dates, inclusive
    pub highlighted_at_range: Option<Vec<String>>,
    #[serde(default)]
    pub include_embedding: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncState {
    pub service: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Outcome of a backfill or incremental run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub processed: usize,
    /// `false` when an incremental run had no starting point and did nothing
    pub ran: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let range = DateRange::new(date("2023-01-01"), date("2023-12-31"));
        let ts = |s: &str| parse_iso_datetime(Some(s)).unwrap();

        assert!(range.contains(ts("2023-01-01T00:00:00Z")));
        assert!(range.contains(ts("2023-12-31T23:59:59.999Z")));
        assert!(!range.contains(ts("2022-12-31T23:59:59Z")));
        assert!(!range.contains(ts("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn test_date_range_bounds_cover_whole_days() {
        let range = DateRange::new(date("2023-01-01"), date("2023-12-31"));
        let (start, end) = range.bounds();
        assert_eq!(format_timestamp(start), "2023-01-01T00:00:00Z");
        assert_eq!(format_timestamp(end), "2023-12-31T23:59:59.999999Z");
    }

    #[test]
    fn test_parse_pair() {
        let range = DateRange::parse_pair(&["2023-01-01", "2023-12-31"]).unwrap();
        assert_eq!(range, DateRange::new(date("2023-01-01"), date("2023-12-31")));

        assert!(DateRange::parse_pair(&["2023-01-01"]).is_err());
        assert!(DateRange::parse_pair(&["2023-01-01", "soon"]).is_err());
    }

    #[test]
    fn test_search_result_serializes_every_optional_key() {
        let result = SearchResult {
            id: 7,
            text: "text".to_string(),
            source_type: None,
            source_id: None,
            title: None,
            author: None,
            url: None,
            tags: None,
            highlighted_at: None,
            updated_at: None,
            embedding: None,
            score: 0.25,
        };

        let json = serde_json::to_value(&result).unwrap();
        for key in [
            "source_id",
            "title",
            "author",
            "url",
            "tags",
            "highlighted_at",
            "updated_at",
        ] {
            assert!(json[key].is_null(), "{key} should be present and null");
        }
        assert!(json.get("embedding").is_none());
        assert_eq!(json["score"], 0.25);
    }

    #[test]
    fn test_scored_row_conversion_keeps_instant() {
        let highlighted_at = parse_iso_datetime(Some("2022-09-13T16:41:53.186Z"));
        let row = ScoredHighlight {
            id: 1,
            text: "text".to_string(),
            source_type: Some("book".to_string()),
            source_id: Some("42".to_string()),
            source_author: Some("Author".to_string()),
            source_title: Some("Title".to_string()),
            source_url: None,
            highlighted_at,
            updated_at: None,
            tags: Some(vec!["a".to_string()]),
            embedding: None,
            score: 0.5,
        };

        let result = SearchResult::from(row);
        assert_eq!(result.title.as_deref(), Some("Title"));
        assert_eq!(result.author.as_deref(), Some("Author"));
        assert_eq!(result.highlighted_at.as_deref(), Some("2022-09-13T16:41:53.186Z"));
        assert_eq!(result.highlighted_at_parsed(), highlighted_at);
    }

    #[test]
    fn test_embedding_input_appends_note() {
        let highlight = Highlight {
            text: "passage".to_string(),
            note: Some("my note".to_string()),
            ..Default::default()
        };
        assert_eq!(highlight.embedding_input(), "passage my note");

        let bare = Highlight {
            text: "passage".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.embedding_input(), "passage ");
    }
}
