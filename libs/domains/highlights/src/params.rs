//! Normalisation of search input from each front-end into one [`SearchQuery`]
//!
//! - REST body ([`SearchRequest`]): a malformed date range is rejected.
//! - SSE query string ([`StreamParams`]) and JSON-RPC `params`: a malformed
//!   date range is logged and ignored.
//!
//! Everywhere `q` must be a non-empty string, and a missing, non-integer or
//! non-positive `k` becomes [`DEFAULT_K`].

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use utoipa::IntoParams;

use crate::error::{HighlightError, HighlightResult};
use crate::models::{DEFAULT_K, DateRange, SearchQuery, SearchRequest};

pub const INVALID_QUERY: &str = "Missing or invalid 'q' parameter";

pub fn normalize_k(k: Option<i64>) -> usize {
    match k {
        Some(k) if k > 0 => usize::try_from(k).unwrap_or(DEFAULT_K),
        _ => DEFAULT_K,
    }
}

fn required_query(q: Option<&str>) -> HighlightResult<String> {
    match q {
        Some(q) if !q.trim().is_empty() => Ok(q.to_string()),
        _ => Err(HighlightError::Validation(INVALID_QUERY.to_string())),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_tags(tags: Vec<String>) -> Option<Vec<String>> {
    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    (!tags.is_empty()).then_some(tags)
}

fn lenient_range(values: &[String]) -> Option<DateRange> {
    match DateRange::parse_pair(values) {
        Ok(range) => Some(range),
        Err(reason) => {
            warn!(?values, %reason, "Ignoring invalid date range");
            None
        }
    }
}

impl TryFrom<SearchRequest> for SearchQuery {
    type Error = HighlightError;

    fn try_from(req: SearchRequest) -> HighlightResult<Self> {
        let highlighted_at_range = req
            .highlighted_at_range
            .as_deref()
            .map(DateRange::parse_pair)
            .transpose()
            .map_err(HighlightError::Validation)?;

        Ok(SearchQuery {
            q: required_query(req.q.as_deref())?,
            k: normalize_k(req.k),
            source_type: non_blank(req.source_type),
            author: non_blank(req.author),
            tags: req.tags.and_then(non_empty_tags),
            highlighted_at_range,
            include_embedding: req.include_embedding,
        })
    }
}

/// `GET /mcp/stream` query string
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamParams {
    pub q: Option<String>,
    /// Kept as text so a malformed value falls back to the default
    pub k: Option<String>,
    pub source_type: Option<String>,
    pub author: Option<String>,
    /// Comma-separated
    pub tags: Option<String>,
    pub highlighted_at_start: Option<String>,
    pub highlighted_at_end: Option<String>,
    #[serde(default)]
    pub include_embedding: bool,
}

impl TryFrom<StreamParams> for SearchQuery {
    type Error = HighlightError;

    fn try_from(params: StreamParams) -> HighlightResult<Self> {
        let highlighted_at_range = match (params.highlighted_at_start, params.highlighted_at_end) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
                lenient_range(&[start, end])
            }
            _ => None,
        };

        Ok(SearchQuery {
            q: required_query(params.q.as_deref())?,
            k: normalize_k(params.k.and_then(|k| k.trim().parse().ok())),
            source_type: non_blank(params.source_type),
            author: non_blank(params.author),
            tags: params
                .tags
                .and_then(|csv| non_empty_tags(csv.split(',').map(str::to_string).collect())),
            highlighted_at_range,
            include_embedding: params.include_embedding,
        })
    }
}

/// Normalise JSON-RPC `params`.
pub fn from_rpc_params(params: Option<&Value>) -> HighlightResult<SearchQuery> {
    let Some(params) = params.and_then(Value::as_object) else {
        return Err(HighlightError::Validation(INVALID_QUERY.to_string()));
    };

    let text = |key: &str| {
        params
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let tags = params.get("tags").and_then(Value::as_array).and_then(|items| {
        non_empty_tags(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    });

    let highlighted_at_range = params
        .get("highlighted_at_range")
        .and_then(Value::as_array)
        .and_then(|items| {
            let dates: Vec<String> = items
                .iter()
                .map(|v| v.as_str().unwrap_or_default().to_string())
                .collect();
            lenient_range(&dates)
        });

    Ok(SearchQuery {
        q: required_query(params.get("q").and_then(Value::as_str))?,
        k: normalize_k(params.get("k").and_then(Value::as_i64)),
        source_type: non_blank(text("source_type")),
        author: non_blank(text("author")),
        tags,
        highlighted_at_range,
        include_embedding: params
            .get("include_embedding")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}
