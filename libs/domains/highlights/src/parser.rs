use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{HighlightError, HighlightResult};
use crate::models::Highlight;
use crate::readwise::RawHighlight;

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts RFC 3339 (`2022-09-13T16:41:53.186Z`, `...+02:00`), naive
/// date-times (read as UTC) and bare dates (midnight UTC). Empty or
/// unparseable input yields `None`.
pub fn parse_iso_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Map one export-API highlight (with its attached book context) to a [`Highlight`].
///
/// The embedding is left empty; the ingestion job fills it in.
pub fn parse_highlight(raw: RawHighlight) -> HighlightResult<Highlight> {
    let id = raw
        .id
        .ok_or_else(|| HighlightError::Readwise("highlight without an id".to_string()))?;
    let text = raw
        .text
        .filter(|text| !text.is_empty())
        .ok_or_else(|| HighlightError::Readwise(format!("highlight {id} has no text")))?;

    let book = raw.book.unwrap_or_default();
    let location = raw.location.and_then(|loc| i32::try_from(loc).ok());

    Ok(Highlight {
        id,
        text,
        source_type: book.category.clone(),
        source_id: book.id.map(|id| id.to_string()),
        source_author: book.author,
        source_title: book.title,
        source_url: raw.url.filter(|url| !url.is_empty()).or(book.source_url),
        category: book.category,
        note: raw.note.filter(|note| !note.is_empty()),
        location,
        highlighted_at: parse_iso_datetime(raw.highlighted_at.as_deref()),
        updated_at: parse_iso_datetime(raw.updated_at.as_deref()),
        tags: raw.tags.into_iter().filter_map(|tag| tag.name).collect(),
        embedding: None,
    })
}
