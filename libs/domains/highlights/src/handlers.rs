use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use axum_helpers::{AppJson, ErrorResponse};
use futures::{Stream, StreamExt, TryStreamExt};
use serde_json::json;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::error::HighlightResult;
use crate::metrics::{self, ErrorSource};
use crate::models::{SearchQuery, SearchRequest, SearchResponse, SearchResult};
use crate::params::StreamParams;
use crate::service::SearchService;

const TAG: &str = "highlights";

/// OpenAPI documentation for the highlight search API
#[derive(OpenApi)]
#[openapi(
    paths(search, health, stream_search),
    components(schemas(SearchRequest, SearchResponse, SearchResult, ErrorResponse)),
    tags(
        (name = TAG, description = "Semantic search over Readwise highlights")
    )
)]
pub struct ApiDoc;

/// Search, health and SSE streaming endpoints
pub fn router(service: Arc<dyn SearchService>) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/health", get(health))
        .route("/mcp/stream", get(stream_search))
        .with_state(service)
}

/// Semantic search returning every result at once
#[utoipa::path(
    post,
    path = "/search",
    tag = TAG,
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Results in ascending distance order", body = SearchResponse),
        (status = 400, description = "Body is not valid JSON", body = ErrorResponse),
        (status = 422, description = "Missing query text, wrong field types or malformed date range", body = ErrorResponse),
        (status = 503, description = "Embedding provider or database unavailable", body = ErrorResponse)
    )
)]
async fn search(
    State(service): State<Arc<dyn SearchService>>,
    AppJson(request): AppJson<SearchRequest>,
) -> HighlightResult<Json<SearchResponse>> {
    let query = SearchQuery::try_from(request)?;
    let results = run_search(service.as_ref(), query)
        .await
        .inspect_err(|_| metrics::record_error(ErrorSource::Search))?;
    info!(count = results.len(), "Search complete");
    Ok(Json(SearchResponse { results }))
}

async fn run_search(
    service: &dyn SearchService,
    query: SearchQuery,
) -> HighlightResult<Vec<SearchResult>> {
    service.search_stream(query).await?.try_collect().await
}

/// Database connectivity check
#[utoipa::path(
    get,
    path = "/health",
    tag = TAG,
    responses(
        (status = 200, description = "Database reachable"),
        (status = 503, description = "Database unavailable")
    )
)]
async fn health(State(service): State<Arc<dyn SearchService>>) -> impl IntoResponse {
    match service.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "DB unavailable" })),
            )
        }
    }
}

/// Semantic search streamed as server-sent events.
///
/// Emits one `result` event per hit followed by `complete` with the total,
/// or a single `error` event. Failures never change the status code.
#[utoipa::path(
    get,
    path = "/mcp/stream",
    tag = TAG,
    params(StreamParams),
    responses(
        (status = 200, description = "text/event-stream of result, complete and error events")
    )
)]
async fn stream_search(
    State(service): State<Arc<dyn SearchService>>,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let query = match SearchQuery::try_from(params) {
            Ok(query) => query,
            Err(e) => {
                yield Ok(error_event(&e.to_string()));
                return;
            }
        };

        let mut results = match service.search_stream(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Streaming search failed");
                metrics::record_error(ErrorSource::Stream);
                yield Ok(error_event(&e.to_string()));
                return;
            }
        };

        let mut total = 0usize;
        while let Some(item) = results.next().await {
            let event = item.map_err(|e| e.to_string()).and_then(|result| {
                Event::default()
                    .event("result")
                    .json_data(&result)
                    .map_err(|e| e.to_string())
            });

            match event {
                Ok(event) => {
                    total += 1;
                    yield Ok(event);
                }
                Err(message) => {
                    warn!(%message, sent = total, "Streaming search aborted");
                    metrics::record_error(ErrorSource::Stream);
                    yield Ok(error_event(&message));
                    return;
                }
            }
        }

        info!(total, "Streaming search complete");
        yield Ok(Event::default()
            .event("complete")
            .data(json!({ "total": total }).to_string()));
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "message": message }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ResultStream;
    use crate::error::HighlightError;
    use crate::params::INVALID_QUERY;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use database::DatabaseError;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubSearch {
        results: Vec<SearchResult>,
        fail_after: Option<usize>,
        healthy: bool,
        seen: Mutex<Vec<SearchQuery>>,
    }

    #[async_trait]
    impl SearchService for StubSearch {
        async fn search_stream(&self, query: SearchQuery) -> HighlightResult<ResultStream> {
            self.seen.lock().unwrap().push(query);
            let mut items: Vec<HighlightResult<SearchResult>> =
                self.results.iter().cloned().map(Ok).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(HighlightError::Readwise("connection reset".to_string())));
            }
            Ok(futures::stream::iter(items).boxed())
        }

        async fn ping(&self) -> HighlightResult<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(DatabaseError::HealthCheckFailed("connection refused".to_string()).into())
            }
        }
    }

    fn result(id: i64) -> SearchResult {
        SearchResult {
            id,
            text: format!("highlight {id}"),
            source_type: Some("book".to_string()),
            source_id: None,
            title: None,
            author: None,
            url: None,
            tags: None,
            highlighted_at: None,
            updated_at: None,
            embedding: None,
            score: 0.1 * id as f64,
        }
    }

    async fn body_text(body: Body) -> String {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_search_returns_results_with_null_keys() {
        let stub = Arc::new(StubSearch {
            results: vec![result(1), result(2)],
            ..Default::default()
        });
        let app = router(stub.clone());

        let response = app
            .oneshot(post_json("/search", json!({"q": "rust", "k": 2})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["id"], 1);
        assert!(results[0].get("author").unwrap().is_null());
        assert!(results[0].get("embedding").is_none());
        assert_eq!(stub.seen.lock().unwrap()[0].k, 2);
    }

    #[tokio::test]
    async fn test_search_without_query_is_unprocessable() {
        let app = router(Arc::new(StubSearch::default()));

        let response = app
            .oneshot(post_json("/search", json!({"k": 5})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
        assert_eq!(body["message"], INVALID_QUERY);
    }

    #[tokio::test]
    async fn test_search_with_invalid_json_body_returns_error_response() {
        let stub = Arc::new(StubSearch::default());
        let app = router(stub.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/search")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"q\": "))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
        let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
        assert_eq!(body["error"], "JSON_EXTRACTION");
        assert!(body["message"].is_string());
        assert!(stub.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_with_wrongly_typed_field_is_unprocessable_json() {
        let app = router(Arc::new(StubSearch::default()));

        let response = app
            .oneshot(post_json("/search", json!({"q": "rust", "k": "five"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
        assert_eq!(body["code"], 1003);
    }

    #[tokio::test]
    async fn test_search_rejects_malformed_date_range() {
        let app = router(Arc::new(StubSearch::default()));

        let response = app
            .oneshot(post_json(
                "/search",
                json!({"q": "x", "highlighted_at_range": ["2023-01-01"]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_health() {
        let healthy = router(Arc::new(StubSearch {
            healthy: true,
            ..Default::default()
        }));
        let response = healthy.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response.into_body()).await, r#"{"status":"ok"}"#);

        let unhealthy = router(Arc::new(StubSearch::default()));
        let response = unhealthy.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_text(response.into_body()).await,
            r#"{"detail":"DB unavailable"}"#
        );
    }

    #[tokio::test]
    async fn test_stream_emits_results_then_complete() {
        let stub = Arc::new(StubSearch {
            results: vec![result(1), result(2)],
            ..Default::default()
        });
        let app = router(stub.clone());

        let response = app
            .oneshot(get_request("/mcp/stream?q=rust&k=2&tags=a,b"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        let body = body_text(response.into_body()).await;
        assert_eq!(body.matches("event: result").count(), 2);
        assert!(body.contains("event: complete\ndata: {\"total\":2}"));
        assert!(!body.contains("event: error"));

        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen[0].tags, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn test_stream_reports_missing_query_in_band() {
        let stub = Arc::new(StubSearch::default());
        let app = router(stub.clone());

        let response = app.oneshot(get_request("/mcp/stream?k=3")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response.into_body()).await;
        assert!(body.contains("event: error"));
        assert!(body.contains(INVALID_QUERY));
        assert!(!body.contains("event: complete"));
        assert!(stub.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_failure_mid_way_ends_with_error() {
        let app = router(Arc::new(StubSearch {
            results: vec![result(1), result(2), result(3)],
            fail_after: Some(1),
            ..Default::default()
        }));

        let response = app.oneshot(get_request("/mcp/stream?q=rust")).await.unwrap();

        let body = body_text(response.into_body()).await;
        assert_eq!(body.matches("event: result").count(), 1);
        assert!(body.contains("event: error"));
        assert!(!body.contains("event: complete"));
    }

    #[tokio::test]
    async fn test_stream_ignores_half_open_date_range() {
        let stub = Arc::new(StubSearch::default());
        let app = router(stub.clone());

        let response = app
            .oneshot(get_request("/mcp/stream?q=rust&highlighted_at_start=2024-01-01"))
            .await
            .unwrap();

        let body = body_text(response.into_body()).await;
        assert!(body.contains("event: complete\ndata: {\"total\":0}"));
        assert!(stub.seen.lock().unwrap()[0].highlighted_at_range.is_none());
    }
}
