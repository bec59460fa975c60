//! Request extractors whose rejections use the shared error body.

use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// `Json<T>` that rejects with an [`ErrorResponse`](crate::ErrorResponse)
/// instead of axum's plain-text body.
///
/// Status codes follow axum: 415 without a JSON content type, 400 for
/// syntax errors, 422 when the JSON does not fit `T`.
///
/// ```ignore
/// async fn search(AppJson(request): AppJson<SearchRequest>) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{StatusCode, header},
        routing::post,
    };
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use serde_json::Value;
    use tower::ServiceExt;

    #[derive(Deserialize)]
    struct Payload {
        k: u32,
    }

    async fn echo(AppJson(payload): AppJson<Payload>) -> String {
        payload.k.to_string()
    }

    async fn send(content_type: Option<&str>, body: &'static str) -> (StatusCode, Vec<u8>) {
        let mut request = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        let response = Router::new()
            .route("/", post(echo))
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_valid_body_is_extracted() {
        let (status, body) = send(Some("application/json"), r#"{"k": 7}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"7");
    }

    #[tokio::test]
    async fn test_rejections_use_error_response_body() {
        for (content_type, body, expected) in [
            (Some("application/json"), "{not json", StatusCode::BAD_REQUEST),
            (Some("application/json"), r#"{"k": "seven"}"#, StatusCode::UNPROCESSABLE_ENTITY),
            (None, r#"{"k": 7}"#, StatusCode::UNSUPPORTED_MEDIA_TYPE),
        ] {
            let (status, bytes) = send(content_type, body).await;
            assert_eq!(status, expected, "body: {body}");

            let json: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(json["error"], "JSON_EXTRACTION");
            assert_eq!(json["code"], 1003);
            assert!(json["message"].as_str().is_some_and(|m| !m.is_empty()));
        }
    }
}
