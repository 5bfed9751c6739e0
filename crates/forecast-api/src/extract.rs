//! 에러를 API 에러 형식으로 돌려주는 추출기.
//!
//! axum 기본 `Query`/`Json`은 역직렬화 실패 시 일반 텍스트 응답을 보내므로,
//! 같은 실패를 [`ApiErrorResponse`](crate::error::ApiErrorResponse) JSON으로 바꿉니다.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{api_error, ApiError};

/// 쿼리 문자열 추출기. 실패하면 400 `VALIDATION_ERROR`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

/// JSON 본문 추출기. 실패하면 axum이 정한 상태 코드와 `INVALID_BODY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    debug!(error = %rejection.body_text(), "Rejected query string");
    api_error(rejection.status(), "VALIDATION_ERROR", rejection.body_text())
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    debug!(error = %rejection.body_text(), "Rejected request body");
    api_error(rejection.status(), "INVALID_BODY", rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize)]
    struct Paging {
        limit: u32,
    }

    async fn echo_query(ApiQuery(paging): ApiQuery<Paging>) -> String {
        paging.limit.to_string()
    }

    async fn echo_body(ApiJson(paging): ApiJson<Paging>) -> String {
        paging.limit.to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/q", get(echo_query))
            .route("/b", post(echo_body))
    }

    async fn call(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_query_rejection_is_json() {
        let request = Request::builder().uri("/q?limit=abc").body(Body::empty()).unwrap();
        let (status, json) = call(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert!(!json["message"].as_str().unwrap().is_empty());

        let request = Request::builder().uri("/q").body(Body::empty()).unwrap();
        let (status, json) = call(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "VALIDATION_ERROR");

        let response = app()
            .oneshot(Request::builder().uri("/q?limit=7").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_body_rejection_is_json() {
        let request = Request::builder()
            .method("POST")
            .uri("/b")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, json) = call(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "INVALID_BODY");

        // Content-Type 없음
        let request = Request::builder()
            .method("POST")
            .uri("/b")
            .body(Body::from(r#"{"limit":1}"#))
            .unwrap();
        let (status, json) = call(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["code"], "INVALID_BODY");
    }
}
