//! HTTP 요청 metrics middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{
    normalize_path, record_http_duration, record_http_request, record_http_response,
};

/// 집계하지 않는 경로 접두사 (스크레이프와 문서).
const UNTRACKED_PREFIXES: [&str; 3] = ["/metrics", "/swagger-ui", "/api-docs"];

/// HTTP 요청 수, 응답 상태, 처리 시간을 기록하는 미들웨어.
///
/// 경로의 UUID/숫자 세그먼트는 `:id`로 정규화됩니다.
pub async fn metrics_layer(request: Request, next: Next) -> Response {
    if is_untracked(request.uri().path()) {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    record_http_request(&method, &path);
    let response = next.run(request).await;

    record_http_response(&method, &path, response.status().as_u16());
    record_http_duration(&method, &path, start.elapsed().as_secs_f64());

    response
}

fn is_untracked(path: &str) -> bool {
    UNTRACKED_PREFIXES.iter().any(|p| path.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "OK"
    }

    #[tokio::test]
    async fn test_metrics_middleware_passes_through() {
        let app = Router::new()
            .route("/jobs/{id}", get(ok_handler))
            .layer(middleware::from_fn(metrics_layer));

        let request = Request::builder()
            .method(Method::GET)
            .uri("/jobs/123e4567-e89b-12d3-a456-426614174000")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_untracked_paths() {
        assert!(is_untracked("/metrics"));
        assert!(is_untracked("/swagger-ui/index.html"));
        assert!(!is_untracked("/predict/lstm"));
    }
}
