//! 전체 HTTP 애플리케이션 조립.
//!
//! 요청 타임아웃은 일반 API에만 걸고, 모델 학습을 포함하는 라우터는
//! 타임아웃 밖에서 합칩니다. 메트릭, 트레이싱, CORS 레이어는 양쪽 모두에 적용됩니다.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::middleware::metrics_layer;
use crate::openapi::swagger_ui_router;
use crate::routes::{create_timed_router, training_router};
use crate::state::AppState;

/// CORS 미들웨어 구성.
///
/// CORS_ORIGINS 환경변수가 설정되어 있으면 해당 origin만 허용합니다.
/// 설정되지 않으면 개발 모드로 간주하여 모든 origin을 허용합니다.
pub fn cors_layer() -> CorsLayer {
    let restricted = std::env::var("CORS_ORIGINS").is_ok();
    let allow_origin = match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => {
            warn!("CORS_ORIGINS not set, allowing any origin (development mode)");
            AllowOrigin::any()
        }
    };

    let layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    // 와일드카드 origin과 credentials는 함께 쓸 수 없음
    if restricted {
        layer.allow_credentials(true)
    } else {
        layer
    }
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// 전체 라우터 생성.
pub fn create_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let timed = Router::new()
        .merge(metrics_router)
        .merge(create_timed_router().with_state(state.clone()))
        .merge(swagger_ui_router())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ));

    Router::new()
        .merge(timed)
        .merge(training_router().with_state(state))
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}
