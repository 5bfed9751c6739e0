//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템에서 사용하는 liveness/readiness 프로브와
//! 루트 동작 확인 메시지를 제공합니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::AppState;

/// 루트 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RootResponse {
    pub message: String,
}

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 개별 컴포넌트 상태
    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    /// 데이터베이스 연결 상태
    pub database: ComponentStatus,

    /// 모델 아티팩트 디렉토리 상태
    pub model_store: ComponentStatus,

    /// 시세 제공자
    pub price_provider: ComponentStatus,
}

/// 컴포넌트 가동 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Up,
    Down,
    NotConfigured,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    pub status: ComponentState,

    /// 추가 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    fn new(status: ComponentState, message: Option<String>) -> Self {
        Self { status, message }
    }

    pub fn up(info: impl Into<String>) -> Self {
        Self::new(ComponentState::Up, Some(info.into()))
    }

    pub fn down(reason: impl Into<String>) -> Self {
        Self::new(ComponentState::Down, Some(reason.into()))
    }

    pub fn not_configured() -> Self {
        Self::new(ComponentState::NotConfigured, None)
    }

    pub fn is_down(&self) -> bool {
        self.status == ComponentState::Down
    }
}

/// GET / - 서버 동작 확인.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "서버 동작 중", body = RootResponse)),
    tag = "health"
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "API is running".to_string(),
    })
}

/// 간단한 헬스 체크 (liveness probe용).
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "서버 응답 가능")),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// 상세 헬스 체크 (readiness probe용).
///
/// 데이터베이스와 모델 저장 디렉토리를 확인합니다.
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "정상", body = HealthResponse),
        (status = 503, description = "의존성 장애", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match (&state.db, &state.prices) {
        (None, _) => ComponentStatus::not_configured(),
        (Some(_), _) if !state.is_db_healthy().await => ComponentStatus::down("connection failed"),
        (Some(_), Some(prices)) => match prices.count(None).await {
            Ok(rows) => ComponentStatus::up(format!("postgres, {} price rows", rows)),
            Err(e) => ComponentStatus::down(e.to_string()),
        },
        (Some(_), None) => ComponentStatus::up("postgres"),
    };

    let store = state.forecaster.store();
    let model_store = match store.list() {
        Ok(models) => ComponentStatus::up(format!(
            "{} model artifacts in {}",
            models.len(),
            store.dir().display()
        )),
        Err(e) => ComponentStatus::down(e.to_string()),
    };

    // 503은 데이터베이스 장애일 때만
    let status_code = if database.is_down() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let overall = if database.is_down() || model_store.is_down() {
        "degraded"
    } else {
        "healthy"
    };

    let response = HealthResponse {
        status: overall.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            database,
            model_store,
            price_provider: ComponentStatus::up(state.collector.provider_name()),
        },
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_root_message() {
        let app: Router = Router::new().route("/", get(root));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "API is running");
    }

    #[tokio::test]
    async fn test_health_ready_without_database() {
        use crate::state::create_test_state;

        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(create_test_state(dir.path()));
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.components.database.status, ComponentState::NotConfigured);
        assert_eq!(health.components.model_store.status, ComponentState::Up);
        assert_eq!(health.components.price_provider.message.as_deref(), Some("static"));
    }

    #[test]
    fn test_component_status_serialization() {
        let down = ComponentStatus::down("error");
        assert!(down.is_down());
        assert_eq!(
            serde_json::to_value(&down).unwrap(),
            serde_json::json!({"status": "down", "message": "error"})
        );
        assert_eq!(
            serde_json::to_value(ComponentStatus::not_configured()).unwrap(),
            serde_json::json!({"status": "not_configured"})
        );
    }
}
