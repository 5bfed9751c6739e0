//! OpenAPI 문서화 설정.
//!
//! utoipa로 REST API의 OpenAPI 3.0 스펙을 생성합니다.
//! Swagger UI는 `/swagger-ui` 경로에서 사용 가능합니다.
//!
//! 새로운 엔드포인트를 추가할 때:
//!
//! 1. 응답/요청 타입에 `#[derive(ToSchema)]` 추가
//! 2. 핸들러에 `#[utoipa::path(...)]` 어노테이션 추가
//! 3. 이 파일의 `components(schemas(...))` 및 `paths(...)` 섹션에 추가
//!
//! 하위 크레이트의 타입은 `utoipa-support` feature로 `ToSchema`를 구현합니다.

use axum::Router;
use forecast_core::{ActionLogEntry, ForecastResponse, ModelKind, PriceSeries};
use forecast_data::{CollectReport, PriceRecord};
use forecast_models::{EpochStats, ModelStatus, TrainingMetrics, TrainingReport};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiErrorResponse;
use crate::routes::{
    jobs::{StartTrainingResponse, TrainingJobsResponse},
    ComponentHealth, ComponentState, ComponentStatus, HealthResponse, LogRequest, MessageResponse,
    ModelsResponse, NextPredictionResponse, RetrainResponse, RootResponse, StartTrainingRequest,
    TrainResponse, TrainingJob, TrainingStatus,
};

/// Forecast API 문서.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Crypto Forecast API",
        version = "0.1.0",
        description = r#"
# 암호화폐 가격 예측 REST API

일봉 시세를 수집하고 LSTM, GRU, ARIMA 모델로 종가를 예측합니다.

## 주요 기능

- **데이터**: Yahoo Finance 일봉 수집과 조회
- **예측**: 모델 학습, 다일 예측, 다음 하루 예측
- **작업**: 백그라운드 학습과 진행률 조회
- **로그**: 사용자 액션 기록
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8001", description = "로컬 개발 서버"),
    ),
    tags(
        (name = "health", description = "헬스 체크 - 서버 상태 확인"),
        (name = "data", description = "데이터 - 시세 수집과 조회"),
        (name = "forecast", description = "예측 - 모델 학습과 가격 예측"),
        (name = "jobs", description = "작업 - 백그라운드 학습"),
        (name = "logs", description = "로그 - 액션 기록")
    ),
    // ==================== 스키마 등록 ====================
    components(
        schemas(
            // ===== Common =====
            ApiErrorResponse,
            MessageResponse,

            // ===== Health =====
            RootResponse,
            HealthResponse,
            ComponentHealth,
            ComponentState,
            ComponentStatus,

            // ===== Data =====
            CollectReport,
            PriceRecord,

            // ===== Forecast =====
            ModelKind,
            PriceSeries,
            ForecastResponse,
            TrainResponse,
            TrainingReport,
            TrainingMetrics,
            EpochStats,
            NextPredictionResponse,
            RetrainResponse,
            ModelsResponse,
            ModelStatus,

            // ===== Jobs =====
            TrainingStatus,
            TrainingJob,
            StartTrainingRequest,
            StartTrainingResponse,
            TrainingJobsResponse,

            // ===== Logs =====
            LogRequest,
            ActionLogEntry,
        )
    ),
    // ==================== 경로 등록 ====================
    paths(
        // ===== Health =====
        crate::routes::health::root,
        crate::routes::health::health_check,
        crate::routes::health::health_ready,

        // ===== Data =====
        crate::routes::data::collect_prices,
        crate::routes::data::list_prices,

        // ===== Forecast =====
        crate::routes::forecast::train_model,
        crate::routes::forecast::predict,
        crate::routes::forecast::predict_next,
        crate::routes::forecast::retrain_models,
        crate::routes::forecast::list_models,

        // ===== Jobs =====
        crate::routes::jobs::start_training,
        crate::routes::jobs::list_jobs,
        crate::routes::jobs::get_job,

        // ===== Logs =====
        crate::routes::logs::log_action,
        crate::routes::logs::list_logs,
    )
)]
pub struct ApiDoc;

/// Swagger UI 라우터 생성.
///
/// - `/swagger-ui` - Swagger UI 대화형 문서
/// - `/api-docs/openapi.json` - OpenAPI JSON 스펙
pub fn swagger_ui_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_valid() {
        let spec = ApiDoc::openapi();
        let json = serde_json::to_string_pretty(&spec).unwrap();

        assert!(json.contains("Crypto Forecast API"));
        for tag in ["health", "data", "forecast", "jobs", "logs"] {
            assert!(json.contains(tag), "missing tag {}", tag);
        }
        for path in ["/health/ready", "/predict/", "/predict/{model}", "/retrain", "/jobs/{id}"] {
            assert!(json.contains(path), "missing path {}", path);
        }
    }

    #[test]
    fn test_openapi_contains_schemas() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("ForecastResponse"));
        assert!(json.contains("TrainingReport"));
        assert!(json.contains("ApiErrorResponse"));
    }

    #[test]
    fn test_swagger_ui_router_creates() {
        let _router: Router<()> = swagger_ui_router();
    }
}
