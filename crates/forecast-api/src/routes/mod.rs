//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/` - 서버 동작 확인 메시지
//! - `/health`, `/health/ready` - 헬스 체크
//! - `/collect`, `/prices/` - 시세 수집과 조회
//! - `/train/`, `/predict/`, `/predict/{model}`, `/retrain`, `/models` - 모델 학습과 예측
//! - `/log`, `/logs` - 액션 로그
//! - `/jobs` - 백그라운드 학습 작업
//!
//! `/train/`, `/predict/{model}`, `/retrain`은 학습을 포함할 수 있어 요청 타임아웃을 적용하지 않습니다.
//!
//! 기존 클라이언트가 끝에 `/`를 붙여 호출하므로 주요 경로는 두 형태를 모두 받습니다.

pub mod data;
pub mod forecast;
pub mod health;
pub mod jobs;
pub mod logs;

pub use data::{data_router, CollectRequest, PricesQuery};
pub use forecast::{
    forecast_router, training_router, ForecastQuery, ModelQuery, ModelsResponse, NextPredictionResponse,
    RetrainResponse, SymbolQuery, TrainResponse,
};
pub use health::{
    health_router, root, ComponentHealth, ComponentState, ComponentStatus, HealthResponse,
    RootResponse,
};
pub use jobs::{jobs_router, StartTrainingRequest, TrainingJob, TrainingStatus};
pub use logs::{logs_router, LogRequest, LogsQuery, MessageResponse};

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::state::AppState;

/// 요청 타임아웃을 적용하는 API 라우터.
pub fn create_timed_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .nest("/health", health_router())
        .merge(data_router())
        .merge(forecast_router())
        .merge(logs_router())
        .nest("/jobs", jobs_router())
}

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    create_timed_router().merge(training_router())
}
