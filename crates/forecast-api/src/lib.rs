//! 가격 예측 REST API 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Axum 기반 REST API (시세 수집, 모델 학습, 예측, 액션 로그)
//! - 백그라운드 학습 작업
//! - 헬스 체크 엔드포인트
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`app`]: 레이어를 포함한 전체 라우터 조립
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`extract`]: JSON 에러를 돌려주는 쿼리/본문 추출기
//! - [`routes`]: REST API 엔드포인트
//! - [`journal`]: 액션 로그 저널
//! - [`metrics`]: Prometheus 메트릭 수집
//! - [`middleware`]: HTTP 미들웨어
//! - [`openapi`]: OpenAPI 문서 및 Swagger UI

pub mod app;
pub mod error;
pub mod extract;
pub mod journal;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

pub use app::create_router;
pub use error::{ApiErrorResponse, ApiResult};
pub use journal::ActionJournal;
pub use metrics::setup_metrics_recorder;
pub use middleware::metrics_layer;
pub use routes::*;
pub use state::AppState;

#[cfg(any(test, feature = "test-utils"))]
pub use state::{create_test_state, test_config};
