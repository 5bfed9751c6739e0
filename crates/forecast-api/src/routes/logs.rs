//! 액션 로그 endpoint.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use forecast_core::ActionLogEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{validation_error, ApiErrorResponse, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

/// 액션 기록 요청.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct LogRequest {
    /// 액션 이름
    #[validate(length(min = 1, max = 255, message = "action은 1-255자여야 합니다"))]
    pub action: String,
    /// 상세 설명
    #[serde(default)]
    pub details: Option<String>,
}

/// 로그 조회 파라미터.
#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema, Validate)]
pub struct LogsQuery {
    /// 최대 반환 개수 (기본값: 50)
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000, message = "limit은 1-1000 사이여야 합니다"))]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// 단순 메시지 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /log - 액션을 기록합니다.
#[utoipa::path(
    post,
    path = "/log",
    request_body = LogRequest,
    responses(
        (status = 200, description = "기록 완료", body = MessageResponse),
        (status = 400, description = "유효하지 않은 요청", body = ApiErrorResponse)
    ),
    tag = "logs"
)]
pub async fn log_action(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LogRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate().map_err(validation_error)?;

    state
        .journal
        .record(&request.action, request.details.as_deref())
        .await;

    Ok(Json(MessageResponse {
        message: "Action logged".to_string(),
    }))
}

/// GET /logs - 최근 액션 로그를 최신순으로 조회합니다.
#[utoipa::path(
    get,
    path = "/logs",
    params(LogsQuery),
    responses(
        (status = 200, description = "최근 액션 로그", body = Vec<ActionLogEntry>),
        (status = 400, description = "잘못된 limit", body = ApiErrorResponse)
    ),
    tag = "logs"
)]
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<LogsQuery>,
) -> ApiResult<Json<Vec<ActionLogEntry>>> {
    query.validate().map_err(validation_error)?;
    Ok(Json(state.journal.recent(query.limit).await))
}

/// 로그 라우터 생성.
pub fn logs_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/log", post(log_action))
        .route("/logs", get(list_logs))
}
