//! 백그라운드 학습 작업 API.
//!
//! 학습을 요청 처리와 분리해 실행하고 진행률을 조회할 수 있게 합니다.
//! 작업 목록은 프로세스 메모리에만 보관되며, [`MAX_RETAINED_JOBS`]를 넘으면
//! 끝난 작업부터 오래된 순으로 지웁니다.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use forecast_core::{closes, ModelKind};
use forecast_models::{EpochStats, TrainingReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{api_error, ApiErrorResponse, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::metrics::{record_training, set_running_jobs};
use crate::routes::forecast::parse_model;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// 보관하는 작업 수 상한. 실행 중인 작업은 지우지 않습니다.
pub const MAX_RETAINED_JOBS: usize = 200;

/// 학습 작업 상태.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// 학습 작업 정보.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrainingJob {
    pub id: Uuid,
    pub symbol: String,
    pub model: ModelKind,
    pub status: TrainingStatus,
    /// 0-100
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub report: Option<TrainingReport>,
}

/// 학습 시작 요청.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StartTrainingRequest {
    /// 모델 종류 (lstm | gru | arima, 기본값: lstm)
    #[serde(default)]
    pub model: Option<String>,
    /// 심볼 (기본값: 설정의 심볼)
    #[serde(default)]
    pub symbol: Option<String>,
}

/// 학습 시작 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartTrainingResponse {
    pub job_id: Uuid,
    pub message: String,
}

/// 작업 목록 응답.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrainingJobsResponse {
    pub jobs: Vec<TrainingJob>,
    pub total: usize,
}

/// 작업 목록 쿼리.
#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
pub struct JobsQuery {
    /// 상태 필터
    pub status: Option<TrainingStatus>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /jobs/train - 학습 작업 시작.
#[utoipa::path(
    post,
    path = "/jobs/train",
    request_body = StartTrainingRequest,
    responses(
        (status = 202, description = "작업 접수", body = StartTrainingResponse),
        (status = 400, description = "알 수 없는 모델", body = ApiErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn start_training(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<StartTrainingRequest>,
) -> ApiResult<(StatusCode, Json<StartTrainingResponse>)> {
    let kind = parse_model(request.model.as_deref())?;
    let symbol = state.resolve_symbol(request.symbol.as_deref());

    let job = TrainingJob {
        id: Uuid::new_v4(),
        symbol: symbol.clone(),
        model: kind,
        status: TrainingStatus::Pending,
        progress: 0,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        error: None,
        report: None,
    };
    let job_id = job.id;

    {
        let mut jobs = state.training_jobs.write().await;
        evict_finished_jobs(&mut jobs, MAX_RETAINED_JOBS.saturating_sub(1));
        jobs.insert(job_id, job);
    }
    info!(%job_id, symbol = %symbol, model = %kind, "Training job queued");

    let task_state = state.clone();
    tokio::spawn(async move {
        run_training_job(task_state, job_id, symbol, kind).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartTrainingResponse {
            job_id,
            message: "Training job started".to_string(),
        }),
    ))
}

/// 작업 하나를 실행하고 결과를 작업 목록에 반영합니다.
#[instrument(skip(state))]
async fn run_training_job(state: Arc<AppState>, job_id: Uuid, symbol: String, kind: ModelKind) {
    update_job(&state, job_id, |job| {
        job.status = TrainingStatus::Running;
        job.started_at = Some(Utc::now());
    })
    .await;
    refresh_running_gauge(&state).await;

    let history = match state.collect(&symbol).await {
        Ok(_) => state.load_history(&symbol).await,
        Err(e) => Err(e),
    };
    let closes = match history {
        Ok(bars) => closes(&bars),
        Err(e) => {
            finish_job(&state, job_id, Err(e.to_string())).await;
            return;
        }
    };

    let jobs = state.training_jobs.clone();
    let forecaster = state.forecaster.clone();
    let task_symbol = symbol.clone();
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        forecaster.train(&task_symbol, kind, &closes, &mut |stats: &EpochStats| {
            let progress = (stats.epoch * 100 / stats.epochs.max(1)).min(99) as u8;
            if let Some(job) = jobs.blocking_write().get_mut(&job_id) {
                job.progress = progress;
            }
        })
    })
    .await;

    let outcome = match result {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("training task aborted: {}", e)),
    };
    record_training(kind.as_str(), outcome.is_ok(), started.elapsed().as_secs_f64());

    if outcome.is_ok() {
        state
            .journal
            .record(
                "Train Model",
                Some(&format!("{} model trained for {}.", kind.label(), symbol)),
            )
            .await;
    }
    finish_job(&state, job_id, outcome).await;
}

async fn finish_job(state: &AppState, job_id: Uuid, outcome: Result<TrainingReport, String>) {
    update_job(state, job_id, |job| {
        job.completed_at = Some(Utc::now());
        match outcome {
            Ok(report) => {
                job.status = TrainingStatus::Completed;
                job.progress = 100;
                job.report = Some(report);
                info!(%job_id, "Training job completed");
            }
            Err(message) => {
                job.status = TrainingStatus::Failed;
                error!(%job_id, error = %message, "Training job failed");
                job.error = Some(message);
            }
        }
    })
    .await;
    refresh_running_gauge(state).await;
}

/// 작업 수가 `keep` 이하가 될 때까지 끝난 작업을 오래된 순으로 지웁니다.
fn evict_finished_jobs(jobs: &mut HashMap<Uuid, TrainingJob>, keep: usize) {
    if jobs.len() <= keep {
        return;
    }

    let mut finished: Vec<(DateTime<Utc>, Uuid)> = jobs
        .values()
        .filter(|j| matches!(j.status, TrainingStatus::Completed | TrainingStatus::Failed))
        .map(|j| (j.completed_at.unwrap_or(j.created_at), j.id))
        .collect();
    finished.sort();

    let excess = jobs.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
    debug!(retained = jobs.len(), "Evicted finished training jobs");
}

async fn update_job(state: &AppState, job_id: Uuid, f: impl FnOnce(&mut TrainingJob)) {
    if let Some(job) = state.training_jobs.write().await.get_mut(&job_id) {
        f(job);
    }
}

async fn refresh_running_gauge(state: &AppState) {
    let running = state
        .training_jobs
        .read()
        .await
        .values()
        .filter(|j| j.status == TrainingStatus::Running)
        .count();
    set_running_jobs(running);
}

/// GET /jobs - 학습 작업 목록 (최신순).
#[utoipa::path(
    get,
    path = "/jobs",
    params(JobsQuery),
    responses((status = 200, description = "작업 목록", body = TrainingJobsResponse)),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<JobsQuery>,
) -> Json<TrainingJobsResponse> {
    let jobs = state.training_jobs.read().await;
    let mut job_list: Vec<TrainingJob> = jobs
        .values()
        .filter(|j| query.status.map_or(true, |s| j.status == s))
        .cloned()
        .collect();
    job_list.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = job_list.len();
    let jobs = job_list
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .collect();

    Json(TrainingJobsResponse { jobs, total })
}

/// GET /jobs/{id} - 특정 작업 조회.
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    params(("id" = Uuid, Path, description = "작업 ID")),
    responses(
        (status = 200, description = "작업 정보", body = TrainingJob),
        (status = 404, description = "작업 없음", body = ApiErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<TrainingJob>> {
    state
        .training_jobs
        .read()
        .await
        .get(&job_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "JOB_NOT_FOUND",
                format!("Training job {} not found", job_id),
            )
        })
}

/// 작업 라우터 생성.
pub fn jobs_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/train", post(start_training))
        .route("/{id}", get(get_job))
}
