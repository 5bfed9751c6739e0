//! 모델 학습 및 예측 endpoint.
//!
//! 학습과 추론은 CPU 작업이므로 모두 `spawn_blocking`에서 실행합니다.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use forecast_core::{closes, future_dates, ForecastResponse, ModelKind, PriceBar, PriceSeries};
use forecast_models::{ModelStatus, TrainingReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{
    api_error, data_error, join_error, model_error, validation_error, ApiErrorResponse, ApiResult,
};
use crate::extract::ApiQuery;
use crate::metrics::{record_prediction, record_training};
use crate::state::AppState;

// ============================================================================
// Request/Response 타입
// ============================================================================

/// 모델 선택 파라미터.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ModelQuery {
    /// 모델 종류 (lstm | gru | arima, 기본값: lstm)
    pub model: Option<String>,
    /// 심볼 (기본값: 설정의 심볼)
    pub symbol: Option<String>,
}

/// 심볼 선택 파라미터.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct SymbolQuery {
    /// 심볼 (기본값: 설정의 심볼)
    pub symbol: Option<String>,
}

/// 다일 예측 파라미터.
#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema, Validate)]
pub struct ForecastQuery {
    /// 예측 일수 (1-365, 기본값: 5)
    #[serde(default = "default_days")]
    #[validate(range(min = 1, max = 365, message = "days는 1-365 사이여야 합니다"))]
    pub days: usize,
    /// 모델 종류 (lstm | gru | arima, 기본값: lstm)
    pub model: Option<String>,
    /// 심볼 (기본값: 설정의 심볼)
    pub symbol: Option<String>,
}

fn default_days() -> usize {
    5
}

/// 학습 응답.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrainResponse {
    pub message: String,
    pub report: TrainingReport,
}

/// 다음 하루 예측 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NextPredictionResponse {
    pub prediction: f64,
}

/// 재학습 응답.
#[derive(Debug, Serialize, ToSchema)]
pub struct RetrainResponse {
    pub message: String,
    pub reports: Vec<TrainingReport>,
}

/// 모델 상태 응답.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModelsResponse {
    pub symbol: String,
    pub models: Vec<ModelStatus>,
}

// ============================================================================
// 헬퍼
// ============================================================================

/// 모델 이름을 해석합니다. 비어 있으면 LSTM.
pub(crate) fn parse_model(raw: Option<&str>) -> ApiResult<ModelKind> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(ModelKind::default()),
        Some(name) => name.parse().map_err(|_| {
            api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_MODEL",
                format!("Unknown model '{}', expected one of: lstm, gru, arima", name),
            )
        }),
    }
}

/// 저장된 일봉과 종가를 읽습니다. 데이터셋이 없으면 먼저 수집합니다.
///
/// 반환되는 일봉은 비어 있지 않습니다.
async fn load_series(state: &AppState, symbol: &str) -> ApiResult<(Vec<PriceBar>, Vec<f64>)> {
    let bars = state.load_history(symbol).await.map_err(data_error)?;
    let closes = closes(&bars);
    Ok((bars, closes))
}

/// 학습 결과를 메트릭으로 남기고 API 결과로 변환합니다.
fn finish_training(
    kind: ModelKind,
    started: Instant,
    result: forecast_models::Result<TrainingReport>,
) -> ApiResult<TrainingReport> {
    record_training(kind.as_str(), result.is_ok(), started.elapsed().as_secs_f64());
    result.map_err(|e| {
        warn!(model = %kind, error = %e, "Training failed");
        model_error(e)
    })
}

// ============================================================================
// 핸들러
// ============================================================================

/// POST /train/ - 최신 데이터를 수집한 뒤 모델을 학습합니다.
#[utoipa::path(
    post,
    path = "/train/",
    params(ModelQuery),
    responses(
        (status = 200, description = "학습 완료", body = TrainResponse),
        (status = 400, description = "알 수 없는 모델", body = ApiErrorResponse),
        (status = 422, description = "데이터 부족", body = ApiErrorResponse),
        (status = 502, description = "시세 제공자 오류", body = ApiErrorResponse)
    ),
    tag = "forecast"
)]
#[instrument(skip(state))]
pub async fn train_model(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ModelQuery>,
) -> ApiResult<Json<TrainResponse>> {
    let kind = parse_model(query.model.as_deref())?;
    let symbol = state.resolve_symbol(query.symbol.as_deref());

    state.collect(&symbol).await.map_err(data_error)?;
    let (_, closes) = load_series(&state, &symbol).await?;

    let forecaster = state.forecaster.clone();
    let task_symbol = symbol.clone();
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        forecaster.train(&task_symbol, kind, &closes, &mut |_| {})
    })
    .await
    .map_err(join_error)?;
    let report = finish_training(kind, started, result)?;

    info!(
        symbol = %symbol,
        model = %kind,
        duration_ms = report.duration_ms,
        "Model trained"
    );
    state
        .journal
        .record(
            "Train Model",
            Some(&format!("{} model trained for {}.", kind.label(), symbol)),
        )
        .await;

    Ok(Json(TrainResponse {
        message: "Model trained successfully".to_string(),
        report,
    }))
}

/// GET /predict/ - 저장된 모델로 여러 날을 예측합니다.
#[utoipa::path(
    get,
    path = "/predict/",
    params(ForecastQuery),
    responses(
        (status = 200, description = "예측 결과와 과거 종가", body = ForecastResponse),
        (status = 400, description = "잘못된 파라미터", body = ApiErrorResponse),
        (status = 409, description = "학습된 모델 없음", body = ApiErrorResponse)
    ),
    tag = "forecast"
)]
#[instrument(skip(state))]
pub async fn predict(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ForecastQuery>,
) -> ApiResult<Json<ForecastResponse>> {
    query.validate().map_err(validation_error)?;
    let kind = parse_model(query.model.as_deref())?;
    let symbol = state.resolve_symbol(query.symbol.as_deref());
    let days = query.days;

    let (bars, closes) = load_series(&state, &symbol).await?;
    let last_date = bars.last().map(|b| b.date).unwrap_or_default();

    let forecaster = state.forecaster.clone();
    let task_symbol = symbol.clone();
    let forecast = tokio::task::spawn_blocking(move || {
        forecaster.forecast(&task_symbol, kind, &closes, days)
    })
    .await
    .map_err(join_error)?
    .map_err(model_error)?;

    record_prediction(kind.as_str());

    Ok(Json(ForecastResponse {
        prediction: PriceSeries::new(&future_dates(last_date, days), forecast),
        historical: PriceSeries::from_bars(&bars),
    }))
}

/// GET /predict/{model} - 다음 하루 종가 예측.
///
/// 모델이 아직 없으면 먼저 학습합니다.
#[utoipa::path(
    get,
    path = "/predict/{model}",
    params(
        ("model" = String, Path, description = "모델 종류 (lstm | gru | arima)"),
        SymbolQuery
    ),
    responses(
        (status = 200, description = "다음 하루 예측", body = NextPredictionResponse),
        (status = 400, description = "알 수 없는 모델", body = ApiErrorResponse)
    ),
    tag = "forecast"
)]
#[instrument(skip(state))]
pub async fn predict_next(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
    ApiQuery(query): ApiQuery<SymbolQuery>,
) -> ApiResult<Json<NextPredictionResponse>> {
    let kind = parse_model(Some(&model))?;
    let symbol = state.resolve_symbol(query.symbol.as_deref());
    let (_, closes) = load_series(&state, &symbol).await?;

    let forecaster = state.forecaster.clone();
    let task_symbol = symbol.clone();
    let started = Instant::now();
    let (forecast, report) = tokio::task::spawn_blocking(move || {
        forecaster.forecast_or_train(&task_symbol, kind, &closes, 1)
    })
    .await
    .map_err(join_error)?
    .map_err(model_error)?;

    if report.is_some() {
        record_training(kind.as_str(), true, started.elapsed().as_secs_f64());
    }
    record_prediction(kind.as_str());

    let prediction = forecast.first().copied().ok_or_else(|| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "PREDICTION_FAILED",
            "Model returned an empty forecast",
        )
    })?;

    state
        .journal
        .record(
            &format!("{} Prediction", kind.label()),
            Some(&format!("Prediction made using {} model.", kind.label())),
        )
        .await;

    Ok(Json(NextPredictionResponse { prediction }))
}

/// POST /retrain - 모든 모델을 저장된 데이터로 다시 학습합니다.
#[utoipa::path(
    post,
    path = "/retrain",
    params(SymbolQuery),
    responses(
        (status = 200, description = "재학습 완료", body = RetrainResponse),
        (status = 422, description = "데이터 부족", body = ApiErrorResponse)
    ),
    tag = "forecast"
)]
#[instrument(skip(state))]
pub async fn retrain_models(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SymbolQuery>,
) -> ApiResult<Json<RetrainResponse>> {
    let symbol = state.resolve_symbol(query.symbol.as_deref());
    let (_, closes) = load_series(&state, &symbol).await?;

    let forecaster = state.forecaster.clone();
    let task_symbol = symbol.clone();
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || forecaster.retrain_all(&task_symbol, &closes))
        .await
        .map_err(join_error)?;

    let reports = match result {
        Ok(reports) => reports,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "Retraining failed");
            return Err(model_error(e));
        }
    };
    for report in &reports {
        record_training(report.kind.as_str(), true, report.duration_ms as f64 / 1000.0);
    }

    info!(
        symbol = %symbol,
        models = reports.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Models retrained"
    );
    state
        .journal
        .record("Retrain Models", Some("Models retrained successfully."))
        .await;

    Ok(Json(RetrainResponse {
        message: "Models retrained successfully".to_string(),
        reports,
    }))
}

/// GET /models - 모델 종류별 학습 상태.
#[utoipa::path(
    get,
    path = "/models",
    params(SymbolQuery),
    responses((status = 200, description = "모델 상태", body = ModelsResponse)),
    tag = "forecast"
)]
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SymbolQuery>,
) -> ApiResult<Json<ModelsResponse>> {
    let symbol = state.resolve_symbol(query.symbol.as_deref());

    let forecaster = state.forecaster.clone();
    let task_symbol = symbol.clone();
    let models = tokio::task::spawn_blocking(move || forecaster.status(&task_symbol))
        .await
        .map_err(join_error)?;

    Ok(Json(ModelsResponse { symbol, models }))
}

/// 저장된 모델만 읽는 예측 라우터.
pub fn forecast_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/predict", get(predict))
        .route("/predict/", get(predict))
        .route("/models", get(list_models))
}

/// 모델을 학습할 수 있는 라우터.
///
/// 기본 설정의 학습은 요청 타임아웃보다 오래 걸리므로 타임아웃 레이어 밖에 둡니다.
pub fn training_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/train", post(train_model))
        .route("/train/", post(train_model))
        .route("/predict/{model}", get(predict_next))
        .route("/retrain", post(retrain_models))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn app(state: Arc<AppState>) -> Router {
        forecast_router().merge(training_router()).with_state(state)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_parse_model() {
        assert_eq!(parse_model(None).unwrap(), ModelKind::Lstm);
        assert_eq!(parse_model(Some(" ")).unwrap(), ModelKind::Lstm);
        assert_eq!(parse_model(Some("GRU")).unwrap(), ModelKind::Gru);

        let (status, Json(body)) = parse_model(Some("transformer")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code(), "INVALID_MODEL");
    }

    #[tokio::test]
    async fn test_predict_untrained_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(create_test_state(dir.path()));

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/predict/?days=3&model=gru")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = json_body(response).await;
        assert_eq!(json["code"], "MODEL_NOT_TRAINED");
    }

    #[tokio::test]
    async fn test_predict_rejects_out_of_range_days() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(create_test_state(dir.path()));

        for uri in ["/predict/?days=0", "/predict/?days=366"] {
            let response = app(state.clone())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_train_then_predict_multi_day() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(create_test_state(dir.path()));

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/train/?model=arima")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Model trained successfully");
        assert_eq!(json["report"]["kind"], "arima");

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/predict/?days=4&model=arima")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let forecast: ForecastResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(forecast.prediction.len(), 4);
        assert_eq!(forecast.historical.len(), 120);
        assert_eq!(forecast.historical.dates.last().unwrap(), "2024-04-29");
        assert_eq!(forecast.prediction.dates[0], "2024-04-30");
        assert!(forecast.prediction.prices.iter().all(|p| p.is_finite()));
    }

    #[tokio::test]
    async fn test_predict_next_trains_on_demand_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(create_test_state(dir.path()));

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/predict/lstm")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["prediction"].as_f64().unwrap().is_finite());

        assert!(state.forecaster.store().exists("BTC-USD", ModelKind::Lstm));
        let recent = state.journal.recent(1).await;
        assert_eq!(recent[0].action, "LSTM Prediction");
        assert_eq!(
            recent[0].details.as_deref(),
            Some("Prediction made using LSTM model.")
        );
    }

    #[tokio::test]
    async fn test_predict_next_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(create_test_state(dir.path()));

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/predict/prophet")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_retrain_and_models_status() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(create_test_state(dir.path()));

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/retrain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Models retrained successfully");
        assert_eq!(json["reports"].as_array().unwrap().len(), 3);

        let response = app(state.clone())
            .oneshot(Request::builder().uri("/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(response).await;
        let models = json["models"].as_array().unwrap();
        assert_eq!(models.len(), 3);
        assert!(models.iter().all(|m| m["trained"] == true));

        let recent = state.journal.recent(1).await;
        assert_eq!(recent[0].action, "Retrain Models");
    }
}
