//! 시세 수집 및 조회 endpoint.
//!
//! `POST /collect`는 설정된 구간의 일봉을 내려받아 CSV(와 데이터베이스)에 저장하고,
//! `GET /prices/`는 저장된 가격 레코드를 페이지 단위로 돌려줍니다.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use forecast_data::{CollectReport, PriceRecord};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{data_error, validation_error, ApiResult};
use crate::extract::ApiQuery;
use crate::state::AppState;

/// 수집 요청 파라미터.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct CollectRequest {
    /// 수집할 심볼 (기본값: 설정의 심볼)
    pub symbol: Option<String>,
}

/// 가격 조회 파라미터.
#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema, Validate)]
pub struct PricesQuery {
    /// 건너뛸 레코드 수
    #[serde(default)]
    #[validate(range(min = 0, message = "skip은 0 이상이어야 합니다"))]
    pub skip: i64,

    /// 최대 반환 개수 (기본값: 100)
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 10000, message = "limit은 1-10000 사이여야 합니다"))]
    pub limit: i64,

    /// 심볼 필터 (데이터베이스가 없으면 기본 심볼)
    pub symbol: Option<String>,
}

fn default_limit() -> i64 {
    100
}

/// POST /collect - 시세를 내려받아 저장합니다.
#[utoipa::path(
    post,
    path = "/collect",
    params(CollectRequest),
    responses(
        (status = 200, description = "수집 완료", body = CollectReport),
        (status = 404, description = "제공자에 데이터 없음", body = crate::error::ApiErrorResponse),
        (status = 502, description = "시세 제공자 오류", body = crate::error::ApiErrorResponse)
    ),
    tag = "data"
)]
pub async fn collect_prices(
    State(state): State<Arc<AppState>>,
    ApiQuery(request): ApiQuery<CollectRequest>,
) -> ApiResult<Json<CollectReport>> {
    let symbol = state.resolve_symbol(request.symbol.as_deref());
    let report = state.collect(&symbol).await.map_err(data_error)?;

    info!(
        symbol = %report.symbol,
        rows = report.rows,
        dropped = report.dropped_rows,
        "Price data collected"
    );
    state
        .journal
        .record(
            "Collect Data",
            Some(&format!("Collected {} rows for {}.", report.rows, report.symbol)),
        )
        .await;

    Ok(Json(report))
}

/// GET /prices/ - 저장된 가격 레코드 조회.
///
/// 데이터베이스가 연결되어 있으면 `price_data` 테이블에서, 아니면 CSV 데이터셋에서 읽습니다.
/// CSV에서 읽을 때 ID는 날짜 순서대로 1부터 매겨집니다.
#[utoipa::path(
    get,
    path = "/prices/",
    params(PricesQuery),
    responses(
        (status = 200, description = "가격 레코드 목록", body = Vec<PriceRecord>),
        (status = 400, description = "잘못된 페이지 파라미터", body = crate::error::ApiErrorResponse)
    ),
    tag = "data"
)]
pub async fn list_prices(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PricesQuery>,
) -> ApiResult<Json<Vec<PriceRecord>>> {
    query.validate().map_err(validation_error)?;

    if let Some(prices) = &state.prices {
        let symbol = query
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase);
        let records = prices
            .list(symbol.as_deref(), query.skip, query.limit)
            .await
            .map_err(data_error)?;
        return Ok(Json(records));
    }

    let symbol = state.resolve_symbol(query.symbol.as_deref());
    let datasets = state.collector.datasets();
    if !datasets.exists(&symbol) {
        debug!(symbol = %symbol, "No dataset on disk");
        return Ok(Json(Vec::new()));
    }

    let bars = datasets.load(&symbol).map_err(data_error)?;
    let records = bars
        .iter()
        .enumerate()
        .skip(query.skip as usize)
        .take(query.limit as usize)
        .map(|(i, bar)| PriceRecord::from_bar(i as i64 + 1, &symbol, bar))
        .collect();

    Ok(Json(records))
}

/// 데이터 라우터 생성.
pub fn data_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/collect", post(collect_prices))
        .route("/prices", get(list_prices))
        .route("/prices/", get(list_prices))
}
