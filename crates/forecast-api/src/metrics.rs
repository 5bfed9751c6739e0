//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭과 학습/예측 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설치하고 렌더링 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        )?
        .set_buckets_for_metric(
            Matcher::Full("model_training_duration_seconds".to_string()),
            &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0],
        )?
        .install_recorder()
}

// ============================================================================
// HTTP 메트릭 헬퍼 함수
// ============================================================================

/// HTTP 요청 카운터 증가.
pub fn record_http_request(method: &str, path: &str) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string())
        .increment(1);
}

/// HTTP 응답 카운터 증가.
pub fn record_http_response(method: &str, path: &str, status: u16) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 도메인 메트릭 헬퍼 함수
// ============================================================================

/// 모델 학습 결과 기록.
pub fn record_training(model: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "model_trainings_total",
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!("model_training_duration_seconds", "model" => model.to_string())
        .record(duration_secs);
}

/// 예측 요청 카운터 증가.
pub fn record_prediction(model: &str) {
    counter!("model_predictions_total", "model" => model.to_string()).increment(1);
}

/// 수집된 가격 행 수 기록.
pub fn record_collected_rows(symbol: &str, rows: usize) {
    counter!("price_rows_collected_total", "symbol" => symbol.to_string()).increment(rows as u64);
}

/// 실행 중인 백그라운드 학습 작업 수.
pub fn set_running_jobs(count: usize) {
    gauge!("training_jobs_running").set(count as f64);
}

// ============================================================================
// 경로 정규화 유틸리티
// ============================================================================

/// 경로에서 동적 파라미터를 정규화합니다.
///
/// 예: `/jobs/123e4567-e89b-12d3-a456-426614174000` → `/jobs/:id`
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_uuid = segment.len() == 36 && segment.chars().filter(|c| *c == '-').count() == 4;
            let is_numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
            if is_uuid || is_numeric {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
