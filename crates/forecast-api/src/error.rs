//! 통합 API 에러 응답 타입.
//!
//! 모든 엔드포인트는 같은 JSON 에러 형식을 사용하며,
//! 데이터/모델 계층 에러는 이 모듈에서 HTTP 상태 코드로 변환됩니다.

use axum::http::StatusCode;
use axum::Json;
use forecast_data::DataError;
use forecast_models::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use utoipa::ToSchema;
use validator::ValidationErrors;

/// 통합 API 에러 응답.
///
/// ```json
/// {
///   "code": "MODEL_NOT_TRAINED",
///   "message": "Model has not been trained yet: lstm for BTC-USD",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "INVALID_INPUT", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 시각 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 타임스탬프를 포함한 에러를 생성합니다.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보를 포함한 에러를 생성합니다.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// 핸들러에서 반환하는 에러 튜플.
pub type ApiError = (StatusCode, Json<ApiErrorResponse>);

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, ApiError>;

/// 상태 코드와 에러 코드로 응답을 만듭니다.
pub fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (status, Json(ApiErrorResponse::new(code, message)))
}

/// 데이터 계층 에러를 HTTP 응답으로 변환합니다.
pub fn data_error(err: DataError) -> ApiError {
    let (status, code) = match &err {
        DataError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        DataError::NoData { .. } => (StatusCode::NOT_FOUND, "NO_DATA"),
        DataError::InvalidData(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        DataError::FetchError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        DataError::ConnectionError(_) | DataError::PoolExhausted => {
            (StatusCode::SERVICE_UNAVAILABLE, "DB_UNAVAILABLE")
        }
        DataError::ParseError(_) | DataError::Io(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "DATASET_ERROR")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"),
    };
    if status.is_server_error() {
        error!(error = %err, code, "Data layer error");
    }
    api_error(status, code, err.to_string())
}

/// 모델 계층 에러를 HTTP 응답으로 변환합니다.
pub fn model_error(err: ModelError) -> ApiError {
    let (status, code) = match &err {
        ModelError::NotTrained { .. } => (StatusCode::CONFLICT, "MODEL_NOT_TRAINED"),
        ModelError::InsufficientData { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_DATA")
        }
        ModelError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        ModelError::Numerical(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TRAINING_FAILED"),
        ModelError::Artifact(_) | ModelError::Io(_) | ModelError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "MODEL_STORAGE_ERROR")
        }
    };
    if status.is_server_error() {
        error!(error = %err, code, "Model error");
    }
    api_error(status, code, err.to_string())
}

/// `validator` 검증 실패를 400 응답으로 변환합니다.
pub fn validation_error(errors: ValidationErrors) -> ApiError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: invalid value", field))
            })
        })
        .collect::<Vec<_>>()
        .join("; ");
    api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
}

/// 블로킹 작업 스레드가 패닉하거나 취소된 경우.
pub fn join_error(err: tokio::task::JoinError) -> ApiError {
    error!(error = %err, "Blocking task failed");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "background task failed",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_core::ModelKind;

    #[test]
    fn test_api_error_response_new() {
        let error = ApiErrorResponse::new("TEST_ERROR", "Test message");
        assert_eq!(error.code(), "TEST_ERROR");
        assert_eq!(error.message(), "Test message");
        assert!(error.timestamp.is_some());
        assert!(error.details.is_none());
        assert_eq!(error.to_string(), "[TEST_ERROR] Test message");
    }

    #[test]
    fn test_with_details_serialization() {
        let error = ApiErrorResponse::with_details(
            "VALIDATION_ERROR",
            "Invalid input",
            serde_json::json!({"field": "days"}),
        );
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains(r#""code":"VALIDATION_ERROR""#));
        assert!(json.contains(r#""field":"days""#));
    }

    #[test]
    fn test_model_error_mapping() {
        let (status, Json(body)) = model_error(ModelError::NotTrained {
            symbol: "BTC-USD".into(),
            kind: ModelKind::Gru,
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.code, "MODEL_NOT_TRAINED");

        let (status, _) = model_error(ModelError::InsufficientData {
            required: 61,
            actual: 10,
        });
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_data_error_mapping() {
        let (status, Json(body)) = data_error(DataError::NoData {
            symbol: "XXX".into(),
        });
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.message.contains("Check if the ticker or dates are correct"));

        let (status, _) = data_error(DataError::FetchError("timeout".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
