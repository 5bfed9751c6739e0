//! 모델 모듈 에러 타입.

use forecast_core::ModelKind;
use thiserror::Error;

/// 학습과 예측에서 발생할 수 있는 에러.
#[derive(Debug, Error)]
pub enum ModelError {
    /// 학습/예측을 위한 데이터 부족
    #[error("Insufficient data: need {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// 유효하지 않은 입력 데이터
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 아직 학습된 모델이 없음
    #[error("Model has not been trained yet: {kind} for {symbol}")]
    NotTrained { symbol: String, kind: ModelKind },

    /// 수치 계산 실패 (발산, 특이 행렬 등)
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// 아티팩트 내용이 기대와 다름
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// 파일 입출력 에러
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 직렬화 에러
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 모델 작업을 위한 Result 타입.
pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    /// 이 에러가 복구 가능한지 확인 (다른 데이터나 설정으로 재시도 가능).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ModelError::InsufficientData { .. }
                | ModelError::InvalidInput(_)
                | ModelError::NotTrained { .. }
        )
    }
}
