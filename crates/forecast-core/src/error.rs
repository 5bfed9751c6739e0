//! 핵심 에러 타입.

use thiserror::Error;

/// 도메인 타입과 설정에서 발생하는 에러.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 알 수 없는 모델 종류
    #[error("알 수 없는 모델: {0}")]
    UnknownModel(String),
}

/// 핵심 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;
