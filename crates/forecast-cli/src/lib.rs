//! CLI 도구 모음.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 시세 수집
//! - 모델 학습 (진행률 표시)
//! - 다일 가격 예측
//! - 저장된 모델 상태 조회

pub mod commands;

pub use commands::*;
